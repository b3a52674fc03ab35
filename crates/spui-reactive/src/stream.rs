#![forbid(unsafe_code)]

//! Reactive value cells.
//!
//! A [`Stream<T>`] holds a value, an optional transform applied to every
//! write, and an ordered set of listeners. Reading a stream while a
//! [`Computation`](crate::computation::Computation) of the same
//! [`Runtime`] is evaluating records the stream as one of its dependencies.
//!
//! # Invariants
//!
//! 1. The stored value always equals `transform(last written value)` when a
//!    transform is present, else the last written value.
//! 2. Reading never mutates the stream; a tracked read only registers a
//!    dependency.
//! 3. A write notifies a snapshot of the listeners taken when the write
//!    starts, in registration order. Each listener sees the value as it is
//!    when that listener is called, so re-entrant writes made by an earlier
//!    listener are visible to later ones.
//! 4. A write completes, including every write it triggers, before returning.
//!
//! # Failure Modes
//!
//! - **Re-entrant `with`**: writing a stream from inside its own
//!   [`with`](Stream::with) closure panics (the value is borrowed). Use
//!   [`get`](Stream::get) when the closure may write.
//! - **Listener panic**: propagates out of [`set`](Stream::set); listeners
//!   later in the snapshot are not called for that write.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::runtime::{Runtime, SourceId};
use crate::subscription::{Listeners, Subscription};

/// Callback notified with the stream's value after each write.
pub type Listener<T> = Rc<dyn Fn(&T)>;

/// Write transform. Composed transforms run in the order they were added.
pub type Transform<T> = Rc<dyn Fn(T) -> T>;

pub(crate) struct StreamInner<T> {
    id: SourceId,
    runtime: Runtime,
    value: RefCell<T>,
    transform: RefCell<Option<Transform<T>>>,
    listeners: Listeners<dyn Fn(&T)>,
    /// Upstream subscriptions and owners kept alive as long as this stream.
    retained: RefCell<Vec<Box<dyn Any>>>,
}

/// Shared handle to a reactive value cell.
///
/// Cloning creates a new handle to the **same** cell.
pub struct Stream<T> {
    inner: Rc<StreamInner<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Stream");
        dbg.field("id", &self.inner.id.raw());
        match self.inner.value.try_borrow() {
            Ok(value) => dbg.field("value", &*value),
            Err(_) => dbg.field("value", &"<borrowed>"),
        };
        dbg.field("listeners", &self.inner.listeners.len())
            .field("transform", &self.inner.transform.borrow().is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Create a stream holding `value`.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(StreamInner {
                id: SourceId::next(),
                runtime: runtime.clone(),
                value: RefCell::new(value),
                transform: RefCell::new(None),
                listeners: Listeners::new(),
                retained: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a stream with a write transform. The initial value goes through
    /// the transform too.
    pub fn with_transform(runtime: &Runtime, value: T, transform: impl Fn(T) -> T + 'static) -> Self {
        let transform: Transform<T> = Rc::new(transform);
        let stream = Self::new(runtime, transform(value));
        *stream.inner.transform.borrow_mut() = Some(transform);
        stream
    }

    #[must_use]
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Current value, recorded as a dependency of the evaluating computation.
    #[must_use]
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    /// Current value without dependency tracking.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, recording a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        self.with_untracked(f)
    }

    /// Borrow the current value without dependency tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Write `value` (through the transform, if any) and notify listeners.
    pub fn set(&self, value: T) {
        let transform = self.inner.transform.borrow().clone();
        let value = match transform {
            Some(transform) => transform(value),
            None => value,
        };
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    /// Modify a copy of the value in place, then write it back with
    /// [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.get_untracked();
        f(&mut value);
        self.set(value);
    }

    fn notify(&self) {
        let listeners = self.inner.listeners.snapshot();
        if listeners.is_empty() {
            return;
        }
        trace!(
            source = self.inner.id.raw(),
            listeners = listeners.len(),
            "stream write"
        );
        for listener in listeners {
            let value = self.get_untracked();
            listener(&value);
        }
    }

    /// Register `listener`. Registering an already-present listener keeps
    /// the single existing entry; it is removed once every guard returned
    /// for it has been dropped, or by [`remove_listener`](Self::remove_listener).
    pub fn add_listener(&self, listener: &Listener<T>) -> Subscription {
        subscribe_listener(&self.inner, listener)
    }

    /// Register a new callback.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let listener: Listener<T> = Rc::new(callback);
        self.add_listener(&listener)
    }

    /// Remove `listener`. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Listener<T>) -> bool {
        self.inner.listeners.remove(listener)
    }

    #[must_use]
    pub fn has_listener(&self, listener: &Listener<T>) -> bool {
        self.inner.listeners.contains(listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Compose `transform` after the existing transform.
    ///
    /// The current value is passed through `transform` right away so the
    /// stored value keeps matching the composed transform of the last write.
    /// Listeners are not notified.
    pub fn add_transform(&self, transform: impl Fn(T) -> T + 'static) {
        let transform: Transform<T> = Rc::new(transform);
        let previous = self.inner.transform.borrow_mut().take();
        let composed: Transform<T> = match previous {
            Some(first) => {
                let second = Rc::clone(&transform);
                Rc::new(move |value| second(first(value)))
            }
            None => Rc::clone(&transform),
        };
        *self.inner.transform.borrow_mut() = Some(composed);

        let next = transform(self.get_untracked());
        *self.inner.value.borrow_mut() = next;
    }

    /// Derived stream holding `f(value)`, rewritten on every write to `self`.
    ///
    /// The initial read is untracked. The upstream subscription lives as long
    /// as the derived stream.
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Stream<U> {
        let mapped = Stream::new(&self.inner.runtime, self.with_untracked(&f));
        let target = mapped.downgrade();
        let subscription = self.subscribe(move |value| {
            if let Some(target) = target.upgrade() {
                target.set(f(value));
            }
        });
        mapped.retain(Box::new(subscription));
        mapped
    }

    /// Read-only view of this stream.
    #[must_use]
    pub fn read_only(&self) -> ReadStream<T> {
        ReadStream {
            stream: self.clone(),
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakStream<T> {
        WeakStream {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether both handles point at the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Keep `value` alive for as long as this stream lives.
    pub(crate) fn retain(&self, value: Box<dyn Any>) {
        self.inner.retained.borrow_mut().push(value);
    }

    fn track(&self) {
        let inner = &self.inner;
        inner.runtime.track(inner.id, |trigger| {
            let listener: Listener<T> = Rc::new(move |_: &T| trigger());
            subscribe_listener(inner, &listener)
        });
    }
}

fn subscribe_listener<T: 'static>(inner: &Rc<StreamInner<T>>, listener: &Listener<T>) -> Subscription {
    let id = inner.listeners.insert(listener);
    let weak = Rc::downgrade(inner);
    Subscription::new(move || {
        if let Some(inner) = weak.upgrade() {
            inner.listeners.release(id);
        }
    })
}

/// Non-owning handle to a [`Stream`].
pub struct WeakStream<T> {
    inner: Weak<StreamInner<T>>,
}

impl<T> Clone for WeakStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakStream<T> {
    #[must_use]
    pub fn upgrade(&self) -> Option<Stream<T>> {
        self.inner.upgrade().map(|inner| Stream { inner })
    }
}

/// Read-only view of a [`Stream`]: everything except writing.
pub struct ReadStream<T> {
    stream: Stream<T>,
}

impl<T> Clone for ReadStream<T> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.stream.fmt(f)
    }
}

impl<T: Clone + 'static> ReadStream<T> {
    #[must_use]
    pub fn id(&self) -> SourceId {
        self.stream.id()
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.stream.get()
    }

    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.stream.get_untracked()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.stream.with(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.stream.with_untracked(f)
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.stream.subscribe(callback)
    }

    pub fn add_listener(&self, listener: &Listener<T>) -> Subscription {
        self.stream.add_listener(listener)
    }

    pub fn remove_listener(&self, listener: &Listener<T>) -> bool {
        self.stream.remove_listener(listener)
    }

    #[must_use]
    pub fn has_listener(&self, listener: &Listener<T>) -> bool {
        self.stream.has_listener(listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.stream.listener_count()
    }

    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Stream<U> {
        self.stream.map(f)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.stream.ptr_eq(&other.stream)
    }

    pub(crate) fn retain(&self, value: Box<dyn Any>) {
        self.stream.retain(value);
    }
}
