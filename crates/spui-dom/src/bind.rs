#![forbid(unsafe_code)]

//! Reactive bindings from computations onto nodes.
//!
//! Each binding runs its closure inside a [`Computation`]. When the first
//! run reads no stream the value is static and the computation is dropped
//! right away; otherwise the node keeps it alive and every write to a
//! dependency patches the node in place. Computations only hold weak
//! handles to the nodes they patch, so a dropped tree takes its bindings
//! with it.
//!
//! Every binding returns `true` when it stayed live.

use std::cell::RefCell;

use tracing::trace;

use spui_reactive::{Computation, Runtime};

use crate::attr::{AttrValue, apply_attribute};
use crate::node::MemoryNode;

fn keep_alive<T: Clone + 'static>(node: &MemoryNode, computation: Computation<T>) -> bool {
    if computation.dependency_count() == 0 {
        return false;
    }
    node.retain(Box::new(computation));
    true
}

/// Keep attribute `name` equal to `f()`. See [`apply_attribute`] for how
/// values land.
pub fn bind_attribute<V: Into<AttrValue>>(
    rt: &Runtime,
    node: &MemoryNode,
    name: impl Into<String>,
    f: impl Fn() -> V + 'static,
) -> bool {
    let name = name.into();
    let label = name.clone();
    let target = node.downgrade();
    let computation = Computation::new(rt, move || {
        let value: AttrValue = f().into();
        if let Some(node) = target.upgrade() {
            apply_attribute(&node, &name, &value);
        }
    });
    let live = keep_alive(node, computation);
    trace!(attribute = %label, live, "bound attribute");
    live
}

/// Keep one inline style declaration equal to `f()`; an empty value removes
/// it.
pub fn bind_style_property<S: Into<String>>(
    rt: &Runtime,
    node: &MemoryNode,
    property: impl Into<String>,
    f: impl Fn() -> S + 'static,
) -> bool {
    let property = property.into();
    let target = node.downgrade();
    let computation = Computation::new(rt, move || {
        let value = f().into();
        if let Some(node) = target.upgrade() {
            node.set_style_property(&property, value);
        }
    });
    keep_alive(node, computation)
}

/// Keep the text of `node` equal to `f()` (see [`MemoryNode::set_text`]).
pub fn bind_text<S: Into<String>>(
    rt: &Runtime,
    node: &MemoryNode,
    f: impl Fn() -> S + 'static,
) -> bool {
    let target = node.downgrade();
    let computation = Computation::new(rt, move || {
        let text = f().into();
        if let Some(node) = target.upgrade() {
            node.set_text(text);
        }
    });
    let live = keep_alive(node, computation);
    trace!(live, "bound text");
    live
}

/// Append a text node kept equal to `f()`; returns the new node.
pub fn bind_text_child<S: Into<String>>(
    rt: &Runtime,
    parent: &MemoryNode,
    f: impl Fn() -> S + 'static,
) -> MemoryNode {
    let node = MemoryNode::text(String::new());
    bind_text(rt, &node, f);
    parent.append_child(node.clone());
    node
}

/// Append the node `f()` returns and swap it in place whenever `f` produces
/// a different node.
pub fn bind_child(rt: &Runtime, parent: &MemoryNode, f: impl Fn() -> MemoryNode + 'static) -> bool {
    let target = parent.downgrade();
    let current: RefCell<Option<MemoryNode>> = RefCell::new(None);
    let computation = Computation::new(rt, move || {
        let next = f();
        let Some(parent) = target.upgrade() else {
            return;
        };
        match current.replace(Some(next.clone())) {
            Some(old) if old == next => {}
            Some(old) => {
                if !parent.replace_child(next.clone(), &old) {
                    parent.append_child(next);
                }
            }
            None => parent.append_child(next),
        }
    });
    keep_alive(parent, computation)
}
