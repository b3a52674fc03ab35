#![forbid(unsafe_code)]

//! Element builder.
//!
//! ```
//! use spui_dom::{MemoryNode, h};
//! use spui_reactive::{Runtime, Stream};
//!
//! let rt = Runtime::new();
//! let label = Stream::new(&rt, "save".to_owned());
//! let l = label.clone();
//! let button = h(&rt, "button")
//!     .attr("type", "submit")
//!     .text_with(move || l.get())
//!     .build();
//!
//! label.set("saved".to_owned());
//! assert_eq!(button.outer_html(), "<button type=\"submit\">saved</button>");
//! ```

use std::hash::Hash;

use spui_reactive::{ObservableVec, Runtime};

use crate::attr::{AttrValue, apply_attribute};
use crate::bind::{bind_attribute, bind_child, bind_style_property, bind_text_child};
use crate::list::ElementList;
use crate::node::MemoryNode;

/// Start building a `tag` element whose dynamic parts run on `rt`.
#[must_use]
pub fn h(rt: &Runtime, tag: &str) -> ElementBuilder {
    ElementBuilder {
        rt: rt.clone(),
        node: MemoryNode::element(tag),
    }
}

/// Pick `if_true` or `if_false` by `condition`.
pub fn select<T>(condition: bool, if_true: T, if_false: T) -> T {
    if condition { if_true } else { if_false }
}

/// Builder returned by [`h`].
#[derive(Debug)]
#[must_use]
pub struct ElementBuilder {
    rt: Runtime,
    node: MemoryNode,
}

impl ElementBuilder {
    /// Static attribute.
    pub fn attr(self, name: &str, value: impl Into<AttrValue>) -> Self {
        apply_attribute(&self.node, name, &value.into());
        self
    }

    /// Attribute recomputed whenever a stream read by `f` changes.
    pub fn attr_with<V: Into<AttrValue>>(
        self,
        name: &str,
        f: impl Fn() -> V + 'static,
    ) -> Self {
        bind_attribute(&self.rt, &self.node, name, f);
        self
    }

    pub fn class_with(self, f: impl Fn() -> String + 'static) -> Self {
        self.attr_with("class", f)
    }

    /// One inline style declaration bound to `f`.
    pub fn style_with<S: Into<String>>(
        self,
        property: &str,
        f: impl Fn() -> S + 'static,
    ) -> Self {
        bind_style_property(&self.rt, &self.node, property, f);
        self
    }

    pub fn on(self, event: &str, handler: impl Fn(&MemoryNode) + 'static) -> Self {
        self.node.on(event, handler);
        self
    }

    pub fn child(self, child: MemoryNode) -> Self {
        self.node.append_child(child);
        self
    }

    pub fn children(self, children: impl IntoIterator<Item = MemoryNode>) -> Self {
        for child in children {
            self.node.append_child(child);
        }
        self
    }

    /// Static text child.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.node.append_child(MemoryNode::text(text));
        self
    }

    /// Text child updated in place.
    pub fn text_with<S: Into<String>>(self, f: impl Fn() -> S + 'static) -> Self {
        bind_text_child(&self.rt, &self.node, f);
        self
    }

    /// Child node swapped in place whenever `f` yields a different node.
    pub fn child_with(self, f: impl Fn() -> MemoryNode + 'static) -> Self {
        bind_child(&self.rt, &self.node, f);
        self
    }

    /// Append a list's root; this element keeps the list alive.
    pub fn list<M>(self, list: ElementList<M>) -> Self
    where
        M: Clone + Eq + Hash + 'static,
    {
        self.node.append_child(list.root().clone());
        self.node.retain(Box::new(list));
        self
    }

    /// Turn this element into the root of a list following `models`.
    pub fn into_list<M>(
        self,
        models: &ObservableVec<M>,
        factory: impl Fn(&MemoryNode, &M, usize) -> MemoryNode + 'static,
    ) -> ElementList<M>
    where
        M: Clone + Eq + Hash + 'static,
    {
        ElementList::new(self.node, models, factory)
    }

    /// The node built so far.
    pub fn node(&self) -> &MemoryNode {
        &self.node
    }

    #[must_use]
    pub fn build(self) -> MemoryNode {
        self.node
    }
}
