#![forbid(unsafe_code)]

//! Node rendering for SPUI.
//!
//! [`ListReconciler`] turns the change log of an
//! [`ObservableVec`](spui_reactive::ObservableVec) into child edits on any
//! [`NodeHost`]. [`MemoryNode`] is a headless element tree implementing that
//! seam, with reactive attribute, style, text and child bindings and the
//! [`h`] builder on top.

pub mod attr;
pub mod bind;
pub mod h;
pub mod host;
pub mod list;
pub mod node;
pub mod reconciler;

pub use attr::{AttrValue, apply_attribute, class_list, style_map};
pub use bind::{bind_attribute, bind_child, bind_style_property, bind_text, bind_text_child};
pub use h::{ElementBuilder, h, select};
pub use host::NodeHost;
pub use list::{ElementList, element_list};
pub use node::{EventHandler, MemoryNode, WeakMemoryNode};
pub use reconciler::{ListReconciler, NodeFactory};
