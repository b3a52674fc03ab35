#![forbid(unsafe_code)]

//! Attribute values and how they land on a node.

use crate::node::MemoryNode;

/// Value written to an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    /// `true` sets an empty attribute, `false` removes it.
    Bool(bool),
}

impl AttrValue {
    /// Text form, or `None` for `Bool(false)`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bool(true) => Some(""),
            Self::Bool(false) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for AttrValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! numeric_attr {
    ($($t:ty),*) => {
        $(impl From<$t> for AttrValue {
            fn from(value: $t) -> Self {
                Self::Text(value.to_string())
            }
        })*
    };
}

numeric_attr!(i32, i64, u32, u64, usize, f64);

/// Write `value` to `node` under `name`.
///
/// `class`/`className` set the class name and `style` replaces the inline
/// declarations; for those two a `false` value clears them. Any other name is
/// a plain attribute.
pub fn apply_attribute(node: &MemoryNode, name: &str, value: &AttrValue) {
    match name {
        "class" | "className" => node.set_class_name(value.as_text().unwrap_or_default()),
        "style" => node.set_style_text(value.as_text().unwrap_or_default()),
        _ => match value.as_text() {
            Some(text) => node.set_attribute(name, text),
            None => {
                node.remove_attribute(name);
            }
        },
    }
}

/// Space-separated names of the enabled classes, in the given order.
#[must_use]
pub fn class_list(classes: &[(&str, bool)]) -> String {
    classes
        .iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `prop: value;` declarations, skipping empty values.
#[must_use]
pub fn style_map(properties: &[(&str, &str)]) -> String {
    properties
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(prop, value)| format!("{prop}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}
