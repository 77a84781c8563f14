//! Helpers for pulling typed values out of KDL nodes.
//!
//! A "field" is a child node whose first argument carries the value, e.g.
//! `address "0.0.0.0:5001"` inside a block.

use kdl::{KdlNode, KdlValue};

fn field<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()?.get(name)
}

fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

/// Get the first positional argument of a node as a string
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    first_arg(node)?.as_string().map(str::to_string)
}

/// Get a string field from a block
pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    get_first_arg_string(field(node, name)?)
}

/// Get an integer field from a block
pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i128> {
    first_arg(field(node, name)?)?.as_integer()
}

/// Get a boolean field from a block
pub fn get_bool_entry(node: &KdlNode, name: &str) -> Option<bool> {
    first_arg(field(node, name)?)?.as_bool()
}

/// Get every string argument of a field, e.g. `alpn-protocols "a" "b"`
pub fn get_string_list(node: &KdlNode, name: &str) -> Option<Vec<String>> {
    let field = field(node, name)?;
    Some(
        field
            .entries()
            .iter()
            .filter(|e| e.name().is_none())
            .filter_map(|e| e.value().as_string().map(str::to_string))
            .collect(),
    )
}
