//! Small tree-sitter helpers shared by the language extractors.

use tree_sitter::Node;

/// Recursively collect every node of `kind` under `node`, depth-first —
/// mirrors the original's `_find_nodes_by_type`.
pub fn find_nodes_by_kind<'a>(node: Node<'a>, kind: &str, out: &mut Vec<Node<'a>>) {
    if node.kind() == kind {
        out.push(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        find_nodes_by_kind(child, kind, out);
    }
}

pub fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub fn line_start(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub fn line_end(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}
