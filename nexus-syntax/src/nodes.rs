//! Tree-sitter node helpers
//!
//! Small, grammar-aware utilities shared by the structural queries in
//! [`crate::inspector`]. Field lookups fall back to positional children so
//! the helpers keep working across minor grammar revisions.

use crate::ir::Span;
use tree_sitter::Node;

/// Convert a Tree-sitter node to our Span type
pub fn node_to_span(node: &Node) -> Span {
    Span {
        start: node.start_byte(),
        end: node.end_byte(),
        start_line: node.start_position().row + 1, // 1-indexed
        end_line: node.end_position().row + 1,
    }
}

/// Get the text content of a Tree-sitter node
pub fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// 1-indexed line of a node
pub fn node_line(node: &Node) -> usize {
    node.start_position().row + 1
}

/// Find a child node by its kind
#[allow(clippy::manual_find)]
pub fn find_child_by_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            return Some(child);
        }
    }
    None
}

/// Named children, skipping comments
pub fn named_children<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// A field child, or the named child at `fallback` when the field is absent
pub fn field_or_nth<'a>(node: &Node<'a>, field: &str, fallback: usize) -> Option<Node<'a>> {
    node.child_by_field_name(field)
        .or_else(|| named_children(node).into_iter().nth(fallback))
}

/// Visit every node below (and including) `root` in source order
pub fn walk_nodes<'a>(root: Node<'a>, mut visit: impl FnMut(Node<'a>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());

        if cursor.goto_first_child() {
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// First `ERROR` or `MISSING` node under `root`, as (line, reason)
pub fn first_error(root: Node) -> Option<(usize, &'static str)> {
    if !root.has_error() {
        return None;
    }

    let mut found = None;
    walk_nodes(root, |node| {
        if found.is_some() {
            return;
        }
        if node.is_missing() {
            found = Some((node_line(&node), "Missing syntax element"));
        } else if node.is_error() {
            found = Some((node_line(&node), "Syntax error"));
        }
    });

    // has_error() can be set without a reachable ERROR node
    found.or(Some((node_line(&root), "Syntax error")))
}

/// Reconstruct a dotted name from an identifier or a `dot_index_expression`
/// chain (`nexus.core.PluginBase`)
///
/// The chain is walked right-to-left, collecting field names, then reversed.
/// Roots that are not identifiers (calls, subscripts) contribute nothing.
pub fn qualified_name(node: &Node, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "dot_index_expression" => {
            let mut parts = Vec::new();
            let mut current = *node;

            while current.kind() == "dot_index_expression" {
                let field = field_or_nth(&current, "field", 1)?;
                parts.push(node_text(&field, source).to_string());
                current = field_or_nth(&current, "table", 0)?;
            }

            if current.kind() == "identifier" {
                parts.push(node_text(&current, source).to_string());
            }

            if parts.is_empty() {
                return None;
            }
            parts.reverse();
            Some(parts.join("."))
        }
        _ => None,
    }
}

/// Value of a string literal node, without its delimiters
pub fn string_literal_value(node: &Node, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }

    if let Some(content) = node
        .child_by_field_name("content")
        .or_else(|| find_child_by_kind(node, "string_content"))
    {
        return Some(node_text(&content, source).to_string());
    }

    Some(strip_delimiters(node_text(node, source)).to_string())
}

fn strip_delimiters(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') {
        return &text[1..text.len() - 1];
    }

    // Long brackets: [[...]], [==[...]==]
    if let Some(rest) = text.strip_prefix('[') {
        let level = rest.bytes().take_while(|b| *b == b'=').count();
        let open = level + 2;
        let close = level + 2;
        if text.len() >= open + close {
            return &text[open..text.len() - close];
        }
    }

    text
}

/// Arguments of a `function_call` node, skipping punctuation and comments
pub fn call_arguments<'a>(call: &Node<'a>) -> Vec<Node<'a>> {
    let args = call
        .child_by_field_name("arguments")
        .or_else(|| find_child_by_kind(call, "arguments"));

    match args {
        Some(args) => named_children(&args),
        None => Vec::new(),
    }
}

/// Callee of a `function_call` node
pub fn call_target<'a>(call: &Node<'a>) -> Option<Node<'a>> {
    field_or_nth(call, "name", 0)
}
