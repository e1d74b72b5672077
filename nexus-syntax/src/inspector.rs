//! Lua syntax inspector
//!
//! Parses plugin sources and answers structural queries. Lua has no class
//! keyword, so class declarations are recognised from the idioms plugins use:
//!
//! ```lua
//! local Scan = PluginBase:extend("Scan")             -- Base:extend(...)
//! local Probe = class(nexus.PluginBase, Mixin)       -- class(BaseA, BaseB)
//! local Brute = setmetatable({}, { __index = Base }) -- metatable inheritance
//! setmetatable(Legacy, { __index = PluginBase })     -- statement form
//! ```

use crate::error::{Result, SyntaxError};
use crate::ir::{AttributeAccess, CallSite, ClassDecl, ImportRef};
use crate::nodes::{
    call_arguments, call_target, field_or_nth, find_child_by_kind, first_error, named_children,
    node_line, node_text, node_to_span, qualified_name, string_literal_value, walk_nodes,
};
use std::collections::BTreeMap;
use tree_sitter::Node;

/// Parses Lua sources without executing them
pub struct SyntaxInspector {
    language: tree_sitter::Language,
}

impl SyntaxInspector {
    /// Create a new inspector for Lua
    pub fn new() -> Self {
        Self {
            language: tree_sitter_lua::LANGUAGE.into(),
        }
    }

    /// Parse source text into a [`SyntaxTree`]
    ///
    /// Fails with [`SyntaxError::Parse`] when the tree contains any error or
    /// missing node.
    pub fn parse(&self, source: &str) -> Result<SyntaxTree> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| SyntaxError::TreeSitter(e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| SyntaxError::parse_error(1, "parser produced no tree"))?;

        if let Some((line, reason)) = first_error(tree.root_node()) {
            return Err(SyntaxError::parse_error(line, reason));
        }

        Ok(SyntaxTree {
            tree,
            source: source.to_string(),
        })
    }

    /// Parse raw bytes; invalid UTF-8 sequences are replaced
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<SyntaxTree> {
        self.parse(&String::from_utf8_lossy(bytes))
    }
}

impl Default for SyntaxInspector {
    fn default() -> Self {
        Self::new()
    }
}

/// A successfully parsed source file
pub struct SyntaxTree {
    tree: tree_sitter::Tree,
    source: String,
}

impl SyntaxTree {
    /// The parsed source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Class declarations in source order
    pub fn classes(&self) -> Vec<ClassDecl> {
        let mut classes = Vec::new();

        walk_nodes(self.tree.root_node(), |node| match node.kind() {
            "assignment_statement" => self.collect_assigned_classes(&node, &mut classes),
            "function_call" => {
                if let Some(class) = self.statement_metatable_class(&node) {
                    classes.push(class);
                }
            }
            _ => {}
        });

        classes
    }

    /// Mapping from declared class name to its ordered base names
    ///
    /// When a name is declared twice the first declaration wins.
    pub fn find_class_bases(&self) -> BTreeMap<String, Vec<String>> {
        let mut bases = BTreeMap::new();
        for class in self.classes() {
            bases.entry(class.name).or_insert(class.bases);
        }
        bases
    }

    /// `require` calls with a literal module name
    pub fn imports(&self) -> Vec<ImportRef> {
        let mut imports = Vec::new();

        walk_nodes(self.tree.root_node(), |node| {
            if node.kind() != "function_call" || !self.is_bare_call(&node, "require") {
                return;
            }
            let module = call_arguments(&node)
                .first()
                .and_then(|arg| string_literal_value(arg, &self.source));
            if let Some(module) = module {
                let line = node_line(&node);
                imports.push(ImportRef {
                    module,
                    line,
                    snippet: self.snippet(line),
                });
            }
        });

        imports
    }

    /// Every call expression
    pub fn calls(&self) -> Vec<CallSite> {
        let mut calls = Vec::new();

        walk_nodes(self.tree.root_node(), |node| {
            if node.kind() != "function_call" {
                return;
            }
            if let Some(target) = call_target(&node) {
                let line = node_line(&node);
                calls.push(CallSite {
                    callee: node_text(&target, &self.source).to_string(),
                    is_bare: target.kind() == "identifier",
                    line,
                    snippet: self.snippet(line),
                });
            }
        });

        calls
    }

    /// `object.attribute` accesses whose object is a bare identifier
    pub fn attribute_accesses(&self) -> Vec<AttributeAccess> {
        let mut accesses = Vec::new();

        walk_nodes(self.tree.root_node(), |node| {
            if node.kind() != "dot_index_expression" {
                return;
            }
            let (Some(table), Some(field)) =
                (field_or_nth(&node, "table", 0), field_or_nth(&node, "field", 1))
            else {
                return;
            };
            if table.kind() != "identifier" {
                return;
            }
            let line = node_line(&node);
            accesses.push(AttributeAccess {
                object: node_text(&table, &self.source).to_string(),
                attribute: node_text(&field, &self.source).to_string(),
                line,
                snippet: self.snippet(line),
            });
        });

        accesses
    }

    /// Trimmed text of a 1-indexed line
    pub fn snippet(&self, line: usize) -> String {
        line.checked_sub(1)
            .and_then(|index| self.source.lines().nth(index))
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Class recognition
    // ------------------------------------------------------------------------

    fn collect_assigned_classes(&self, statement: &Node, classes: &mut Vec<ClassDecl>) {
        let (Some(targets), Some(values)) = (
            find_child_by_kind(statement, "variable_list"),
            find_child_by_kind(statement, "expression_list"),
        ) else {
            return;
        };

        let targets = named_children(&targets);
        let values = named_children(&values);

        for (target, value) in targets.iter().zip(values.iter()) {
            let Some(name) = qualified_name(target, &self.source) else {
                continue;
            };
            if let Some(bases) = self.class_bases_of(value) {
                classes.push(ClassDecl {
                    name,
                    bases,
                    span: node_to_span(statement),
                });
            }
        }
    }

    /// `setmetatable(X, { __index = Base })` used as a statement
    fn statement_metatable_class(&self, call: &Node) -> Option<ClassDecl> {
        if !self.is_bare_call(call, "setmetatable") {
            return None;
        }
        if call
            .parent()
            .map(|parent| parent.kind() == "expression_list" || parent.kind() == "arguments")
            .unwrap_or(false)
        {
            return None;
        }

        let args = call_arguments(call);
        let name = qualified_name(args.first()?, &self.source)?;
        let base = self.index_base(args.get(1)?)?;

        Some(ClassDecl {
            name,
            bases: vec![base],
            span: node_to_span(call),
        })
    }

    /// Bases declared by a class-producing expression, if it is one
    fn class_bases_of(&self, value: &Node) -> Option<Vec<String>> {
        if value.kind() != "function_call" {
            return None;
        }
        let target = call_target(value)?;

        match target.kind() {
            "method_index_expression" => {
                let method = field_or_nth(&target, "method", 1)?;
                if node_text(&method, &self.source) != "extend" {
                    return None;
                }
                let table = field_or_nth(&target, "table", 0)?;
                Some(vec![qualified_name(&table, &self.source)?])
            }
            "identifier" => match node_text(&target, &self.source) {
                "class" => Some(
                    call_arguments(value)
                        .iter()
                        .filter_map(|arg| qualified_name(arg, &self.source))
                        .collect(),
                ),
                "setmetatable" => {
                    let args = call_arguments(value);
                    Some(vec![self.index_base(args.get(1)?)?])
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// The `__index` entry of a metatable constructor
    fn index_base(&self, metatable: &Node) -> Option<String> {
        if metatable.kind() != "table_constructor" {
            return None;
        }

        named_children(metatable)
            .into_iter()
            .filter(|field| field.kind() == "field")
            .find_map(|field| {
                let key = field.child_by_field_name("name")?;
                if key.kind() != "identifier" || node_text(&key, &self.source) != "__index" {
                    return None;
                }
                let value = field.child_by_field_name("value")?;
                qualified_name(&value, &self.source)
            })
    }

    fn is_bare_call(&self, call: &Node, name: &str) -> bool {
        call_target(call)
            .map(|target| {
                target.kind() == "identifier" && node_text(&target, &self.source) == name
            })
            .unwrap_or(false)
    }
}
