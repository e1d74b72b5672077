//! Structural scan (pass A)
//!
//! Pattern matching over the syntax tree. Imports and dynamic code execution
//! are CRITICAL; risky `module.field` access is a WARNING.

use super::SecurityFinding;
use nexus_syntax::{SyntaxInspector, SyntaxTree};

/// Modules whose import alone makes a plugin unsafe
pub const DANGEROUS_IMPORTS: &[&str] = &[
    "os", "io", "debug", // process, file and interpreter control
    "ffi",               // native code
    "posix", "lfs",      // file-system and process escalation
    "socket.unix",       // local socket access
    "binser", "serpent", // deserialization of arbitrary values
];

/// Functions that compile or run code from data
pub const DYNAMIC_EXECUTION: &[&str] = &["load", "loadstring", "dofile", "loadfile"];

/// (module, field) pairs worth flagging wherever they appear
pub const DANGEROUS_ATTRIBUTES: &[(&str, &str)] = &[
    ("os", "execute"),
    ("os", "exit"),
    ("os", "remove"),
    ("os", "rename"),
    ("os", "tmpname"),
    ("io", "popen"),
    ("package", "loadlib"),
    ("package", "path"),
    ("package", "cpath"),
    ("package", "loaded"),
    ("debug", "sethook"),
    ("debug", "setupvalue"),
    ("debug", "setlocal"),
    ("debug", "getregistry"),
    ("string", "dump"),
];

/// Whether `module` is a dangerous import or a submodule of one
pub fn is_dangerous_import(module: &str) -> bool {
    DANGEROUS_IMPORTS.iter().any(|entry| {
        module == *entry
            || module
                .strip_prefix(entry)
                .map(|rest| rest.starts_with('.'))
                .unwrap_or(false)
    })
}

/// Whether `object.attribute` is a flagged pair
pub fn is_dangerous_attribute(object: &str, attribute: &str) -> bool {
    DANGEROUS_ATTRIBUTES
        .iter()
        .any(|(module, field)| *module == object && *field == attribute)
}

/// Scan a parsed tree. Findings are ordered by line.
pub fn scan(tree: &SyntaxTree) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();

    for import in tree.imports() {
        if is_dangerous_import(&import.module) {
            findings.push(SecurityFinding::critical(
                format!("Potentially dangerous import detected: {}", import.module),
                import.line,
                import.snippet,
            ));
        }
    }

    for call in tree.calls() {
        if call.is_bare && DYNAMIC_EXECUTION.contains(&call.callee.as_str()) {
            findings.push(SecurityFinding::critical(
                format!("Dynamic code execution via {}()", call.callee),
                call.line,
                call.snippet,
            ));
        }
    }

    for access in tree.attribute_accesses() {
        if is_dangerous_attribute(&access.object, &access.attribute) {
            findings.push(SecurityFinding::warning(
                format!("Potentially dangerous system access: {}", access.qualified()),
                access.line,
                access.snippet,
            ));
        }
    }

    findings.sort_by_key(|f| f.line);
    findings
}

/// Parse and scan raw bytes; a parse failure is itself CRITICAL
pub fn scan_source(inspector: &SyntaxInspector, bytes: &[u8]) -> Vec<SecurityFinding> {
    match inspector.parse_bytes(bytes) {
        Ok(tree) => scan(&tree),
        Err(e) => vec![SecurityFinding::critical(
            format!("Structural analysis failed: {}", e),
            e.line().unwrap_or(0),
            "",
        )],
    }
}
