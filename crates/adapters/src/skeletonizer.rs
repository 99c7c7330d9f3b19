//! Per-file skeleton rendering and per-function static analysis.
//!
//! Given a file's source and language, [`skeletonize`] produces a
//! compressed view that preserves signatures and container structure while
//! collapsing function/method bodies to a one-line summary. The same
//! per-function walk ([`analyze_function`]) is reused by the splitter to
//! populate chunk-level complexity/role/referenced-symbol metadata, so the
//! numbers attached to a chunk and the numbers baked into the anchor
//! chunk's skeleton text always agree.

use crate::splitter::tree_sitter_language;
use codesearch_domain::{ChunkRole, FileSkeleton, Language};
use std::collections::BTreeSet;
use tree_sitter::{Node, Parser};

const MAX_RENDERED_CALLEES: usize = 4;
const FALLBACK_PREVIEW_LINES: usize = 30;
const ORCHESTRATION_COMPLEXITY_THRESHOLD: u32 = 5;
const ORCHESTRATION_CALLEE_THRESHOLD: usize = 5;

/// Result of walking a single function/method body.
#[derive(Debug, Clone, Default)]
pub struct FunctionAnalysis {
    /// `1 + branch nodes + short-circuit operators`.
    pub complexity: u32,
    /// Distinct callee names found in the body, sorted.
    pub callees: Vec<Box<str>>,
    /// `ORCHESTRATION` when complexity and fan-out both cross threshold.
    pub role: ChunkRole,
}

/// Analyze a function/method node's body for complexity, callees, and role.
pub fn analyze_function(node: Node<'_>, source: &str) -> FunctionAnalysis {
    let mut complexity = 1u32;
    let mut callees = BTreeSet::new();
    walk_for_analysis(node, source, &mut complexity, &mut callees);

    let role = if complexity > ORCHESTRATION_COMPLEXITY_THRESHOLD
        && callees.len() > ORCHESTRATION_CALLEE_THRESHOLD
    {
        ChunkRole::Orchestration
    } else {
        ChunkRole::Implementation
    };

    FunctionAnalysis {
        complexity,
        callees: callees.into_iter().collect(),
        role,
    }
}

fn walk_for_analysis(
    node: Node<'_>,
    source: &str,
    complexity: &mut u32,
    callees: &mut BTreeSet<Box<str>>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_branch_kind(child.kind()) {
            *complexity += 1;
        }
        if is_short_circuit(child, source) {
            *complexity += 1;
        }
        if is_call_kind(child.kind())
            && let Some(name) = callee_name(child, source)
        {
            callees.insert(name);
        }
        walk_for_analysis(child, source, complexity, callees);
    }
}

fn is_branch_kind(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "if_expression"
            | "elif_clause"
            | "else_clause"
            | "for_statement"
            | "for_expression"
            | "for_in_statement"
            | "while_statement"
            | "while_expression"
            | "switch_statement"
            | "switch_expression"
            | "match_expression"
            | "match_arm"
            | "catch_clause"
            | "except_clause"
            | "conditional_expression"
            | "ternary_expression"
    )
}

fn is_short_circuit(node: Node<'_>, source: &str) -> bool {
    if !matches!(node.kind(), "binary_expression" | "binary_operator") {
        return false;
    }
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|child| {
        matches!(
            child.utf8_text(source.as_bytes()),
            Ok("&&") | Ok("||") | Ok("and") | Ok("or")
        ) && child.child_count() == 0
    })
}

fn is_call_kind(kind: &str) -> bool {
    matches!(
        kind,
        "call_expression" | "call" | "method_invocation" | "function_call_expression"
    )
}

fn callee_name(node: Node<'_>, source: &str) -> Option<Box<str>> {
    let func = node
        .child_by_field_name("function")
        .or_else(|| node.child_by_field_name("name"))?;
    let text = func.utf8_text(source.as_bytes()).ok()?;
    let name = text.rsplit(['.', ':']).next_back().unwrap_or(text).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.into())
    }
}

const fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "function_item"
            | "function_definition"
            | "function_declaration"
            | "method_definition"
            | "method_declaration"
            | "arrow_function"
            | "function_expression"
    )
}

/// Produce a compressed, signature-preserving view of an entire file.
///
/// Function/method bodies are replaced with a one-line summary comment
/// (capped callee list plus complexity). Unsupported or unparsable
/// languages fall back to a line-preview with a diagnostic header.
#[must_use]
pub fn skeletonize(source: &str, language: Language, file_path: Option<&str>) -> FileSkeleton {
    let Some(ts_language) = tree_sitter_language(language, file_path) else {
        return fallback_preview(source, "no skeletonizer for this language");
    };

    let mut parser = Parser::new();
    if parser.set_language(&ts_language).is_err() {
        return fallback_preview(source, "failed to initialize parser");
    }
    let Some(tree) = parser.parse(source, None) else {
        return fallback_preview(source, "failed to parse file");
    };

    let mut replacements = Vec::new();
    collect_body_replacements(tree.root_node(), source, &mut replacements);
    replacements.sort_by_key(|(start, ..)| *start);

    let mut rendered = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for (start, end, summary) in replacements {
        if start < cursor {
            continue;
        }
        rendered.push_str(&source[cursor..start]);
        rendered.push_str(&summary);
        cursor = end;
    }
    rendered.push_str(&source[cursor..]);

    FileSkeleton {
        text: rendered.into_boxed_str(),
        is_fallback: false,
    }
}

fn collect_body_replacements(
    node: Node<'_>,
    source: &str,
    out: &mut Vec<(usize, usize, String)>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_function_like(child.kind())
            && let Some(body) = child.child_by_field_name("body")
        {
            let analysis = analyze_function(child, source);
            let summary = render_body_summary(&analysis);
            out.push((body.start_byte(), body.end_byte(), summary));
            continue;
        }
        collect_body_replacements(child, source, out);
    }
}

fn render_body_summary(analysis: &FunctionAnalysis) -> String {
    let callees = if analysis.callees.len() > MAX_RENDERED_CALLEES {
        format!(
            "{}, …",
            analysis
                .callees
                .get(..MAX_RENDERED_CALLEES)
                .unwrap_or(&analysis.callees)
                .join(", ")
        )
    } else {
        analysis.callees.join(", ")
    };

    if callees.is_empty() {
        format!("{{ /* ... complexity: {} */ }}", analysis.complexity)
    } else {
        format!(
            "{{ /* ... calls: {callees} (complexity: {}) */ }}",
            analysis.complexity
        )
    }
}

fn fallback_preview(source: &str, reason: &str) -> FileSkeleton {
    let preview = source
        .lines()
        .take(FALLBACK_PREVIEW_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    let text = format!("// skeleton unavailable: {reason}\n{preview}");
    FileSkeleton {
        text: text.into_boxed_str(),
        is_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_function_counts_branches_and_callees() {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .expect("rust grammar");
        let source = "fn f(x: i32) -> i32 { if x > 0 { helper_a(); helper_b(); } else { helper_c(); } x }";
        let tree = parser.parse(source, None).expect("parse");
        let root = tree.root_node();
        let function = root.named_child(0).expect("function node");

        let analysis = analyze_function(function, source);
        assert_eq!(analysis.complexity, 2);
        assert_eq!(analysis.callees.len(), 3);
        assert_eq!(analysis.role, ChunkRole::Implementation);
    }

    #[test]
    fn skeletonize_collapses_function_bodies() {
        let source = "fn greet() {\n    println!(\"hi\");\n}\n";
        let skeleton = skeletonize(source, Language::Rust, Some("greet.rs"));
        assert!(!skeleton.is_fallback);
        assert!(skeleton.text.contains("fn greet()"));
        assert!(!skeleton.text.contains("println"));
    }

    #[test]
    fn skeletonize_falls_back_for_unsupported_language() {
        let skeleton = skeletonize("1 + 1", Language::Text, None);
        assert!(skeleton.is_fallback);
        assert!(skeleton.text.starts_with("// skeleton unavailable"));
    }
}
