//! AST-backed complexity via tree-sitter.
//!
//! Each supported language has a query that captures one node per decision
//! point. File complexity is 1 plus the number of captured nodes. Without the
//! `tree-sitter` feature, or for extensions without a grammar, callers fall
//! back to the text estimate.

#[cfg(feature = "tree-sitter")]
use streaming_iterator::StreamingIterator;
#[cfg(feature = "tree-sitter")]
use tree_sitter::{Language, Parser, Query, QueryCursor};

#[cfg(feature = "tree-sitter")]
const TYPESCRIPT_BRANCHES: &str = r#"
(if_statement) @branch
(for_statement) @branch
(for_in_statement) @branch
(while_statement) @branch
(do_statement) @branch
(switch_case) @branch
(catch_clause) @branch
(ternary_expression) @branch
(binary_expression operator: "&&") @branch
(binary_expression operator: "||") @branch
(binary_expression operator: "??") @branch
"#;

#[cfg(feature = "tree-sitter")]
const PYTHON_BRANCHES: &str = r#"
(if_statement) @branch
(elif_clause) @branch
(for_statement) @branch
(while_statement) @branch
(except_clause) @branch
(conditional_expression) @branch
(boolean_operator operator: "and") @branch
(boolean_operator operator: "or") @branch
(list_comprehension) @branch
(dictionary_comprehension) @branch
(set_comprehension) @branch
(generator_expression) @branch
"#;

#[cfg(feature = "tree-sitter")]
const GO_BRANCHES: &str = r#"
(if_statement) @branch
(for_statement) @branch
(communication_case) @branch
(expression_case) @branch
(type_case) @branch
(binary_expression operator: "&&") @branch
(binary_expression operator: "||") @branch
"#;

#[cfg(feature = "tree-sitter")]
const RUST_BRANCHES: &str = r#"
(if_expression) @branch
(for_expression) @branch
(while_expression) @branch
(loop_expression) @branch
(match_arm) @branch
(binary_expression operator: "&&") @branch
(binary_expression operator: "||") @branch
"#;

#[cfg(feature = "tree-sitter")]
const JAVA_BRANCHES: &str = r#"
(if_statement) @branch
(for_statement) @branch
(enhanced_for_statement) @branch
(while_statement) @branch
(do_statement) @branch
(switch_block_statement_group) @branch
(catch_clause) @branch
(ternary_expression) @branch
(binary_expression operator: "&&") @branch
(binary_expression operator: "||") @branch
"#;

#[cfg(feature = "tree-sitter")]
const C_BRANCHES: &str = r#"
(if_statement) @branch
(for_statement) @branch
(while_statement) @branch
(do_statement) @branch
(case_statement) @branch
(conditional_expression) @branch
(binary_expression operator: "&&") @branch
(binary_expression operator: "||") @branch
"#;

#[cfg(feature = "tree-sitter")]
const CPP_BRANCHES: &str = r#"
(if_statement) @branch
(for_statement) @branch
(for_range_loop) @branch
(while_statement) @branch
(do_statement) @branch
(case_statement) @branch
(catch_clause) @branch
(conditional_expression) @branch
(binary_expression operator: "&&") @branch
(binary_expression operator: "||") @branch
"#;

#[cfg(feature = "tree-sitter")]
const SCALA_BRANCHES: &str = r#"
(if_expression) @branch
(case_clause) @branch
(while_expression) @branch
(for_expression) @branch
(catch_clause) @branch
"#;

#[cfg(feature = "tree-sitter")]
const SWIFT_BRANCHES: &str = r#"
(if_statement) @branch
(guard_statement) @branch
(switch_entry) @branch
(while_statement) @branch
(for_statement) @branch
(repeat_while_statement) @branch
(catch_block) @branch
"#;

/// Grammar and branch query for a file extension.
#[cfg(feature = "tree-sitter")]
fn grammar_for(ext: &str) -> Option<(Language, &'static str)> {
    let grammar = match ext {
        "ts" => (tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(), TYPESCRIPT_BRANCHES),
        "tsx" | "jsx" => (tree_sitter_typescript::LANGUAGE_TSX.into(), TYPESCRIPT_BRANCHES),
        "js" | "mjs" | "cjs" => (tree_sitter_javascript::LANGUAGE.into(), TYPESCRIPT_BRANCHES),
        "py" => (tree_sitter_python::LANGUAGE.into(), PYTHON_BRANCHES),
        "go" => (tree_sitter_go::LANGUAGE.into(), GO_BRANCHES),
        "rs" => (tree_sitter_rust::LANGUAGE.into(), RUST_BRANCHES),
        "java" => (tree_sitter_java::LANGUAGE.into(), JAVA_BRANCHES),
        "c" | "h" => (tree_sitter_c::LANGUAGE.into(), C_BRANCHES),
        "cpp" | "hpp" => (tree_sitter_cpp::LANGUAGE.into(), CPP_BRANCHES),
        "scala" => (tree_sitter_scala::LANGUAGE.into(), SCALA_BRANCHES),
        "swift" => (tree_sitter_swift::LANGUAGE.into(), SWIFT_BRANCHES),
        _ => return None,
    };
    Some(grammar)
}

/// Count decision points in `source` using the grammar for `ext`.
///
/// Returns `None` when no grammar is available or the query cannot be built.
#[cfg(feature = "tree-sitter")]
pub fn syntax_complexity(ext: &str, source: &str) -> Option<u32> {
    let (language, branches) = grammar_for(ext)?;

    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&language) {
        tracing::debug!("cannot load {} grammar: {}", ext, e);
        return None;
    }
    let tree = parser.parse(source, None)?;

    let query = match Query::new(&language, branches) {
        Ok(q) => q,
        Err(e) => {
            tracing::debug!("invalid branch query for {}: {}", ext, e);
            return None;
        }
    };
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source.as_bytes());

    let mut complexity = 1;
    while matches.next().is_some() {
        complexity += 1;
    }
    Some(complexity)
}

#[cfg(not(feature = "tree-sitter"))]
pub fn syntax_complexity(_ext: &str, _source: &str) -> Option<u32> {
    None
}

#[cfg(all(test, feature = "tree-sitter"))]
mod tests {
    use super::*;

    #[test]
    fn test_typescript_complexity() {
        let source = r#"
function process(x: number): number {
    // if this comment counted the result would be wrong
    if (x > 0) {
        for (let i = 0; i < x; i++) {
            if (i % 2 === 0 && i > 5) {
                return i;
            }
        }
    }
    return x > 10 ? 1 : 0;
}
"#;
        assert_eq!(syntax_complexity("ts", source), Some(6));
    }

    #[test]
    fn test_string_contents_are_not_branches() {
        let source = "const label = \"if this || that\";\n";
        assert_eq!(syntax_complexity("js", source), Some(1));
    }

    #[test]
    fn test_python_complexity() {
        let source = r#"
def complex(x):
    if x > 0:
        for i in range(x):
            if i % 2 == 0:
                print(i)
    return x
"#;
        assert_eq!(syntax_complexity("py", source), Some(4));
    }

    #[test]
    fn test_rust_complexity() {
        let source = r#"
fn classify(n: i32) -> &'static str {
    match n {
        0 => "zero",
        n if n < 0 => "negative",
        _ => "positive",
    }
}
"#;
        // three match arms
        assert_eq!(syntax_complexity("rs", source), Some(4));
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(syntax_complexity("md", "# title"), None);
    }
}
