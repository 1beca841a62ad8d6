//! Script text parser

use crate::node::ScriptNode;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use xengine_core::{EngineError, Result};

#[derive(Parser)]
#[grammar = "script.pest"]
struct ScriptParser;

/// Parse script text into a root node named `""` whose subnodes are the
/// top-level nodes of the text.
pub fn parse_script(input: &str) -> Result<ScriptNode> {
    let mut pairs = ScriptParser::parse(Rule::file, input).map_err(|e| {
        let line = match e.line_col {
            LineColLocation::Pos((line, _)) => line,
            LineColLocation::Span((line, _), _) => line,
        };
        EngineError::Script {
            line,
            message: e.variant.message().to_string(),
        }
    })?;

    let mut root = ScriptNode::new("");
    if let Some(file) = pairs.next() {
        for pair in file.into_inner() {
            if pair.as_rule() == Rule::node {
                root.add_subnode(build_node(pair));
            }
        }
    }
    Ok(root)
}

fn build_node(pair: Pair<Rule>) -> ScriptNode {
    let mut node = ScriptNode::new("");

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::name => node.set_name(token_text(inner)),
            Rule::value => node.push_value(token_text(inner)),
            Rule::block => {
                for child in inner.into_inner() {
                    if child.as_rule() == Rule::node {
                        node.add_subnode(build_node(child));
                    }
                }
            }
            _ => {}
        }
    }

    node
}

/// Text of a `name`/`value` pair: bare tokens verbatim, strings unescaped
fn token_text(pair: Pair<Rule>) -> String {
    let Some(token) = pair.into_inner().next() else {
        return String::new();
    };
    match token.as_rule() {
        Rule::string => token
            .into_inner()
            .next()
            .map(|inner| unescape(inner.as_str()))
            .unwrap_or_default(),
        _ => token.as_str().to_string(),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_nodes() {
        let root = parse_script("fov 60\nnear 0.5; far 900").unwrap();
        assert_eq!(root.name(), "");
        assert_eq!(root.subnode_count(), 3);
        assert_eq!(root.subnode(1).unwrap().name(), "near");
        assert_eq!(root.subnode_named("far").unwrap().value_f32(0).unwrap(), 900.0);
    }

    #[test]
    fn test_nested_blocks_and_comments() {
        let text = r#"
            // map header
            terrain {
                heightmap "maps/valley hills.png"   # quoted with a space
                size 512 64 512
            }
            trees
            {
                density 0.002
            }
        "#;
        let root = parse_script(text).unwrap();
        let terrain = root.subnode_named("terrain").unwrap();
        assert_eq!(terrain.subnode_count(), 2);
        assert_eq!(
            terrain.subnode_named("heightmap").unwrap().value(0),
            Some("maps/valley hills.png")
        );
        let size = terrain.subnode_named("size").unwrap();
        assert_eq!(size.value_count(), 3);
        assert_eq!(size.value_i32(1).unwrap(), 64);

        let trees = root.subnode_named("trees").unwrap();
        assert!((trees.subnode_named("density").unwrap().value_f64(0).unwrap() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_escaped_quotes() {
        let root = parse_script(r#"title "say \"hi\"""#).unwrap();
        assert_eq!(root.subnode(0).unwrap().value(0), Some("say \"hi\""));
    }

    #[test]
    fn test_unclosed_block_reports_line() {
        let err = parse_script("a 1\nb {\n  c 2\n").unwrap_err();
        match err {
            EngineError::Script { line, .. } => assert!(line >= 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let root = parse_script("  \n // nothing here\n").unwrap();
        assert_eq!(root.subnode_count(), 0);
    }
}
