//! Script node tree

use crate::parser::parse_script;
use std::fmt;
use std::path::Path;
use xengine_core::{EngineError, Result};

/// A named node with ordered values and ordered (possibly repeated) subnodes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScriptNode {
    name: String,
    values: Vec<String>,
    subnodes: Vec<ScriptNode>,
}

impl ScriptNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            subnodes: Vec::new(),
        }
    }

    /// Parse script text; see [`parse_script`]
    pub fn parse(text: &str) -> Result<Self> {
        parse_script(text)
    }

    /// Read and parse a script file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let root = parse_script(&text)?;
        log::debug!(
            "Parsed script {} ({} top-level nodes)",
            path.display(),
            root.subnode_count()
        );
        Ok(root)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn subnodes(&self) -> &[ScriptNode] {
        &self.subnodes
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn subnode_count(&self) -> usize {
        self.subnodes.len()
    }

    pub fn push_value(&mut self, value: impl Into<String>) {
        self.values.push(value.into());
    }

    /// Builder form of [`push_value`](Self::push_value)
    pub fn with_value(mut self, value: impl ToString) -> Self {
        self.values.push(value.to_string());
        self
    }

    pub fn add_subnode(&mut self, node: ScriptNode) {
        self.subnodes.push(node);
    }

    /// Remove the first subnode called `name`
    pub fn remove_subnode(&mut self, name: &str) -> Option<ScriptNode> {
        let index = self.subnodes.iter().position(|n| n.name == name)?;
        Some(self.subnodes.remove(index))
    }

    pub fn subnode(&self, index: usize) -> Option<&ScriptNode> {
        self.subnodes.get(index)
    }

    /// First subnode called `name`
    pub fn subnode_named(&self, name: &str) -> Option<&ScriptNode> {
        self.subnodes.iter().find(|n| n.name == name)
    }

    pub fn subnodes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ScriptNode> + 'a {
        self.subnodes.iter().filter(move |n| n.name == name)
    }

    /// Like [`subnode_named`](Self::subnode_named) but missing is a configuration error
    pub fn required_subnode(&self, name: &str) -> Result<&ScriptNode> {
        self.subnode_named(name).ok_or_else(|| {
            EngineError::Configuration(format!("'{}' is missing required '{}'", self.label(), name))
        })
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn value_f32(&self, index: usize) -> Result<f32> {
        self.parse_value(index)
    }

    pub fn value_f64(&self, index: usize) -> Result<f64> {
        self.parse_value(index)
    }

    pub fn value_i32(&self, index: usize) -> Result<i32> {
        self.parse_value(index)
    }

    /// Value `index` of the first subnode called `name`, or `default` if that
    /// subnode is absent. A present but malformed value is still an error.
    pub fn subnode_f32_or(&self, name: &str, index: usize, default: f32) -> Result<f32> {
        match self.subnode_named(name) {
            Some(node) => node.value_f32(index),
            None => Ok(default),
        }
    }

    fn parse_value<T: std::str::FromStr>(&self, index: usize) -> Result<T> {
        let raw = self.value(index).ok_or_else(|| {
            EngineError::Configuration(format!("'{}' has no value #{}", self.label(), index))
        })?;
        raw.parse().map_err(|_| {
            EngineError::Configuration(format!(
                "'{}' value #{} is not a number: '{}'",
                self.label(),
                index,
                raw
            ))
        })
    }

    fn label(&self) -> &str {
        if self.name.is_empty() {
            "<root>"
        } else {
            &self.name
        }
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        write!(f, "{}{}", indent, quote(&self.name))?;
        for value in &self.values {
            write!(f, " {}", quote(value))?;
        }
        if self.subnodes.is_empty() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for child in &self.subnodes {
            child.write_node(f, depth + 1)?;
        }
        writeln!(f, "{}}}", indent)
    }
}

/// Writes the subnodes as a script document, so that parsing the output
/// yields a root equal to this node (apart from its name).
impl fmt::Display for ScriptNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for child in &self.subnodes {
            child.write_node(f, 0)?;
        }
        Ok(())
    }
}

fn quote(token: &str) -> String {
    let needs_quotes = token.is_empty()
        || token.contains("//")
        || token
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '"' | '#' | '\\'));
    if !needs_quotes {
        return token.to_string();
    }

    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    for c in token.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScriptNode {
        let mut root = ScriptNode::new("");
        let mut clutter = ScriptNode::new("clutter");
        clutter.add_subnode(ScriptNode::new("texture").with_value("grass tuft.png"));
        clutter.add_subnode(ScriptNode::new("density").with_value(0.5));
        clutter.add_subnode(ScriptNode::new("size").with_value(0.4).with_value(1.2));
        root.add_subnode(clutter);
        root.add_subnode(ScriptNode::new("note").with_value("").with_value("a;b{c}#d"));
        root.add_subnode(ScriptNode::new("clutter").with_value(2));
        root
    }

    #[test]
    fn test_display_parses_back() {
        let root = sample();
        let text = root.to_string();
        let parsed = ScriptNode::parse(&text).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn test_lookup_by_name() {
        let root = sample();
        assert_eq!(root.subnodes_named("clutter").count(), 2);
        assert_eq!(root.subnode_named("clutter").unwrap().subnode_count(), 3);
        assert!(root.subnode_named("missing").is_none());
        assert!(root.required_subnode("missing").unwrap_err().is_configuration());
    }

    #[test]
    fn test_numeric_accessors() {
        let node = ScriptNode::new("size").with_value(0.4).with_value("big");
        assert!((node.value_f32(0).unwrap() - 0.4).abs() < 1e-6);
        assert!(node.value_f32(1).unwrap_err().is_configuration());
        assert!(node.value_i32(5).unwrap_err().is_configuration());
    }

    #[test]
    fn test_subnode_default() {
        let node = ScriptNode::new("effect").with_value(1);
        let mut parent = ScriptNode::new("");
        parent.add_subnode(node);
        parent.add_subnode(ScriptNode::new("life").with_value(3.5));
        assert_eq!(parent.subnode_f32_or("life", 0, 1.0).unwrap(), 3.5);
        assert_eq!(parent.subnode_f32_or("gravity", 0, 9.8).unwrap(), 9.8);
    }

    #[test]
    fn test_remove_subnode() {
        let mut root = sample();
        let removed = root.remove_subnode("clutter").unwrap();
        assert_eq!(removed.subnode_count(), 3);
        assert_eq!(root.subnodes_named("clutter").count(), 1);
        assert!(root.remove_subnode("nothing").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("xengine-script-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("map.txt");
        std::fs::write(&path, sample().to_string()).unwrap();

        let loaded = ScriptNode::load(&path).unwrap();
        assert_eq!(loaded, sample());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
