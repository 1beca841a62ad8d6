//! Script file checks

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use xengine_game::{MapDescription, TerrainSource};
use xengine_script::ScriptNode;

#[derive(Subcommand)]
pub enum ScriptCommands {
    /// Parse a script file. `.map` files are also validated as maps.
    Check {
        file: PathBuf,

        /// Print the parsed tree
        #[arg(long)]
        tree: bool,
    },
}

pub fn run(cmd: ScriptCommands) -> Result<()> {
    match cmd {
        ScriptCommands::Check { file, tree } => check(&file, tree),
    }
}

fn count_nodes(node: &ScriptNode) -> usize {
    node.subnodes().iter().map(|n| 1 + count_nodes(n)).sum()
}

fn print_tree(node: &ScriptNode, depth: usize) {
    for child in node.subnodes() {
        println!("{}{} {}", "  ".repeat(depth + 1), child.name(), child.values().join(" "));
        print_tree(child, depth + 1);
    }
}

fn check(file: &Path, tree: bool) -> Result<()> {
    let root = ScriptNode::load(file).with_context(|| format!("Failed to parse {}", file.display()))?;
    println!("{}: {} nodes", file.display(), count_nodes(&root));
    if tree {
        print_tree(&root, 0);
    }

    if file.extension().is_some_and(|ext| ext == "map") {
        let map = MapDescription::from_script(&root).with_context(|| format!("{} is not a valid map", file.display()))?;
        match &map.terrain.source {
            TerrainSource::Heightmap(name) => println!("  terrain: heightmap {}", name),
            TerrainSource::Flat(res) => println!("  terrain: flat, resolution {}", res),
        }
        if let Some(trees) = &map.trees {
            println!("  trees: density {}, size {}..{}", trees.density, trees.min_size, trees.max_size);
        }
        if let Some(clutter) = &map.clutter {
            println!("  clutter: {} types", clutter.types.len());
        }
        println!("  models: {}", map.models.len());
        if let Some(bullets) = &map.bullets {
            println!("  bullets: {}", bullets);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_validates_maps() {
        let dir = std::env::temp_dir().join(format!("xengine_cli_script_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let plain = dir.join("notes.txt");
        std::fs::write(&plain, "a 1 { b 2; c 3 }\n").unwrap();
        assert_eq!(count_nodes(&ScriptNode::load(&plain).unwrap()), 3);
        check(&plain, true).unwrap();

        let good = dir.join("good.map");
        std::fs::write(&good, "terrain { resolution 64 }\nmodel \"tank.xmesh\"\n").unwrap();
        check(&good, false).unwrap();

        let bad = dir.join("bad.map");
        std::fs::write(&bad, "trees { density 1 }\n").unwrap();
        assert!(check(&bad, false).is_err());

        let broken = dir.join("broken.txt");
        std::fs::write(&broken, "a {").unwrap();
        assert!(check(&broken, false).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
