//! X-engine Script - Nested node/value text format
//!
//! Maps, clutter types, particle effects and bullet types are described in
//! a small text format where every node has a name, an ordered list of
//! values and an ordered list of named subnodes:
//!
//! ```text
//! terrain {
//!     heightmap "maps/valley.png"
//!     size 512 64 512
//! }
//! camera 0 20 -40; fov 60
//! ```

mod node;
mod parser;

pub use node::ScriptNode;
pub use parser::parse_script;
