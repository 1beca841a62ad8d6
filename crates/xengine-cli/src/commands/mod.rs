//! CLI command implementations

pub mod frame;
pub mod mesh;
pub mod script;
pub mod terrain;
