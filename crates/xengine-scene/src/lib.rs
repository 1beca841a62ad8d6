//! X-engine Scene - Node hierarchy, render groups and camera
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Each node
//! carries a payload `P` (the game uses a closed enum of drawables). A
//! [`Scene`] draws its nodes group by group, in render-group name order, so
//! that nodes sharing GPU state are drawn back to back.

mod camera;
mod node;
mod scene;

pub use camera::Camera;
pub use node::{Node, NodeArena, NodeId};
pub use scene::{NodeView, RenderNode, RenderStats, Scene};
