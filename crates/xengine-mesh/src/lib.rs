//! X-engine Mesh - Binary mesh format, mesh resource and models
//!
//! Meshes are stored in a little-endian binary format of textured
//! submeshes (see [`MeshData`]). The offline converter imports glTF/GLB,
//! optimizes the result and writes that format; the game loads it as a
//! cached [`Mesh`] and draws it through [`Model`]s. A [`SkyBox`] draws the
//! five sky faces around the camera.

mod format;
mod gltf_import;
mod mesh;
mod model;
mod optimize;
mod skybox;

pub use format::{MeshData, SubmeshData};
pub use gltf_import::import_gltf;
pub use mesh::{Mesh, Submesh};
pub use model::Model;
pub use skybox::{SkyBox, SKY_FACES};
