//! X-engine Terrain - Chunked heightfield terrain with LOD
//!
//! A square heightfield is split into `CHUNK_GRID_SIZE x CHUNK_GRID_SIZE`
//! chunks. Each chunk owns a vertex buffer with a one-ring skirt; the index
//! buffers (one per LOD level) are shared by every chunk and picked per
//! chunk at render time from the camera distance.

pub mod chunk;
pub mod heightmap;
pub mod terrain;

pub use chunk::{ChunkLayout, TerrainChunk};
pub use heightmap::Heightfield;
pub use terrain::{chunk_tile_res_for, Terrain, TerrainConfig, TerrainIntersection};

/// Chunks per terrain side. Must be a power of two.
pub const CHUNK_GRID_SIZE: u32 = 8;

/// Upper bound on LOD index buffers per terrain
pub const MAX_LOD_LEVELS: u32 = 16;

/// Detail map repeats across one chunk. Must be a power of two.
pub const DETAIL_REPEATS_PER_CHUNK: u32 = 8;

/// Largest chunk whose grid plus skirt vertices are addressable by u16
pub const MAX_CHUNK_TILE_RES: u32 = 128;
