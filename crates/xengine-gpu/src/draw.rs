//! Draw call description

use crate::backend::{BufferId, TextureId};
use crate::vertex::VertexLayout;
use xengine_core::{Color, Mat4};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    None,
    Additive,
    Modulative,
    Alpha,
}

/// Fixed-function style lighting material
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub diffuse: Color,
    pub ambient: Color,
    pub specular: Color,
    pub shininess: f32,
}

impl Default for Material {
    /// The classic GL lighting defaults
    fn default() -> Self {
        Self {
            diffuse: Color::new(0.8, 0.8, 0.8, 1.0),
            ambient: Color::new(0.2, 0.2, 0.2, 1.0),
            specular: Color::BLACK,
            shininess: 0.0,
        }
    }
}

/// Linear fog between `start` and `end` view distance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FogRange {
    pub start: f32,
    pub end: f32,
    pub color: Color,
}

/// One indexed draw
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub first_index: u32,
    pub index_count: u32,
    pub layout: VertexLayout,
    pub texture: Option<TextureId>,
    /// Second texture stage (terrain detail map)
    pub detail_texture: Option<TextureId>,
    /// Texcoord multiplier for the detail stage
    pub detail_repeat: f32,
    pub mvp: Mat4,
    pub model: Mat4,
    pub tint: Color,
    pub blend: BlendMode,
    pub depth_write: bool,
    pub lit: bool,
    pub material: Material,
    pub fog: Option<FogRange>,
}

impl DrawCall {
    /// An opaque draw of `index_count` indices with default state
    pub fn new(
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        index_count: u32,
        layout: VertexLayout,
    ) -> Self {
        Self {
            vertex_buffer,
            index_buffer,
            first_index: 0,
            index_count,
            layout,
            texture: None,
            detail_texture: None,
            detail_repeat: 1.0,
            mvp: Mat4::IDENTITY,
            model: Mat4::IDENTITY,
            tint: Color::WHITE,
            blend: BlendMode::None,
            depth_write: true,
            lit: layout == VertexLayout::Lit,
            material: Material::default(),
            fog: None,
        }
    }

    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}
