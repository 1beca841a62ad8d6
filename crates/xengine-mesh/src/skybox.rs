//! Sky box: five textured faces of a cube that follows the camera

use xengine_asset::{Handle, ResourceCache, Texture};
use xengine_core::{Mat3, Result, Vec3};
use xengine_gpu::{
    create_index_buffer, create_vertex_buffer, BufferId, DrawCall, GpuBackend, Index, LitVertex, VertexLayout,
};
use xengine_scene::Camera;

/// Face order used by every sky box API. There is no bottom face; the
/// terrain covers it.
pub const SKY_FACES: [&str; 5] = ["top", "front", "back", "right", "left"];

/// Half-extent of the cube as a fraction of the far clip distance. Keeps
/// the corners (at `sqrt(3)` half-extents) inside the far plane.
const FAR_FRACTION: f32 = 0.57;

/// (outward direction, right, up) of each face as seen from the inside
const FACE_AXES: [(Vec3, Vec3, Vec3); 5] = [
    (Vec3::UNIT_Y, Vec3::UNIT_X, Vec3::UNIT_Z),
    (Vec3::NEG_UNIT_Z, Vec3::UNIT_X, Vec3::UNIT_Y),
    (Vec3::UNIT_Z, Vec3::NEG_UNIT_X, Vec3::UNIT_Y),
    (Vec3::UNIT_X, Vec3::UNIT_Z, Vec3::UNIT_Y),
    (Vec3::NEG_UNIT_X, Vec3::NEG_UNIT_Z, Vec3::UNIT_Y),
];

fn unit_cube_faces() -> (Vec<LitVertex>, Vec<Index>) {
    let mut vertices = Vec::with_capacity(SKY_FACES.len() * 4);
    let mut indices = Vec::with_capacity(SKY_FACES.len() * 6);
    for (face, &(out, right, up)) in FACE_AXES.iter().enumerate() {
        let normal = (out * -1.0).to_array();
        // top-left, bottom-left, bottom-right, top-right
        let corners = [
            (-1.0, 1.0, [0.0, 0.0]),
            (-1.0, -1.0, [0.0, 1.0]),
            (1.0, -1.0, [1.0, 1.0]),
            (1.0, 1.0, [1.0, 0.0]),
        ];
        for (r, u, texcoord) in corners {
            let position = out + right * r + up * u;
            vertices.push(LitVertex::new(position.to_array(), normal, texcoord));
        }
        let base = (face * 4) as Index;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

pub struct SkyBox {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    faces: Vec<Handle<Texture>>,
}

impl SkyBox {
    /// Build from one texture per face, in [`SKY_FACES`] order. If any face
    /// fails to load, the faces already acquired are released again.
    pub fn new(files: &[String; 5], cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) -> Result<Self> {
        let mut faces = Vec::with_capacity(files.len());
        for file in files {
            match cache.acquire::<Texture>(file, gpu) {
                Ok(texture) => faces.push(texture),
                Err(err) => {
                    for texture in faces {
                        cache.release(texture);
                    }
                    return Err(err);
                }
            }
        }

        let (vertices, indices) = unit_cube_faces();
        Ok(Self {
            vertex_buffer: create_vertex_buffer(gpu, &vertices),
            index_buffer: create_index_buffer(gpu, &indices),
            faces,
        })
    }

    /// `folder/<prefix><face>.<extension>` for every face
    pub fn face_files(folder: &str, prefix: &str, extension: &str) -> [String; 5] {
        let extension = extension.trim_start_matches('.');
        SKY_FACES.map(|face| {
            let name = format!("{}{}.{}", prefix, face, extension);
            let folder = folder.trim_end_matches('/');
            if folder.is_empty() {
                name
            } else {
                format!("{}/{}", folder, name)
            }
        })
    }

    pub fn from_folder(
        folder: &str,
        prefix: &str,
        extension: &str,
        cache: &mut ResourceCache,
        gpu: &mut dyn GpuBackend,
    ) -> Result<Self> {
        Self::new(&Self::face_files(folder, prefix, extension), cache, gpu)
    }

    pub fn face_texture(&self, face: usize) -> Option<&Texture> {
        self.faces.get(face).map(|t| &**t)
    }

    /// Draw every face centred on the camera, without depth writes, so the
    /// rest of the frame draws over it. Call before the scene.
    pub fn render(&self, camera: &Camera, gpu: &mut dyn GpuBackend) -> usize {
        let half_extent = camera.far * FAR_FRACTION;
        let model = Mat3::from_scale(Vec3::new(half_extent, half_extent, half_extent)).to_mat4(camera.origin);
        let mvp = camera.view_projection() * model;

        for (face, texture) in self.faces.iter().enumerate() {
            let mut call = DrawCall::new(self.vertex_buffer, self.index_buffer, 6, VertexLayout::Lit);
            call.first_index = (face * 6) as u32;
            call.texture = Some(texture.id());
            call.mvp = mvp;
            call.model = model;
            call.depth_write = false;
            call.lit = false;
            gpu.draw(&call);
        }
        self.faces.len()
    }

    pub fn release(self, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
        for texture in self.faces {
            cache.release(texture);
        }
        gpu.destroy_buffer(self.vertex_buffer);
        gpu.destroy_buffer(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use xengine_gpu::RecordingBackend;

    fn sky_dir(missing: Option<&str>) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("xengine_sky_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(dir.join("sky")).unwrap();
        for face in SKY_FACES {
            if Some(face) != missing {
                image::RgbaImage::new(2, 2).save(dir.join(format!("sky/day_{}.png", face))).unwrap();
            }
        }
        dir
    }

    #[test]
    fn test_face_files() {
        let files = SkyBox::face_files("sky/", "day_", ".png");
        assert_eq!(files[0], "sky/day_top.png");
        assert_eq!(files[4], "sky/day_left.png");
        assert_eq!(SkyBox::face_files("", "", "jpg")[1], "front.jpg");
    }

    #[test]
    fn test_cube_faces_point_inward() {
        let (vertices, indices) = unit_cube_faces();
        assert_eq!(vertices.len(), 20);
        assert_eq!(indices.len(), 30);
        for (face, &(out, _, _)) in FACE_AXES.iter().enumerate() {
            let v = &vertices[face * 4];
            assert_eq!(Vec3::from_array(v.normal), out * -1.0);
            assert!(vertices[face * 4..face * 4 + 4]
                .iter()
                .all(|v| Vec3::from_array(v.position).dot(&out) == 1.0));
        }
    }

    #[test]
    fn test_render_follows_camera() {
        let dir = sky_dir(None);
        let mut gpu = RecordingBackend::new();
        let mut cache = ResourceCache::new(&dir);
        let sky = SkyBox::from_folder("sky", "day_", "png", &mut cache, &mut gpu).unwrap();
        assert_eq!(sky.face_texture(0).map(|t| t.width()), Some(2));

        let mut camera = Camera::new();
        camera.origin = Vec3::new(5.0, 2.0, -3.0);
        camera.far = 100.0;
        camera.update();
        assert_eq!(sky.render(&camera, &mut gpu), 5);

        let draws = gpu.take_draws();
        assert_eq!(draws.len(), 5);
        assert!(draws.iter().all(|d| !d.depth_write && !d.lit && d.fog.is_none()));
        assert_eq!(draws[3].first_index, 18);
        let translation = draws[0].model.to_cols_array()[3];
        assert_eq!(translation, [5.0, 2.0, -3.0, 1.0]);

        // every corner stays in front of the far plane
        let corner = draws[0].mvp.transform_point4(Vec3::new(1.0, 1.0, -1.0));
        assert!(corner.z / corner.w < 1.0);

        sky.release(&mut cache, &mut gpu);
        assert_eq!(cache.sweep_now(&mut gpu), 5);
        assert_eq!(gpu.live_buffer_count(), 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_face_releases_loaded_faces() {
        let dir = sky_dir(Some("right"));
        let mut gpu = RecordingBackend::new();
        let mut cache = ResourceCache::new(&dir);
        assert!(SkyBox::from_folder("sky", "day_", "png", &mut cache, &mut gpu).is_err());

        assert_eq!(cache.refcount("texture", "sky/day_top.png"), Some(0));
        assert_eq!(cache.refcount("texture", "sky/day_back.png"), Some(0));
        assert_eq!(cache.sweep_now(&mut gpu), 3);
        assert_eq!(gpu.live_buffer_count(), 0);
        let _ = fs::remove_dir_all(&dir);
    }
}
