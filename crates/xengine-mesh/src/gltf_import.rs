//! glTF/GLB import for the mesh converter

use crate::format::{MeshData, SubmeshData};
use std::path::Path;
use xengine_core::{EngineError, Result};
use xengine_gpu::{Index, LitVertex};

const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];

/// Import every triangle primitive of a glTF or GLB file as one submesh.
///
/// The submesh texture is the file name of the base color image when the
/// material references an external image, otherwise empty.
pub fn import_gltf<P: AsRef<Path>>(path: P) -> Result<MeshData> {
    let path = path.as_ref();
    let (document, buffers, _images) = gltf::import(path).map_err(|e| EngineError::AssetLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut submeshes = Vec::new();
    for mesh in document.meshes() {
        let mesh_name = mesh
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("mesh_{}", mesh.index()));

        for (prim_index, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "{}: skipping non-triangle primitive {} of '{}'",
                    path.display(),
                    prim_index,
                    mesh_name
                );
                continue;
            }
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .map(|iter| iter.collect())
                .unwrap_or_default();
            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map(|iter| iter.collect())
                .unwrap_or_default();
            let uvs: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|iter| iter.into_f32().collect())
                .unwrap_or_default();
            let indices: Vec<u32> = reader
                .read_indices()
                .map(|iter| iter.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());

            if positions.len() > Index::MAX as usize + 1 {
                return Err(EngineError::Format(format!(
                    "'{}' has {} vertices; at most {} fit 16-bit indices",
                    mesh_name,
                    positions.len(),
                    Index::MAX as usize + 1
                )));
            }

            let vertices = positions
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    LitVertex::new(
                        *p,
                        normals.get(i).copied().unwrap_or(DEFAULT_NORMAL),
                        uvs.get(i).copied().unwrap_or([0.0, 0.0]),
                    )
                })
                .collect();
            let indices = indices
                .into_iter()
                .map(|i| {
                    Index::try_from(i)
                        .ok()
                        .filter(|&i| (i as usize) < positions.len())
                        .ok_or_else(|| {
                            EngineError::Format(format!("'{}': index {} out of range", mesh_name, i))
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            let name = if mesh.primitives().len() > 1 {
                format!("{}_{}", mesh_name, prim_index)
            } else {
                mesh_name.clone()
            };
            let mut submesh = SubmeshData {
                name,
                texture: base_color_texture(&primitive.material()),
                vertices,
                indices,
                ..Default::default()
            };
            submesh.bounds = submesh.compute_bounds();
            submeshes.push(submesh);
        }
    }

    log::info!("imported {} submeshes from {}", submeshes.len(), path.display());
    Ok(MeshData { submeshes })
}

fn base_color_texture(material: &gltf::Material<'_>) -> String {
    let Some(info) = material.pbr_metallic_roughness().base_color_texture() else {
        return String::new();
    };
    match info.texture().source().source() {
        gltf::image::Source::Uri { uri, .. } => Path::new(uri)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(uri)
            .to_string(),
        gltf::image::Source::View { .. } => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// A single-triangle glTF with an embedded base64 buffer
    fn write_triangle_gltf(dir: &Path) -> std::path::PathBuf {
        let mut bin = Vec::new();
        for f in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0] {
            bin.extend_from_slice(&f.to_le_bytes());
        }
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        bin.extend_from_slice(&[0, 0]);
        let uri = format!("data:application/octet-stream;base64,{}", base64(&bin));

        let json = format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "buffers": [{{"byteLength": {len}, "uri": "{uri}"}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0, 0, 0], "max": [1, 0, 1]}},
    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ],
  "meshes": [{{"name": "tri", "primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1}}]}}]
}}"#,
            len = bin.len(),
            uri = uri
        );
        let file = dir.join("tri.gltf");
        fs::write(&file, json).unwrap();
        file
    }

    fn base64(bytes: &[u8]) -> String {
        const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut out = String::new();
        for chunk in bytes.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
            for i in 0..4 {
                if i <= chunk.len() {
                    out.push(TABLE[((n >> (18 - 6 * i)) & 63) as usize] as char);
                } else {
                    out.push('=');
                }
            }
        }
        out
    }

    #[test]
    fn test_import_triangle() {
        let dir = std::env::temp_dir().join(format!("xengine_gltf_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let file = write_triangle_gltf(&dir);

        let data = import_gltf(&file).unwrap();
        assert_eq!(data.submeshes.len(), 1);
        let tri = &data.submeshes[0];
        assert_eq!(tri.name, "tri");
        assert_eq!(tri.texture, "");
        assert_eq!(tri.vertices.len(), 3);
        assert_eq!(tri.indices, vec![0, 1, 2]);
        assert_eq!(tri.vertices[1].normal, DEFAULT_NORMAL);
        assert_eq!(tri.bounds.max.x, 1.0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_asset_error() {
        let err = import_gltf("/nonexistent/tank.glb").unwrap_err();
        assert!(matches!(err, EngineError::AssetLoad { .. }));
    }
}
