//! Mesh file codec
//!
//! Layout (all little-endian):
//!
//! ```text
//! u32 submesh_count
//! repeat submesh_count:
//!   u32 name_len,    name bytes (UTF-8)
//!   u32 texture_len, texture filename bytes (UTF-8)
//!   u32 vertex_count, vertex_count x (f32 px py pz, nx ny nz, u v)
//!   u32 index_count,  index_count x u16
//!   f32 min x y z, f32 max x y z
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use xengine_core::{BoundingBox, EngineError, Result, Vec3};
use xengine_gpu::{Index, LitVertex};

/// Longest name or texture filename accepted when reading
const MAX_STRING_LEN: u32 = 4096;

/// One textured part of a mesh
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmeshData {
    pub name: String,
    /// Default texture filename (may be empty)
    pub texture: String,
    pub vertices: Vec<LitVertex>,
    pub indices: Vec<Index>,
    pub bounds: BoundingBox,
}

impl SubmeshData {
    /// Bounds of the vertex positions
    pub fn compute_bounds(&self) -> BoundingBox {
        if self.vertices.is_empty() {
            return BoundingBox::default();
        }
        let points: Vec<Vec3> = self
            .vertices
            .iter()
            .map(|v| Vec3::from_array(v.position))
            .collect();
        BoundingBox::from_points(&points)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Decoded contents of a mesh file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub submeshes: Vec<SubmeshData>,
}

impl MeshData {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let data = Self::read(&mut cursor)?;
        if (cursor.position() as usize) != bytes.len() {
            return Err(EngineError::Format(format!(
                "{} trailing bytes after mesh data",
                bytes.len() - cursor.position() as usize
            )));
        }
        Ok(data)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut submeshes = Vec::with_capacity(count.min(256) as usize);
        for index in 0..count {
            let submesh = read_submesh(reader).map_err(|e| match e {
                EngineError::Format(msg) => EngineError::Format(format!("submesh {}: {}", index, msg)),
                other => other,
            })?;
            submeshes.push(submesh);
        }
        Ok(Self { submeshes })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.submeshes.len() as u32)?;
        for submesh in &self.submeshes {
            write_string(writer, &submesh.name)?;
            write_string(writer, &submesh.texture)?;

            writer.write_u32::<LittleEndian>(submesh.vertices.len() as u32)?;
            for v in &submesh.vertices {
                for f in v.position.iter().chain(&v.normal).chain(&v.texcoord) {
                    writer.write_f32::<LittleEndian>(*f)?;
                }
            }

            writer.write_u32::<LittleEndian>(submesh.indices.len() as u32)?;
            for &i in &submesh.indices {
                writer.write_u16::<LittleEndian>(i)?;
            }

            for f in submesh.bounds.min.to_array().iter().chain(&submesh.bounds.max.to_array()) {
                writer.write_f32::<LittleEndian>(*f)?;
            }
        }
        Ok(())
    }

    /// Union of all submesh bounds
    pub fn bounds(&self) -> BoundingBox {
        self.submeshes
            .iter()
            .map(|s| s.bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }

    pub fn vertex_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.triangle_count()).sum()
    }
}

fn truncated(err: io::Error) -> EngineError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        EngineError::Format("unexpected end of data".to_string())
    } else {
        EngineError::Io(err)
    }
}

fn read_string<R: Read>(reader: &mut R, what: &str) -> Result<String> {
    let len = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    if len > MAX_STRING_LEN {
        return Err(EngineError::Format(format!("{} length {} is too long", what, len)));
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes).map_err(truncated)?;
    String::from_utf8(bytes).map_err(|_| EngineError::Format(format!("{} is not valid UTF-8", what)))
}

fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    writer.write_u32::<LittleEndian>(s.len() as u32)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_vec3<R: Read>(reader: &mut R) -> Result<[f32; 3]> {
    let mut out = [0.0; 3];
    reader
        .read_f32_into::<LittleEndian>(&mut out)
        .map_err(truncated)?;
    Ok(out)
}

fn read_submesh<R: Read>(reader: &mut R) -> Result<SubmeshData> {
    let name = read_string(reader, "name")?;
    let texture = read_string(reader, "texture filename")?;

    let vertex_count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    if vertex_count > u32::from(Index::MAX) + 1 {
        return Err(EngineError::Format(format!(
            "{} vertices cannot be addressed by 16-bit indices",
            vertex_count
        )));
    }
    let mut vertices = Vec::with_capacity(vertex_count as usize);
    for _ in 0..vertex_count {
        let mut raw = [0.0f32; 8];
        reader
            .read_f32_into::<LittleEndian>(&mut raw)
            .map_err(truncated)?;
        vertices.push(LitVertex::new(
            [raw[0], raw[1], raw[2]],
            [raw[3], raw[4], raw[5]],
            [raw[6], raw[7]],
        ));
    }

    let index_count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    if index_count % 3 != 0 {
        return Err(EngineError::Format(format!(
            "index count {} is not a multiple of 3",
            index_count
        )));
    }
    let mut indices = Vec::with_capacity(index_count.min(1 << 20) as usize);
    for _ in 0..index_count {
        let index = reader.read_u16::<LittleEndian>().map_err(truncated)?;
        if u32::from(index) >= vertex_count {
            return Err(EngineError::Format(format!(
                "index {} out of range ({} vertices)",
                index, vertex_count
            )));
        }
        indices.push(index);
    }

    let min = read_vec3(reader)?;
    let max = read_vec3(reader)?;

    Ok(SubmeshData {
        name,
        texture,
        vertices,
        indices,
        bounds: BoundingBox::new(Vec3::from_array(min), Vec3::from_array(max)),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A unit quad in the XZ plane
    pub(crate) fn quad(name: &str, texture: &str, offset: f32) -> SubmeshData {
        let v = |x: f32, z: f32, u: f32, w: f32| {
            LitVertex::new([x + offset, 0.0, z], [0.0, 1.0, 0.0], [u, w])
        };
        let mut submesh = SubmeshData {
            name: name.to_string(),
            texture: texture.to_string(),
            vertices: vec![v(0.0, 0.0, 0.0, 0.0), v(1.0, 0.0, 1.0, 0.0), v(1.0, 1.0, 1.0, 1.0), v(0.0, 1.0, 0.0, 1.0)],
            indices: vec![0, 1, 2, 0, 2, 3],
            bounds: BoundingBox::default(),
        };
        submesh.bounds = submesh.compute_bounds();
        submesh
    }

    #[test]
    fn test_byte_layout() {
        let data = MeshData {
            submeshes: vec![quad("hull", "tank.png", 0.0)],
        };
        let bytes = data.to_bytes().unwrap();

        // count + name + texture + vertices + indices + bounds
        let expected = 4 + (4 + 4) + (4 + 8) + (4 + 4 * 32) + (4 + 6 * 2) + 24;
        assert_eq!(bytes.len(), expected);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &4u32.to_le_bytes());
        assert_eq!(&bytes[8..12], b"hull");
        assert_eq!(&bytes[12..16], &8u32.to_le_bytes());
        assert_eq!(&bytes[16..24], b"tank.png");
        assert_eq!(&bytes[24..28], &4u32.to_le_bytes());

        assert_eq!(MeshData::from_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn test_truncated_input_is_format_error() {
        let data = MeshData {
            submeshes: vec![quad("a", "", 0.0), quad("b", "b.png", 2.0)],
        };
        let bytes = data.to_bytes().unwrap();
        for len in [0, 3, 10, bytes.len() / 2, bytes.len() - 1] {
            let err = MeshData::from_bytes(&bytes[..len]).unwrap_err();
            assert!(matches!(err, EngineError::Format(_)), "len {}: {:?}", len, err);
        }
    }

    #[test]
    fn test_bad_index_rejected() {
        let mut submesh = quad("a", "", 0.0);
        submesh.indices[4] = 9;
        let bytes = MeshData { submeshes: vec![submesh] }.to_bytes().unwrap();
        assert!(matches!(MeshData::from_bytes(&bytes), Err(EngineError::Format(_))));
    }

    #[test]
    fn test_oversized_string_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(MeshData::from_bytes(&bytes), Err(EngineError::Format(_))));
    }

    #[test]
    fn test_bounds_union() {
        let data = MeshData {
            submeshes: vec![quad("a", "", 0.0), quad("b", "", 5.0)],
        };
        let bounds = data.bounds();
        assert_eq!(bounds.min, Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(6.0, 0.0, 1.0));
        assert_eq!(data.triangle_count(), 4);
    }
}
