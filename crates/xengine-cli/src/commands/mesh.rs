//! Mesh conversion and inspection commands

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use xengine_mesh::{import_gltf, MeshData};

#[derive(Subcommand)]
pub enum MeshCommands {
    /// Convert a glTF/GLB model to the engine mesh format
    Convert {
        /// Input .gltf or .glb file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Write submeshes as imported, without merging or welding
        #[arg(long)]
        no_optimize: bool,
    },

    /// Print the submeshes of a mesh file
    Info {
        file: PathBuf,
    },
}

pub fn run(cmd: MeshCommands) -> Result<()> {
    match cmd {
        MeshCommands::Convert {
            input,
            output,
            no_optimize,
        } => convert(&input, &output, !no_optimize),
        MeshCommands::Info { file } => info(&file),
    }
}

fn convert(input: &Path, output: &Path, optimize: bool) -> Result<()> {
    let mut data = import_gltf(input).with_context(|| format!("Failed to import {}", input.display()))?;
    let imported = (data.submeshes.len(), data.vertex_count());
    if optimize {
        data.optimize();
    }

    let bytes = data.to_bytes()?;
    std::fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Converted {} -> {} ({} bytes)",
        input.display(),
        output.display(),
        bytes.len()
    );
    println!(
        "  submeshes: {} -> {}, vertices: {} -> {}, triangles: {}",
        imported.0,
        data.submeshes.len(),
        imported.1,
        data.vertex_count(),
        data.triangle_count()
    );
    Ok(())
}

fn read_mesh(file: &Path) -> Result<MeshData> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    MeshData::from_bytes(&bytes).with_context(|| format!("{} is not a valid mesh file", file.display()))
}

fn info(file: &Path) -> Result<()> {
    let data = read_mesh(file)?;
    let bounds = data.bounds();
    println!("{}", file.display());
    println!(
        "  {} submeshes, {} vertices, {} triangles",
        data.submeshes.len(),
        data.vertex_count(),
        data.triangle_count()
    );
    println!(
        "  bounds: ({:.3}, {:.3}, {:.3}) .. ({:.3}, {:.3}, {:.3})",
        bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
    );
    for (i, submesh) in data.submeshes.iter().enumerate() {
        let texture = if submesh.texture.is_empty() {
            "-"
        } else {
            submesh.texture.as_str()
        };
        println!(
            "  [{}] {:<20} texture: {:<24} vertices: {:>6} triangles: {:>6}",
            i,
            submesh.name,
            texture,
            submesh.vertices.len(),
            submesh.triangle_count()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xengine_gpu::LitVertex;
    use xengine_mesh::SubmeshData;

    #[test]
    fn test_read_mesh_rejects_garbage() {
        let dir = std::env::temp_dir().join(format!("xengine_cli_mesh_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let garbage = dir.join("garbage.xmesh");
        std::fs::write(&garbage, [1u8, 0, 0]).unwrap();
        assert!(read_mesh(&garbage).is_err());
        assert!(read_mesh(&dir.join("absent.xmesh")).is_err());

        let mut submesh = SubmeshData {
            name: "plate".into(),
            vertices: vec![
                LitVertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
                LitVertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
                LitVertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]),
            ],
            indices: vec![0, 1, 2],
            ..SubmeshData::default()
        };
        submesh.bounds = submesh.compute_bounds();
        let good = dir.join("plate.xmesh");
        let data = MeshData {
            submeshes: vec![submesh],
        };
        std::fs::write(&good, data.to_bytes().unwrap()).unwrap();
        assert_eq!(read_mesh(&good).unwrap(), data);
        info(&good).unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }
}
