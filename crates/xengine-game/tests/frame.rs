//! Map loading, simulation and rendering through the game context

use std::path::{Path, PathBuf};
use xengine_core::{EngineError, GameTime, ManualClock, Vec3};
use xengine_mesh::SKY_FACES;
use xengine_game::{EngineConfig, GameContext, ImpactTarget};
use xengine_gpu::{LitVertex, RecordingBackend};
use xengine_mesh::{MeshData, SubmeshData};

const FLAT_MAP: &str = r#"
terrain { resolution 64; size 64 10 64; skirt 2 }
trees { density 0.01; size 2 4; seed 3 }
clutter {
    capacity 256
    type { density 0.02; size 0.5 1 }
}
camera { position 32 20 90; look 0 -0.3 -1 }
fog 60 200
bullets "shell.bullet"
"#;

struct Fixture {
    dir: PathBuf,
    gpu: RecordingBackend,
    clock: ManualClock,
}

impl Fixture {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("xengine_game_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        write_mesh(&dir.join("shell.xmesh"), 0.2);
        write_mesh(&dir.join("crate.xmesh"), 1.0);
        std::fs::write(
            dir.join("shell.bullet"),
            "mesh shell.xmesh\nlife 2\ngravity -10\ndamage 25\ncollision_radius 0.5\n",
        )
        .unwrap();
        std::fs::write(dir.join("puff.fx"), "emission { count 4; life 0.2 0.2 }\n").unwrap();
        std::fs::write(dir.join("flat.map"), FLAT_MAP).unwrap();
        Self {
            dir,
            gpu: RecordingBackend::new(),
            clock: ManualClock::new(0.0),
        }
    }

    fn context(&self, configure: impl FnOnce(&mut EngineConfig)) -> GameContext {
        let mut config = EngineConfig {
            asset_root: self.dir.clone(),
            ..EngineConfig::default()
        };
        configure(&mut config);
        GameContext::with_clock(config, self.clock.clone())
    }

    fn write_map(&self, name: &str, text: &str) {
        std::fs::write(self.dir.join(name), text).unwrap();
    }

    fn write_texture(&self, name: &str) {
        let path = self.dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbaImage::new(2, 2).save(path).unwrap();
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// A single quad of half-width `half`
fn write_mesh(path: &Path, half: f32) {
    let mut submesh = SubmeshData {
        name: "body".into(),
        vertices: vec![
            LitVertex::new([-half, 0.0, -half], [0.0, 1.0, 0.0], [0.0, 0.0]),
            LitVertex::new([half, 0.0, -half], [0.0, 1.0, 0.0], [1.0, 0.0]),
            LitVertex::new([half, half, half], [0.0, 1.0, 0.0], [1.0, 1.0]),
            LitVertex::new([-half, half, half], [0.0, 1.0, 0.0], [0.0, 1.0]),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
        ..SubmeshData::default()
    };
    submesh.bounds = submesh.compute_bounds();
    let bytes = MeshData {
        submeshes: vec![submesh],
    }
    .to_bytes()
    .unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn frame(total: f32) -> GameTime {
    GameTime { total, delta: 1.0 / 60.0 }
}

#[test]
fn flat_map_loads_and_renders() {
    let mut fx = Fixture::new();
    let mut ctx = fx.context(|_| {});
    ctx.load_content("flat.map", &mut fx.gpu).unwrap();

    assert!(ctx.is_map_loaded());
    assert_eq!(ctx.scene().nodes().len(), 3);
    assert_eq!(ctx.terrain().unwrap().terrain_res(), 64);
    assert_eq!(ctx.scene().fog().unwrap().end, 200.0);
    assert!(ctx.particle_pool().is_retained());

    let stats = ctx.render_frame(frame(0.0), &mut fx.gpu);
    assert_eq!(stats.scene.groups, 3);
    assert!(stats.scene.draw_calls > 0);
    assert_eq!(stats.bullet_draws, 0);
    assert_eq!(fx.gpu.pending_errors(), 0);

    ctx.shutdown(&mut fx.gpu);
    assert_eq!(fx.gpu.live_buffer_count(), 0);
}

#[test]
fn bad_resolution_aborts_the_load() {
    let mut fx = Fixture::new();
    fx.write_map("bad.map", "terrain { resolution 65 }\n");
    let mut ctx = fx.context(|_| {});

    let err = ctx.load_content("bad.map", &mut fx.gpu).unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)), "{:?}", err);
    assert!(!ctx.is_map_loaded());
    assert!(ctx.scene().nodes().is_empty());
    assert!(!ctx.particle_pool().is_retained());
}

#[test]
fn missing_model_unloads_what_was_built() {
    let mut fx = Fixture::new();
    fx.write_map(
        "broken.map",
        "terrain { resolution 64 }\ntrees { density 0.01 }\nmodel \"missing.xmesh\"\n",
    );
    let mut ctx = fx.context(|_| {});

    let err = ctx.load_content("broken.map", &mut fx.gpu).unwrap_err();
    assert!(matches!(err, EngineError::AssetLoad { .. }), "{:?}", err);
    assert!(ctx.scene().nodes().is_empty());
    assert_eq!(fx.gpu.live_buffer_count(), 0);

    let err = ctx.load_content("nowhere.map", &mut fx.gpu).unwrap_err();
    assert!(matches!(err, EngineError::AssetLoad { .. }), "{:?}", err);
}

#[test]
fn saturated_bullet_pool_drops_shots() {
    let mut fx = Fixture::new();
    let mut ctx = fx.context(|c| c.bullet_capacity = 5);
    ctx.load_content("flat.map", &mut fx.gpu).unwrap();

    let fired: Vec<bool> = (0..6)
        .map(|_| ctx.fire_bullet(Vec3::new(32.0, 1.0, 32.0), Vec3::new(0.0, -20.0, 0.0), None))
        .collect();
    assert_eq!(fired, [true, true, true, true, true, false]);
    let bullets = ctx.bullets().unwrap();
    assert_eq!(bullets.active_count(), 5);
    assert_eq!(bullets.dropped_count(), 1);

    let impacts = ctx.frame_update(0.1);
    assert_eq!(impacts.len(), 5);
    assert!(impacts.iter().all(|i| i.target == ImpactTarget::Terrain));
    assert_eq!(ctx.bullets().unwrap().active_count(), 0);
    ctx.shutdown(&mut fx.gpu);
}

#[test]
fn bullets_report_hits_and_render() {
    let mut fx = Fixture::new();
    let mut ctx = fx.context(|_| {});
    ctx.load_content("flat.map", &mut fx.gpu).unwrap();

    // flying level, in front of the camera
    assert!(ctx.fire_bullet(Vec3::new(32.0, 8.0, 60.0), Vec3::new(0.0, 5.0, -10.0), None));
    ctx.frame_update(1.0 / 60.0);
    let stats = ctx.render_frame(frame(0.0), &mut fx.gpu);
    assert_eq!(stats.bullet_draws, 1);

    let target = ctx.terrain_node().unwrap();
    let impacts = ctx.frame_update_with(1.0 / 60.0, |_| Some(target));
    assert_eq!(impacts.len(), 1);
    assert_eq!(impacts[0].target, ImpactTarget::Node(target));
    assert_eq!(impacts[0].damage, 25.0);
    ctx.shutdown(&mut fx.gpu);
}

#[test]
fn particle_systems_expire_and_are_capped() {
    let mut fx = Fixture::new();
    let mut ctx = fx.context(|c| c.max_particle_effects = 2);
    ctx.load_content("flat.map", &mut fx.gpu).unwrap();

    let first = ctx.spawn_particles("puff.fx", Vec3::new(32.0, 1.0, 40.0), &mut fx.gpu).unwrap();
    assert!(first.is_some());
    assert!(ctx.spawn_particles("puff.fx", Vec3::new(30.0, 1.0, 40.0), &mut fx.gpu).unwrap().is_some());
    assert!(ctx.spawn_particles("puff.fx", Vec3::new(28.0, 1.0, 40.0), &mut fx.gpu).unwrap().is_none());
    assert_eq!(ctx.dropped_effect_count(), 1);
    assert_eq!(ctx.particle_system_count(), 2);
    assert_eq!(ctx.common_cache().refcount("particle_effect", "puff.fx"), Some(2));

    let stats = ctx.render_frame(frame(0.0), &mut fx.gpu);
    assert!(stats.scene.groups >= 4);

    ctx.frame_update(0.25);
    assert_eq!(ctx.particle_system_count(), 0);
    assert_eq!(ctx.common_cache().refcount("particle_effect", "puff.fx"), Some(0));
    // the retained pool keeps the geometry for the next effect
    let pool = ctx.particle_pool().stats();
    assert_eq!((pool.created, pool.free, pool.outstanding), (2, 2, 0));

    ctx.unload_content(&mut fx.gpu);
    assert_eq!(ctx.particle_pool().stats().free, 0);
    assert_eq!(ctx.particle_pool().stats().destroyed, 2);
}

#[test]
fn unreferenced_resources_are_swept() {
    let mut fx = Fixture::new();
    fx.write_map("depot.map", "terrain { resolution 64 }\nmodel \"crate.xmesh\" { position 10 0 10; yaw 45 }\n");
    let mut ctx = fx.context(|c| c.sweep_interval_secs = 1.0);

    ctx.load_content("depot.map", &mut fx.gpu).unwrap();
    assert_eq!(ctx.map_cache().refcount("mesh", "crate.xmesh"), Some(1));

    // the next map flushes the previous map's resources
    ctx.load_content("flat.map", &mut fx.gpu).unwrap();
    assert!(!ctx.map_cache().contains("mesh", "crate.xmesh"));

    ctx.spawn_particles("puff.fx", Vec3::new(32.0, 1.0, 40.0), &mut fx.gpu).unwrap();
    ctx.frame_update(0.25);
    assert!(ctx.common_cache().contains("particle_effect", "puff.fx"));

    // too young for the periodic sweep
    fx.clock.advance(10.0);
    assert_eq!(ctx.render_frame(frame(2.0), &mut fx.gpu).swept, 0);

    fx.clock.advance(25.0);
    let stats = ctx.render_frame(frame(4.0), &mut fx.gpu);
    assert_eq!(stats.swept, 1);
    assert!(!ctx.common_cache().contains("particle_effect", "puff.fx"));
    ctx.shutdown(&mut fx.gpu);
}

#[test]
fn low_memory_frees_everything_unreferenced() {
    let mut fx = Fixture::new();
    let mut ctx = fx.context(|_| {});
    ctx.load_content("flat.map", &mut fx.gpu).unwrap();

    ctx.spawn_particles("puff.fx", Vec3::new(32.0, 1.0, 40.0), &mut fx.gpu).unwrap();
    ctx.frame_update(0.25);
    assert_eq!(ctx.particle_pool().stats().free, 1);

    assert_eq!(ctx.on_low_memory(&mut fx.gpu), 1);
    assert!(!ctx.common_cache().contains("particle_effect", "puff.fx"));
    assert_eq!(ctx.particle_pool().stats().free, 0);
    // still referenced by the loaded map
    assert!(ctx.common_cache().contains("bullet_type", "shell.bullet"));
    ctx.shutdown(&mut fx.gpu);
}

#[test]
fn sensor_samples_reach_the_frame() {
    let fx = Fixture::new();
    let mut ctx = fx.context(|_| {});
    let mailbox = ctx.sensor();
    std::thread::spawn(move || mailbox.post(Vec3::new(0.0, -1.0, 0.2)))
        .join()
        .unwrap();

    assert_eq!(ctx.acceleration(), Vec3::ZERO);
    ctx.frame_update(0.016);
    assert_eq!(ctx.acceleration(), Vec3::new(0.0, -1.0, 0.2));
}

#[test]
fn failed_load_releases_textures_already_acquired() {
    let mut fx = Fixture::new();
    fx.write_texture("pine.png");
    fx.write_texture("atlas.png");
    for face in SKY_FACES.iter().filter(|&&f| f != "left") {
        fx.write_texture(&format!("sky/day_{}.png", face));
    }
    fx.write_map(
        "cloudy.map",
        r#"
terrain { resolution 64 }
trees { texture "pine.png"; density 0.01 }
clutter { texture "atlas.png"; type { density 0.02 } }
skybox { folder "sky"; prefix "day_" }
"#,
    );
    let mut ctx = fx.context(|_| {});

    let err = ctx.load_content("cloudy.map", &mut fx.gpu).unwrap_err();
    assert!(matches!(err, EngineError::AssetLoad { .. }), "{:?}", err);
    assert!(ctx.scene().nodes().is_empty());
    assert!(ctx.sky().is_none());
    assert_eq!(fx.gpu.live_buffer_count(), 0);
    for file in ["pine.png", "atlas.png", "sky/day_top.png", "sky/day_right.png"] {
        assert_eq!(ctx.map_cache().refcount("texture", file), Some(0), "{}", file);
    }

    assert_eq!(ctx.on_low_memory(&mut fx.gpu), 6);
    assert!(ctx.map_cache().is_empty());
    assert_eq!(fx.gpu.live_texture_count(), 0);
}

#[test]
fn too_many_clutter_types_acquire_nothing() {
    let mut fx = Fixture::new();
    fx.write_texture("atlas.png");
    fx.write_map(
        "meadow.map",
        "terrain { resolution 64 }\nclutter {\n texture \"atlas.png\"\n type\n type\n type\n type\n type\n}\n",
    );
    let mut ctx = fx.context(|_| {});

    let err = ctx.load_content("meadow.map", &mut fx.gpu).unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)), "{:?}", err);
    assert!(!ctx.map_cache().contains("texture", "atlas.png"));
    assert_eq!(fx.gpu.live_texture_count(), 0);
}

#[test]
fn sky_is_drawn_before_the_scene() {
    let mut fx = Fixture::new();
    for face in SKY_FACES {
        fx.write_texture(&format!("sky/{}.png", face));
    }
    fx.write_map("sky.map", &format!("{}skybox {{ folder sky }}\n", FLAT_MAP));
    let mut ctx = fx.context(|_| {});
    ctx.load_content("sky.map", &mut fx.gpu).unwrap();
    assert_eq!(ctx.map_cache().refcount("texture", "sky/top.png"), Some(1));

    fx.gpu.take_draws();
    let stats = ctx.render_frame(frame(0.0), &mut fx.gpu);
    assert_eq!(stats.sky_draws, 5);
    let draws = fx.gpu.take_draws();
    assert!(draws.len() > 5);
    assert!(draws[..5].iter().all(|d| !d.depth_write && d.fog.is_none()));
    assert!(draws[5..].iter().any(|d| d.depth_write));

    ctx.unload_content(&mut fx.gpu);
    assert_eq!(ctx.map_cache().refcount("texture", "sky/top.png"), Some(0));
    ctx.shutdown(&mut fx.gpu);
    assert_eq!(fx.gpu.live_buffer_count(), 0);
}

#[test]
fn non_finite_sweep_settings() {
    for text in ["sweep_timeout_secs = inf", "sweep_interval_secs = nan"] {
        let err = EngineConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)), "{}: {:?}", text, err);
    }

    // a config built in code skips validation; an endless timeout never sweeps
    let mut fx = Fixture::new();
    let mut ctx = fx.context(|c| {
        c.sweep_timeout_secs = f32::INFINITY;
        c.sweep_interval_secs = 1.0;
    });
    ctx.load_content("flat.map", &mut fx.gpu).unwrap();
    ctx.spawn_particles("puff.fx", Vec3::new(32.0, 1.0, 40.0), &mut fx.gpu).unwrap();
    ctx.frame_update(0.25);
    fx.clock.advance(1000.0);
    assert_eq!(ctx.render_frame(frame(5.0), &mut fx.gpu).swept, 0);
    assert!(ctx.common_cache().contains("particle_effect", "puff.fx"));
    ctx.shutdown(&mut fx.gpu);
}

#[test]
fn clutter_density_is_bounded() {
    let mut fx = Fixture::new();
    fx.write_map("dense.map", "terrain { resolution 64 }\nclutter { type { density 1e30 } }\n");
    let mut ctx = fx.context(|_| {});
    let err = ctx.load_content("dense.map", &mut fx.gpu).unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)), "{:?}", err);

    fx.write_map(
        "lush.map",
        "terrain { resolution 64 }\nclutter {\n capacity 256\n type { density 100 }\n type { density 100 }\n}\n",
    );
    ctx.load_content("lush.map", &mut fx.gpu).unwrap();
    let clutter = ctx.clutter().unwrap();
    assert!(!clutter.instances().is_empty());
    assert!(clutter.instances().len() + clutter.rejected_count() <= 256);
    ctx.shutdown(&mut fx.gpu);
}
