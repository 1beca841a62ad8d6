//! Game context: owns everything a running map needs
//!
//! Resources live in two caches. The common cache holds what outlives a map
//! (particle effects, bullet types); the map cache is flushed whenever a new
//! map is loaded. Unreferenced resources in either cache are swept after
//! `sweep_timeout_secs`, or immediately on low memory.

use crate::bullet::{Bullet, BulletPool, BulletType, Impact};
use crate::clock::GameClock;
use crate::config::EngineConfig;
use crate::drawable::Drawable;
use crate::map::{ClutterDescription, MapDescription, TerrainSource, TreeDescription};
use crate::sensor::SensorMailbox;
use std::time::Duration;
use xengine_asset::ResourceCache;
use xengine_core::{
    BoundingBox, Clock, EngineError, GameTime, IntRect, Mat3, MonotonicClock, Result, Rng, ScalarRect, Vec3,
};
use xengine_gpu::{gpu_check, GpuBackend};
use xengine_mesh::{Model, SkyBox};
use xengine_particles::{ParticleBufferPool, ParticleEffect, ParticleSystem};
use xengine_scene::{Camera, NodeId, RenderStats, Scene};
use xengine_terrain::{Terrain, TerrainConfig};
use xengine_vegetation::{
    populate_trees_procedurally, tree_count_for_density, ClutterSystem, ClutterUpdate, TreeSystem,
    TREE_BATCH_GRID_SIZE,
};

/// What one [`GameContext::render_frame`] did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub sky_draws: usize,
    pub scene: RenderStats,
    pub bullet_draws: usize,
    pub clutter: ClutterUpdate,
    /// Resources freed by the periodic sweep this frame
    pub swept: usize,
}

pub struct GameContext {
    config: EngineConfig,
    common: ResourceCache,
    map_cache: ResourceCache,
    scene: Scene<Drawable>,
    particle_pool: ParticleBufferPool,
    bullets: Option<BulletPool>,
    sky: Option<SkyBox>,
    terrain_node: Option<NodeId>,
    clutter_node: Option<NodeId>,
    particle_nodes: Vec<NodeId>,
    dropped_effects: usize,
    sensor: SensorMailbox,
    acceleration: Vec3,
    clock: GameClock,
    rng: Rng,
    last_sweep: f32,
    map_loaded: bool,
}

impl GameContext {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }

    /// A context whose caches time unreferenced resources with `clock`
    pub fn with_clock<C: Clock + Clone + 'static>(config: EngineConfig, clock: C) -> Self {
        let mut camera = Camera::new();
        config.camera.apply(&mut camera);
        camera.update();

        Self {
            common: ResourceCache::with_clock(&config.asset_root, Box::new(clock.clone())),
            map_cache: ResourceCache::with_clock(&config.asset_root, Box::new(clock)),
            scene: Scene::new(camera),
            particle_pool: ParticleBufferPool::new(),
            bullets: None,
            sky: None,
            terrain_node: None,
            clutter_node: None,
            particle_nodes: Vec::new(),
            dropped_effects: 0,
            sensor: SensorMailbox::new(),
            acceleration: Vec3::ZERO,
            clock: GameClock::new(),
            rng: Rng::new(config.seed),
            last_sweep: 0.0,
            map_loaded: false,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene<Drawable> {
        &self.scene
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        self.scene.camera_mut()
    }

    pub fn common_cache(&self) -> &ResourceCache {
        &self.common
    }

    pub fn map_cache(&self) -> &ResourceCache {
        &self.map_cache
    }

    pub fn particle_pool(&self) -> &ParticleBufferPool {
        &self.particle_pool
    }

    pub fn bullets(&self) -> Option<&BulletPool> {
        self.bullets.as_ref()
    }

    pub fn sky(&self) -> Option<&SkyBox> {
        self.sky.as_ref()
    }

    pub fn is_map_loaded(&self) -> bool {
        self.map_loaded
    }

    pub fn terrain_node(&self) -> Option<NodeId> {
        self.terrain_node
    }

    pub fn terrain(&self) -> Option<&Terrain> {
        self.scene.payload(self.terrain_node?)?.as_terrain()
    }

    pub fn clutter(&self) -> Option<&ClutterSystem> {
        self.scene.payload(self.clutter_node?)?.as_clutter()
    }

    /// Particle systems still animating
    pub fn particle_system_count(&self) -> usize {
        self.particle_nodes.len()
    }

    /// Effects refused because `max_particle_effects` were already running
    pub fn dropped_effect_count(&self) -> usize {
        self.dropped_effects
    }

    /// Mailbox a sensor thread posts acceleration samples to
    pub fn sensor(&self) -> SensorMailbox {
        self.sensor.clone()
    }

    /// Sensor sample read at the start of the last frame update
    pub fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    /// Load a map script. Any loaded map is unloaded first and the map cache
    /// is flushed. A map that fails half-way is unloaded again before the
    /// error is returned.
    pub fn load_content(&mut self, map_file: &str, gpu: &mut dyn GpuBackend) -> Result<()> {
        if self.map_loaded {
            self.unload_content(gpu);
        }
        let flushed = self.map_cache.sweep_now(gpu);
        if flushed > 0 {
            log::debug!("Flushed {} map resources", flushed);
        }

        let description =
            MapDescription::load(&self.config.asset_root.join(map_file)).map_err(|err| match err {
                EngineError::Io(_) => err.into_asset_load(map_file),
                other => other,
            })?;

        if self.config.retain_particle_pool {
            self.particle_pool.retain();
        }
        self.map_loaded = true;

        if let Err(err) = self.build_map(&description, gpu) {
            log::warn!("Failed to load map '{}': {}", map_file, err);
            self.unload_content(gpu);
            return Err(err);
        }
        log::info!(
            "Loaded map '{}': {} nodes, {} map resources",
            map_file,
            self.scene.nodes().len(),
            self.map_cache.len()
        );
        Ok(())
    }

    /// Drop every node, the bullet pool and the particle pool retention.
    /// Released resources stay cached until the next sweep.
    pub fn unload_content(&mut self, gpu: &mut dyn GpuBackend) {
        for payload in self.scene.clear() {
            payload.release(&mut self.common, &mut self.map_cache, gpu);
        }
        if let Some(bullets) = self.bullets.take() {
            bullets.release(&mut self.common);
        }
        if let Some(sky) = self.sky.take() {
            sky.release(&mut self.map_cache, gpu);
        }
        self.terrain_node = None;
        self.clutter_node = None;
        self.particle_nodes.clear();

        if self.map_loaded && self.config.retain_particle_pool {
            self.particle_pool.release();
        }
        self.particle_pool.collect(gpu);
        self.map_loaded = false;
        log::info!("Unloaded map content");
    }

    fn add_node(&mut self, payload: Drawable, group: String, bounds: BoundingBox) -> Result<NodeId> {
        let id = self.scene.insert(payload);
        self.scene.set_bounding_box(id, bounds)?;
        self.scene.set_render_group(id, Some(group));
        self.scene.add_to_scene(id);
        Ok(id)
    }

    fn build_map(&mut self, map: &MapDescription, gpu: &mut dyn GpuBackend) -> Result<()> {
        let defaults = TerrainConfig::default();
        let terrain_config = TerrainConfig {
            size: map.terrain.size.unwrap_or(defaults.size),
            skirt_height: map.terrain.skirt_height.unwrap_or(self.config.skirt_height),
            lod_range: self.config.lod_range,
        };
        let terrain = match &map.terrain.source {
            TerrainSource::Heightmap(file) => {
                Terrain::from_heightmap(&self.map_cache.root().join(file), terrain_config, gpu)?
            }
            TerrainSource::Flat(res) => Terrain::with_size(*res, terrain_config, gpu)?,
        };
        let terrain_bounds = terrain.bounds();
        let terrain_id = self.add_node(Drawable::Terrain(Box::new(terrain)), "terrain".into(), terrain_bounds)?;
        self.terrain_node = Some(terrain_id);

        if let Some(Drawable::Terrain(terrain)) = self.scene.payload_mut(terrain_id) {
            if let Some(file) = &map.terrain.texture {
                terrain.set_texture_map(file, &mut self.map_cache, gpu)?;
            }
            if let Some(file) = &map.terrain.detail {
                terrain.set_detail_map(file, &mut self.map_cache, gpu)?;
            }
            if let Some((to_light, res)) = map.terrain.lightmap {
                terrain.compute_lightmap(to_light, res)?;
            }
        }

        let area = ScalarRect::new(
            terrain_bounds.min.x,
            terrain_bounds.min.z,
            terrain_bounds.max.x,
            terrain_bounds.max.z,
        );

        if let Some(desc) = &map.trees {
            let mut trees = TreeSystem::new(area);
            if let Err(err) = self.fill_trees(&mut trees, desc, area, gpu) {
                trees.release(&mut self.map_cache, gpu);
                return Err(err);
            }
            let full = IntRect::new(0, 0, TREE_BATCH_GRID_SIZE as i32, TREE_BATCH_GRID_SIZE as i32);
            let bounds = trees.bounds_of_batch_region(full);
            let bounds = if bounds.is_empty() { terrain_bounds } else { bounds };
            self.add_node(Drawable::Trees(trees), "trees".into(), bounds)?;
        }

        if let Some(desc) = &map.clutter {
            let mut clutter = ClutterSystem::new(desc.capacity.unwrap_or(self.config.clutter_capacity), area);
            if let Err(err) = self.fill_clutter(&mut clutter, desc, gpu) {
                clutter.release(&mut self.map_cache, gpu);
                return Err(err);
            }
            let tallest = desc
                .types
                .iter()
                .map(|t| t.y_offset + t.max_size)
                .fold(0.0, f32::max);
            let mut bounds = terrain_bounds;
            bounds.max.y += tallest;
            self.clutter_node = Some(self.add_node(Drawable::Clutter(clutter), "clutter".into(), bounds)?);
        }

        if let Some(desc) = &map.sky {
            self.sky = Some(SkyBox::new(&desc.faces, &mut self.map_cache, gpu)?);
        }

        if let Some(desc) = &map.camera {
            let camera = self.scene.camera_mut();
            camera.origin = desc.position;
            camera.look = desc.look;
            camera.update();
        }
        let fog = map.fog.or_else(|| self.config.fog.as_ref().map(|f| f.to_range()));
        self.scene.set_fog(fog);

        for placement in &map.models {
            let model = Model::load(&placement.file, &mut self.map_cache, gpu)?;
            let bounds = model.bounds();
            let group = model.render_group_key();
            let id = self.add_node(Drawable::Model(model), group, bounds)?;
            self.scene.set_position(id, placement.position)?;
            self.scene
                .set_rotation(id, Mat3::from_rotation_y(placement.yaw.to_radians()))?;
        }

        if let Some(file) = &map.bullets {
            let bullet_type = self.common.acquire::<BulletType>(file, gpu)?;
            self.bullets = Some(BulletPool::new(bullet_type, self.config.bullet_capacity));
        }
        Ok(())
    }

    fn fill_trees(
        &mut self,
        trees: &mut TreeSystem,
        desc: &TreeDescription,
        area: ScalarRect,
        gpu: &mut dyn GpuBackend,
    ) -> Result<()> {
        if let Some(file) = &desc.texture {
            trees.set_texture(file, &mut self.map_cache, gpu)?;
        }
        let mut rng = Rng::new(desc.seed.unwrap_or(self.config.seed));
        let count = tree_count_for_density(desc.density, &area);
        let instances = populate_trees_procedurally(count, desc.min_size, desc.max_size, area, &mut rng);
        let ground = self.terrain().ok_or_else(|| EngineError::Configuration("map has no terrain".into()))?;
        trees.set_trees(instances, ground, gpu);
        if trees.rejected_count() > 0 {
            log::warn!("{} of {} trees did not fit their batch", trees.rejected_count(), count);
        }
        Ok(())
    }

    /// Types are checked before the atlas is acquired
    fn fill_clutter(
        &mut self,
        clutter: &mut ClutterSystem,
        desc: &ClutterDescription,
        gpu: &mut dyn GpuBackend,
    ) -> Result<()> {
        clutter.set_types(desc.types.clone())?;
        if let Some(file) = &desc.texture {
            clutter.set_atlas_texture(file, &mut self.map_cache, gpu)?;
        }
        let mut rng = Rng::new(desc.seed.unwrap_or(self.config.seed));
        let ground = self.terrain().ok_or_else(|| EngineError::Configuration("map has no terrain".into()))?;
        clutter.regen_clutter_types(ground, &mut rng, gpu);
        Ok(())
    }

    /// Launch a bullet from the pool. False when no map with bullets is
    /// loaded or the pool is saturated.
    pub fn fire_bullet(&mut self, position: Vec3, velocity: Vec3, originator: Option<NodeId>) -> bool {
        let Some(bullet) = self.bullets.as_mut().and_then(BulletPool::fire_bullet) else {
            return false;
        };
        bullet.start_position = position;
        bullet.start_velocity = velocity;
        bullet.originator = originator;
        true
    }

    /// Start a particle effect at `position`. `Ok(None)` when
    /// `max_particle_effects` are already running.
    pub fn spawn_particles(
        &mut self,
        effect_file: &str,
        position: Vec3,
        gpu: &mut dyn GpuBackend,
    ) -> Result<Option<NodeId>> {
        if self.particle_nodes.len() >= self.config.max_particle_effects {
            self.dropped_effects += 1;
            log::warn!(
                "Particle effect '{}' dropped, {} already running ({} dropped so far)",
                effect_file,
                self.particle_nodes.len(),
                self.dropped_effects
            );
            return Ok(None);
        }

        let effect = self.common.acquire::<ParticleEffect>(effect_file, gpu)?;
        let mut system = ParticleSystem::new(effect);
        system.begin_animation(&self.particle_pool, gpu, &mut self.rng);
        let bounds = system.bounds();

        let id = self.add_node(Drawable::Particles(system), format!("particles:{}", effect_file), bounds)?;
        self.scene.set_position(id, position)?;
        self.particle_nodes.push(id);
        Ok(Some(id))
    }

    pub fn frame_update(&mut self, dt: f32) -> Vec<Impact> {
        self.frame_update_with(dt, |_| None)
    }

    /// Advance the simulation by `dt` seconds. Bullets move in fixed steps
    /// and are tested against the terrain, then against `hit_test`.
    /// Finished particle systems are removed from the scene.
    pub fn frame_update_with(
        &mut self,
        dt: f32,
        mut hit_test: impl FnMut(&Bullet) -> Option<NodeId>,
    ) -> Vec<Impact> {
        self.acceleration = self.sensor.latest();
        let steps = self.clock.advance(dt);
        let step = self.clock.fixed_timestep;

        let mut impacts = Vec::new();
        if let Some(bullets) = self.bullets.as_mut() {
            let terrain = self
                .terrain_node
                .and_then(|id| self.scene.payload(id))
                .and_then(Drawable::as_terrain);
            for _ in 0..steps {
                impacts.extend(bullets.frame_update(step, terrain, &mut hit_test));
            }
        }

        let elapsed = self.clock.time().delta;
        let mut finished = Vec::new();
        for &id in &self.particle_nodes {
            let Some(Drawable::Particles(system)) = self.scene.payload_mut(id) else {
                continue;
            };
            if system.update_animation(elapsed) {
                let bounds = system.bounds();
                if let Err(err) = self.scene.set_bounding_box(id, bounds) {
                    log::warn!("Particle node lost: {}", err);
                }
            } else {
                finished.push(id);
            }
        }
        for id in finished {
            self.particle_nodes.retain(|&n| n != id);
            for payload in self.scene.remove_subtree(id) {
                match payload {
                    Drawable::Particles(system) => system.release(&mut self.common),
                    other => log::warn!("Unexpected {} under a particle node", other.kind_name()),
                }
            }
        }
        impacts
    }

    /// Draw one frame: camera, clutter visibility, the sky, the scene and
    /// bullets.
    /// Every `sweep_interval_secs` unreferenced resources older than
    /// `sweep_timeout_secs` are freed.
    pub fn render_frame(&mut self, time: GameTime, gpu: &mut dyn GpuBackend) -> FrameStats {
        let mut stats = FrameStats::default();
        if !self.map_loaded {
            return stats;
        }

        self.scene.camera_mut().update();
        if let Some(id) = self.clutter_node {
            let camera = self.scene.camera().clone();
            if let Some(Drawable::Clutter(clutter)) = self.scene.payload_mut(id) {
                stats.clutter = clutter.update(&camera, time.total, gpu);
            }
        }

        if let Some(sky) = &self.sky {
            stats.sky_draws = sky.render(self.scene.camera(), gpu);
        }
        stats.scene = self.scene.render(gpu);
        if let Some(bullets) = &self.bullets {
            stats.bullet_draws = bullets.render(self.scene.camera(), self.scene.fog(), gpu);
        }

        if time.total - self.last_sweep >= self.config.sweep_interval_secs || time.total < self.last_sweep {
            self.last_sweep = time.total;
            let max_age = Duration::try_from_secs_f32(self.config.sweep_timeout_secs).unwrap_or(Duration::MAX);
            stats.swept = self.map_cache.sweep_older_than(max_age, gpu) + self.common.sweep_older_than(max_age, gpu);
            self.particle_pool.collect(gpu);
            if stats.swept > 0 {
                log::debug!("Periodic sweep freed {} resources", stats.swept);
            }
        }

        gpu_check(gpu);
        stats
    }

    /// Free every unreferenced resource and every spare particle buffer now.
    /// Returns the number of resources freed.
    pub fn on_low_memory(&mut self, gpu: &mut dyn GpuBackend) -> usize {
        let freed = self.map_cache.sweep_now(gpu) + self.common.sweep_now(gpu);
        let buffers = self.particle_pool.purge(gpu);
        log::warn!("Low memory: freed {} resources and {} particle buffer sets", freed, buffers);
        freed
    }

    /// Unload the map and empty both caches
    pub fn shutdown(&mut self, gpu: &mut dyn GpuBackend) {
        self.unload_content(gpu);
        self.particle_pool.purge(gpu);
        self.map_cache.clear(gpu);
        self.common.clear(gpu);
    }
}
