//! Animated particle systems

use crate::effect::{EmissionData, ParticleEffect};
use crate::pool::{BufferLease, ParticleBufferPool};
use crate::MAX_PARTICLES_PER_SYSTEM;
use xengine_asset::{Handle, ResourceCache};
use xengine_core::{BoundingBox, ColorBytes, Rng, Vec3};
use xengine_gpu::{write_vertices, ColorVertex, DrawCall, GpuBackend, VertexLayout};
use xengine_scene::NodeView;

/// One live particle. State at any age is computed from the spawn values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub origin: Vec3,
    pub velocity: Vec3,
    pub gravity: f32,
    pub angle: f32,
    pub rotate_speed: f32,
    pub scale: f32,
    pub scale_speed: f32,
    pub color: ColorBytes,
    pub start_alpha: f32,
    pub end_alpha: f32,
    pub life: f32,
    pub age: f32,
}

impl Particle {
    fn spawn(emission: &EmissionData, added_velocity: Vec3, rng: &mut Rng) -> Self {
        Self {
            origin: rng.range_vec3(emission.emit_box.min, emission.emit_box.max),
            velocity: rng.range_vec3(emission.min_velocity, emission.max_velocity) + added_velocity,
            gravity: rng.range(emission.min_gravity, emission.max_gravity),
            angle: rng.range(emission.min_angle, emission.max_angle),
            rotate_speed: rng.range(emission.min_rotate_speed, emission.max_rotate_speed),
            scale: rng.range(emission.min_scale, emission.max_scale),
            scale_speed: rng.range(emission.min_scale_speed, emission.max_scale_speed),
            color: emission.min_color.lerp(&emission.max_color, rng.next_f32()),
            start_alpha: emission.start_alpha,
            end_alpha: emission.end_alpha,
            life: rng.range(emission.min_life, emission.max_life),
            age: 0.0,
        }
    }

    /// `origin + velocity * t + 0.5 * gravity * t^2` (gravity acts on Y)
    pub fn position(&self) -> Vec3 {
        let t = self.age;
        let mut p = self.origin + self.velocity * t;
        p.y += 0.5 * self.gravity * t * t;
        p
    }

    pub fn current_angle(&self) -> f32 {
        self.angle + self.rotate_speed * self.age
    }

    pub fn current_scale(&self) -> f32 {
        (self.scale + self.scale_speed * self.age).max(0.0)
    }

    pub fn alpha(&self) -> f32 {
        let f = (self.age / self.life).clamp(0.0, 1.0);
        self.start_alpha + (self.end_alpha - self.start_alpha) * f
    }

    pub fn is_expired(&self) -> bool {
        self.age >= self.life
    }
}

/// A running instance of a [`ParticleEffect`]
pub struct ParticleSystem {
    effect: Handle<ParticleEffect>,
    /// Multiplied into every particle color
    pub shade: ColorBytes,
    /// Added to every particle's spawn velocity
    pub added_velocity: Vec3,
    particles: Vec<Particle>,
    lease: Option<BufferLease>,
    bounds: BoundingBox,
    dropped: usize,
}

fn modulate(color: ColorBytes, shade: ColorBytes, alpha: f32) -> [u8; 4] {
    let m = |a: u8, b: u8| ((a as u16 * b as u16) / 255) as u8;
    [
        m(color.r, shade.r),
        m(color.g, shade.g),
        m(color.b, shade.b),
        (alpha.clamp(0.0, 1.0) * m(color.a, shade.a) as f32).round() as u8,
    ]
}

impl ParticleSystem {
    pub fn new(effect: Handle<ParticleEffect>) -> Self {
        Self {
            effect,
            shade: ColorBytes::WHITE,
            added_velocity: Vec3::ZERO,
            particles: Vec::with_capacity(MAX_PARTICLES_PER_SYSTEM),
            lease: None,
            bounds: BoundingBox::default(),
            dropped: 0,
        }
    }

    pub fn effect(&self) -> &ParticleEffect {
        &self.effect
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Particles that did not fit under `MAX_PARTICLES_PER_SYSTEM`
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    /// Local-space bounds of the live particles
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn is_animating(&self) -> bool {
        self.lease.is_some()
    }

    /// Emit every particle of the effect and lease geometry from `pool`.
    /// Restarting a running system keeps its lease.
    pub fn begin_animation(&mut self, pool: &ParticleBufferPool, gpu: &mut dyn GpuBackend, rng: &mut Rng) {
        self.particles.clear();
        let mut dropped = 0;
        for emission in &self.effect.emissions {
            for _ in 0..emission.emit_count {
                if self.particles.len() == MAX_PARTICLES_PER_SYSTEM {
                    dropped += 1;
                    continue;
                }
                self.particles.push(Particle::spawn(emission, self.added_velocity, rng));
            }
        }
        if dropped > 0 {
            log::debug!(
                "particle effect emits {} particles; dropped {} over the cap of {}",
                self.effect.total_particles(),
                dropped,
                MAX_PARTICLES_PER_SYSTEM
            );
            self.dropped += dropped;
        }
        if self.lease.is_none() {
            self.lease = Some(pool.checkout(gpu));
        }
        self.update_bounds();
    }

    /// Advance by `dt` seconds and retire expired particles. The animation
    /// ends by itself when the last particle expires. Returns whether it is
    /// still running.
    pub fn update_animation(&mut self, dt: f32) -> bool {
        if !self.is_animating() {
            return false;
        }
        let mut i = 0;
        while i < self.particles.len() {
            self.particles[i].age += dt;
            if self.particles[i].is_expired() {
                self.particles.swap_remove(i);
            } else {
                i += 1;
            }
        }
        if self.particles.is_empty() {
            self.end_animation();
            return false;
        }
        self.update_bounds();
        true
    }

    /// Stop and give the geometry back to the pool
    pub fn end_animation(&mut self) {
        self.particles.clear();
        self.lease = None;
        self.bounds = BoundingBox::default();
    }

    fn update_bounds(&mut self) {
        let mut bounds = BoundingBox::empty();
        for p in &self.particles {
            let r = p.current_scale();
            let c = p.position();
            bounds.include(c - Vec3::new(r, r, r));
            bounds.include(c + Vec3::new(r, r, r));
        }
        self.bounds = if bounds.is_empty() { BoundingBox::default() } else { bounds };
    }

    /// Camera-facing quads for the live particles, in local space
    pub fn build_vertices(&self, right: Vec3, up: Vec3) -> Vec<ColorVertex> {
        let mut vertices = Vec::with_capacity(self.particles.len() * 4);
        for p in &self.particles {
            let (sin, cos) = p.current_angle().sin_cos();
            let half = p.current_scale() * 0.5;
            let r = (right * cos + up * sin) * half;
            let u = (up * cos - right * sin) * half;
            let c = p.position();
            let color = modulate(p.color, self.shade, p.alpha());
            vertices.push(ColorVertex::new((c - r - u).to_array(), [0.0, 1.0], color));
            vertices.push(ColorVertex::new((c + r - u).to_array(), [1.0, 1.0], color));
            vertices.push(ColorVertex::new((c + r + u).to_array(), [1.0, 0.0], color));
            vertices.push(ColorVertex::new((c - r + u).to_array(), [0.0, 0.0], color));
        }
        vertices
    }

    /// One unlit, depth-write-off draw with the effect's blend mode
    pub fn render(&mut self, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) -> usize {
        let Some(lease) = &self.lease else {
            return 0;
        };
        if self.particles.is_empty()
            || !view
                .camera
                .is_visible_box_transformed(&self.bounds, view.position, &view.rotation)
        {
            return 0;
        }

        // camera axes in the node's local frame
        let to_local = view.rotation.transpose();
        let look = view.camera.look;
        let right = look.cross(&view.camera.up).normalized();
        let up = right.cross(&look).normalized();
        let vertices = self.build_vertices(to_local.mul_vec3(right), to_local.mul_vec3(up));

        let set = lease.set();
        write_vertices(gpu, set.vertex_buffer, 0, &vertices);
        let mut call = DrawCall::new(
            set.vertex_buffer,
            set.index_buffer,
            (self.particles.len() * 6) as u32,
            VertexLayout::Colored,
        );
        call.texture = self.effect.texture().map(|t| t.id());
        call.blend = self.effect.blend;
        call.depth_write = false;
        call.lit = false;
        call.mvp = view.mvp();
        call.model = view.model_matrix();
        call.fog = view.fog;
        gpu.draw(&call);
        1
    }

    pub fn release(mut self, cache: &mut ResourceCache) {
        self.end_animation();
        cache.release(self.effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::VERTICES_PER_SET;
    use std::path::PathBuf;
    use xengine_core::Mat3;
    use xengine_gpu::{BlendMode, RecordingBackend};
    use xengine_scene::{Camera, NodeId};

    struct Fixture {
        dir: PathBuf,
        cache: ResourceCache,
        gpu: RecordingBackend,
        pool: ParticleBufferPool,
        rng: Rng,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("xengine_particles_{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join("puff.fx"),
                "blend additive\nemission {\n count 10\n velocity 0 1 0 0 1 0\n gravity -2 -2\n life 1 1\n}\n",
            )
            .unwrap();
            std::fs::write(
                dir.join("storm.fx"),
                "emission {\n count 100\n life 1 3\n}\nemission {\n count 50\n life 1 3\n}\n",
            )
            .unwrap();
            Self {
                cache: ResourceCache::new(&dir),
                dir,
                gpu: RecordingBackend::new(),
                pool: ParticleBufferPool::new(),
                rng: Rng::new(7),
            }
        }

        fn system(&mut self, file: &str) -> ParticleSystem {
            ParticleSystem::new(self.cache.acquire::<ParticleEffect>(file, &mut self.gpu).unwrap())
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn view_of(camera: &Camera) -> NodeView<'_> {
        NodeView {
            id: NodeId::default(),
            position: Vec3::new(0.0, 0.0, -10.0),
            rotation: Mat3::IDENTITY,
            bounding_box: BoundingBox::default(),
            bounding_radius: 0.0,
            use_bounding_sphere_only: false,
            camera,
            fog: None,
        }
    }

    #[test]
    fn test_closed_form_position() {
        let mut fx = Fixture::new();
        let mut system = fx.system("puff.fx");
        system.added_velocity = Vec3::new(2.0, 0.0, 0.0);
        system.begin_animation(&fx.pool, &mut fx.gpu, &mut fx.rng);
        assert!(system.update_animation(0.5));

        let p = system.particles()[0];
        // y = 1 * 0.5 + 0.5 * -2 * 0.25
        let expected = Vec3::new(1.0, 0.25, 0.0);
        assert!((p.position() - expected).length() < 1e-5, "{:?}", p.position());
        assert!((p.alpha() - 0.5).abs() < 1e-6);
        system.release(&mut fx.cache);
    }

    #[test]
    fn test_emission_is_capped() {
        let mut fx = Fixture::new();
        let mut system = fx.system("storm.fx");
        system.begin_animation(&fx.pool, &mut fx.gpu, &mut fx.rng);
        assert_eq!(system.particles().len(), MAX_PARTICLES_PER_SYSTEM);
        assert_eq!(system.dropped_count(), 150 - MAX_PARTICLES_PER_SYSTEM);
        system.release(&mut fx.cache);
    }

    #[test]
    fn test_expired_particles_retire_and_animation_ends() {
        let mut fx = Fixture::new();
        let mut system = fx.system("storm.fx");
        system.begin_animation(&fx.pool, &mut fx.gpu, &mut fx.rng);
        assert!(system.update_animation(1.5));
        let left = system.particles().len();
        assert!(left > 0 && left < MAX_PARTICLES_PER_SYSTEM);
        assert!(system.particles().iter().all(|p| p.life > 1.5));

        assert!(!system.update_animation(2.0));
        assert!(!system.is_animating());
        assert_eq!(fx.pool.stats().outstanding, 0);
        assert_eq!(fx.pool.stats().free, 1);
        system.release(&mut fx.cache);
    }

    #[test]
    fn test_churn_versus_retained_pool() {
        let mut fx = Fixture::new();
        let mut system = fx.system("puff.fx");

        for _ in 0..3 {
            system.begin_animation(&fx.pool, &mut fx.gpu, &mut fx.rng);
            system.end_animation();
            fx.pool.collect(&mut fx.gpu);
        }
        assert_eq!(fx.pool.stats().created, 3);

        fx.pool.retain();
        for _ in 0..3 {
            system.begin_animation(&fx.pool, &mut fx.gpu, &mut fx.rng);
            system.end_animation();
            fx.pool.collect(&mut fx.gpu);
        }
        assert_eq!(fx.pool.stats().created, 4);
        fx.pool.release();
        fx.pool.purge(&mut fx.gpu);
        system.release(&mut fx.cache);
        assert_eq!(fx.gpu.live_buffer_count(), 0);
    }

    #[test]
    fn test_render_writes_quads_and_draws_once() {
        let mut fx = Fixture::new();
        let mut system = fx.system("puff.fx");
        system.shade = ColorBytes::new(255, 128, 255, 255);
        system.begin_animation(&fx.pool, &mut fx.gpu, &mut fx.rng);
        system.update_animation(0.25);

        let camera = Camera::new();
        assert_eq!(system.render(&view_of(&camera), &mut fx.gpu), 1);

        let draws = fx.gpu.take_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_count, 60);
        assert_eq!(draws[0].blend, BlendMode::Additive);
        assert!(!draws[0].depth_write && !draws[0].lit);

        let vertices: Vec<ColorVertex> = fx.gpu.read_buffer(draws[0].vertex_buffer);
        assert_eq!(vertices.len(), VERTICES_PER_SET);
        assert_eq!(vertices[0].color[1], 128);
        assert_eq!(vertices[0].color[3], 191);
        // quads face the camera: all corners share the particle's depth
        assert_eq!(vertices[0].position[2], vertices[2].position[2]);

        let mut behind = Camera::new();
        behind.look = Vec3::new(0.0, 0.0, 1.0);
        behind.update();
        assert_eq!(system.render(&view_of(&behind), &mut fx.gpu), 0);
        system.release(&mut fx.cache);
    }
}
