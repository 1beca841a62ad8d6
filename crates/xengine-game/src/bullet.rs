//! Fixed-capacity bullet pool
//!
//! ```text
//! mesh "shell.xmesh"
//! texture "shell.png"      // optional
//! life 3
//! gravity -9.8
//! damage 25
//! collision_radius 0.5
//! ```

use xengine_asset::{Handle, LoadContext, Resource, ResourceCache, ResourceKind, Texture};
use xengine_core::{EngineError, Mat3, Result, Vec3};
use xengine_gpu::{DrawCall, FogRange, GpuBackend, VertexLayout};
use xengine_mesh::Mesh;
use xengine_scene::{Camera, NodeId};
use xengine_script::ScriptNode;
use xengine_terrain::Terrain;

/// Shared look and ballistics of one kind of projectile
pub struct BulletType {
    mesh: Handle<Mesh>,
    texture: Option<Handle<Texture>>,
    pub life: f32,
    pub gravity: f32,
    pub damage: f32,
    pub collision_radius: f32,
}

impl BulletType {
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_deref()
    }
}

fn positive(root: &ScriptNode, name: &str, default: f32) -> Result<f32> {
    let value = root.subnode_f32_or(name, 0, default)?;
    if value <= 0.0 {
        return Err(EngineError::Configuration(format!("bullet {} must be positive, got {}", name, value)));
    }
    Ok(value)
}

impl Resource for BulletType {
    const KIND: ResourceKind = "bullet_type";

    fn load(ctx: &mut LoadContext<'_>) -> Result<Self> {
        let root = ScriptNode::parse(&ctx.read_to_string()?)?;
        let life = positive(&root, "life", 3.0)?;
        let collision_radius = positive(&root, "collision_radius", 0.25)?;
        let gravity = root.subnode_f32_or("gravity", 0, -9.8)?;
        let damage = root.subnode_f32_or("damage", 0, 1.0)?;

        let mesh_file = root
            .required_subnode("mesh")?
            .value(0)
            .ok_or_else(|| EngineError::Configuration("bullet mesh needs a filename".into()))?
            .to_string();
        let mesh = ctx.acquire::<Mesh>(&mesh_file)?;
        let texture = match root.subnode_named("texture").and_then(|n| n.value(0)) {
            Some(file) => match ctx.acquire::<Texture>(file) {
                Ok(texture) => Some(texture),
                Err(err) => {
                    ctx.release(mesh);
                    return Err(err);
                }
            },
            None => None,
        };

        Ok(Self {
            mesh,
            texture,
            life,
            gravity,
            damage,
            collision_radius,
        })
    }

    fn unload(self, cache: &mut ResourceCache, _gpu: &mut dyn GpuBackend) {
        if let Some(texture) = self.texture {
            cache.release(texture);
        }
        cache.release(self.mesh);
    }
}

/// One pool slot. Kinematics are closed-form from the launch state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bullet {
    pub start_position: Vec3,
    pub start_velocity: Vec3,
    pub gravity: f32,
    pub life: f32,
    pub age: f32,
    pub damage: f32,
    pub collision_radius: f32,
    /// The tank that fired it, for hit attribution only
    pub originator: Option<NodeId>,
    pub active: bool,
}

impl Bullet {
    pub fn current_position(&self) -> Vec3 {
        let t = self.age;
        let mut p = self.start_position + self.start_velocity * t;
        p.y += 0.5 * self.gravity * t * t;
        p
    }

    pub fn current_velocity(&self) -> Vec3 {
        let mut v = self.start_velocity;
        v.y += self.gravity * self.age;
        v
    }

    /// Facing along the current velocity (yaw only)
    pub fn rotation(&self) -> Mat3 {
        let v = self.current_velocity();
        Mat3::from_rotation_y(v.x.atan2(v.z))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImpactTarget {
    Terrain,
    Node(NodeId),
}

/// A bullet that stopped by hitting something this frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Impact {
    pub position: Vec3,
    pub target: ImpactTarget,
    pub originator: Option<NodeId>,
    pub damage: f32,
}

pub struct BulletPool {
    bullet_type: Handle<BulletType>,
    slots: Vec<Bullet>,
    next: usize,
    active: usize,
    dropped: usize,
}

impl BulletPool {
    pub fn new(bullet_type: Handle<BulletType>, capacity: usize) -> Self {
        Self {
            bullet_type,
            slots: vec![Bullet::default(); capacity],
            next: 0,
            active: 0,
            dropped: 0,
        }
    }

    pub fn bullet_type(&self) -> &BulletType {
        &self.bullet_type
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Shots that found the pool saturated
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    pub fn active_bullets(&self) -> impl Iterator<Item = &Bullet> {
        self.slots.iter().filter(|b| b.active)
    }

    /// Claim the next inactive slot, reset to the bullet type's values.
    /// `None` means the shot is dropped; the caller sets position,
    /// velocity and originator on success.
    pub fn fire_bullet(&mut self) -> Option<&mut Bullet> {
        let capacity = self.slots.len();
        let Some(index) = (0..capacity)
            .map(|i| (self.next + i) % capacity)
            .find(|&i| !self.slots[i].active)
        else {
            self.dropped += 1;
            log::warn!(
                "bullet pool saturated ({} slots), shot dropped ({} dropped so far)",
                capacity,
                self.dropped
            );
            return None;
        };

        self.next = (index + 1) % capacity;
        self.active += 1;
        let t = &*self.bullet_type;
        let bullet = &mut self.slots[index];
        *bullet = Bullet {
            gravity: t.gravity,
            life: t.life,
            damage: t.damage,
            collision_radius: t.collision_radius,
            active: true,
            ..Bullet::default()
        };
        Some(bullet)
    }

    /// Advance every active bullet. Bullets whose life ran out, that reached
    /// the terrain surface or that `hit_test` reports are deactivated; hits
    /// are returned as impacts.
    pub fn frame_update(
        &mut self,
        dt: f32,
        terrain: Option<&Terrain>,
        mut hit_test: impl FnMut(&Bullet) -> Option<NodeId>,
    ) -> Vec<Impact> {
        let mut impacts = Vec::new();
        for bullet in self.slots.iter_mut().filter(|b| b.active) {
            bullet.age += dt;
            if bullet.age >= bullet.life {
                bullet.active = false;
                self.active -= 1;
                continue;
            }

            let position = bullet.current_position();
            let ground = terrain
                .and_then(|t| t.intersect_vertically_at(position))
                .filter(|hit| position.y - bullet.collision_radius <= hit.point.y);
            let impact = match ground {
                Some(hit) => Some((hit.point, ImpactTarget::Terrain)),
                None => hit_test(&*bullet).map(|node| (position, ImpactTarget::Node(node))),
            };

            if let Some((position, target)) = impact {
                impacts.push(Impact {
                    position,
                    target,
                    originator: bullet.originator,
                    damage: bullet.damage,
                });
                bullet.active = false;
                self.active -= 1;
            }
        }
        impacts
    }

    /// Draw every visible active bullet with the type's mesh
    pub fn render(&self, camera: &Camera, fog: Option<FogRange>, gpu: &mut dyn GpuBackend) -> usize {
        let mesh = self.bullet_type.mesh();
        let radius = mesh.bounds().farthest_corner_distance(Vec3::ONE);
        let texture = self.bullet_type.texture().map(|t| t.id());
        let view_projection = camera.view_projection();

        let mut draws = 0;
        for bullet in self.active_bullets() {
            let position = bullet.current_position();
            if !camera.is_visible_sphere(position, radius) {
                continue;
            }
            let model = bullet.rotation().to_mat4(position);
            for submesh in mesh.submeshes() {
                let mut call = DrawCall::new(
                    submesh.vertex_buffer,
                    submesh.index_buffer,
                    submesh.index_count,
                    VertexLayout::Lit,
                );
                call.texture = texture;
                call.mvp = view_projection * model;
                call.model = model;
                call.fog = fog;
                gpu.draw(&call);
                draws += 1;
            }
        }
        draws
    }

    pub fn release(self, cache: &mut ResourceCache) {
        cache.release(self.bullet_type);
    }
}
