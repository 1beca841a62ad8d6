//! Scene: node arena + camera + render groups

use crate::camera::Camera;
use crate::node::{NodeArena, NodeId};
use std::collections::{BTreeMap, BTreeSet};
use xengine_core::{BoundingBox, Mat3, Mat4, Result, Vec3};
use xengine_gpu::{FogRange, GpuBackend};

/// Everything a node payload needs to cull and draw itself
pub struct NodeView<'a> {
    pub id: NodeId,
    pub position: Vec3,
    pub rotation: Mat3,
    /// Local-space bounds
    pub bounding_box: BoundingBox,
    pub bounding_radius: f32,
    pub use_bounding_sphere_only: bool,
    pub camera: &'a Camera,
    pub fog: Option<FogRange>,
}

impl NodeView<'_> {
    pub fn model_matrix(&self) -> Mat4 {
        self.rotation.to_mat4(self.position)
    }

    pub fn mvp(&self) -> Mat4 {
        self.camera.view_projection() * self.model_matrix()
    }

    /// Sphere test, then (unless disabled) the transformed box test
    pub fn is_visible(&self) -> bool {
        if !self.camera.is_visible_sphere(self.position, self.bounding_radius) {
            return false;
        }
        self.use_bounding_sphere_only
            || self
                .camera
                .is_visible_box_transformed(&self.bounding_box, self.position, &self.rotation)
    }
}

/// Drawing behaviour of a node payload
pub trait RenderNode {
    /// Cull against `view.camera` and issue draws. Returns the number of
    /// draw calls issued.
    fn render(&mut self, view: &NodeView<'_>, gpu: &mut dyn GpuBackend) -> usize;

    /// Called on the first member of a render group before any member renders
    fn begin_group(&mut self, _gpu: &mut dyn GpuBackend) {}

    /// Called on the same member after the whole group rendered
    fn end_group(&mut self, _gpu: &mut dyn GpuBackend) {}
}

/// Per-frame counters from [`Scene::render`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub groups: usize,
    pub nodes: usize,
    /// Nodes that issued no draw (culled or empty)
    pub culled: usize,
    pub draw_calls: usize,
}

/// A camera plus a set of nodes drawn in render-group order
pub struct Scene<P> {
    nodes: NodeArena<P>,
    groups: BTreeMap<String, BTreeSet<NodeId>>,
    camera: Camera,
    fog: Option<FogRange>,
}

impl<P> Default for Scene<P> {
    fn default() -> Self {
        Self::new(Camera::default())
    }
}

impl<P> Scene<P> {
    pub fn new(camera: Camera) -> Self {
        Self {
            nodes: NodeArena::new(),
            groups: BTreeMap::new(),
            camera,
            fog: None,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn fog(&self) -> Option<FogRange> {
        self.fog
    }

    pub fn set_fog(&mut self, fog: Option<FogRange>) {
        self.fog = fog;
    }

    pub fn nodes(&self) -> &NodeArena<P> {
        &self.nodes
    }

    /// Create a detached node (not yet in the scene)
    pub fn insert(&mut self, payload: P) -> NodeId {
        self.nodes.insert(payload)
    }

    pub fn payload(&self, id: NodeId) -> Option<&P> {
        self.nodes.payload(id)
    }

    pub fn payload_mut(&mut self, id: NodeId) -> Option<&mut P> {
        self.nodes.payload_mut(id)
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<()> {
        self.nodes.set_position(id, position)
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Mat3) -> Result<()> {
        self.nodes.set_rotation(id, rotation)
    }

    pub fn set_bounding_box(&mut self, id: NodeId, bounds: BoundingBox) -> Result<()> {
        self.nodes.set_bounding_box(id, bounds)
    }

    pub fn set_use_bounding_sphere_only(&mut self, id: NodeId, enabled: bool) -> Result<()> {
        self.nodes.set_use_bounding_sphere_only(id, enabled)
    }

    /// Add a root node and its subtree to the scene
    pub fn add_to_scene(&mut self, id: NodeId) {
        self.set_subtree_membership(id, true);
    }

    pub fn remove_from_scene(&mut self, id: NodeId) {
        self.set_subtree_membership(id, false);
    }

    /// Re-parent `child`. The subtree takes the scene membership of its new
    /// parent; detaching (`None`) takes it out of the scene.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<()> {
        self.nodes.set_parent(child, parent)?;
        let in_scene = parent
            .and_then(|p| self.nodes.get(p))
            .map(|p| p.in_scene())
            .unwrap_or(false);
        self.set_subtree_membership(child, in_scene);
        Ok(())
    }

    /// Change the render group of `id`. Nodes without a group are never drawn.
    pub fn set_render_group(&mut self, id: NodeId, key: Option<impl Into<String>>) {
        let key = key.map(Into::into);
        let in_scene = self.nodes.get(id).map(|n| n.in_scene()).unwrap_or(false);
        let old = self.nodes.set_render_group_key(id, key.clone());
        if in_scene {
            self.unregister(id, old.as_deref());
            self.register(id, key.as_deref());
        }
    }

    /// Destroy a node and its descendants, returning their payloads so the
    /// caller can release what they hold
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<P> {
        for node_id in self.nodes.subtree(id) {
            let group = self
                .nodes
                .get(node_id)
                .filter(|n| n.in_scene())
                .and_then(|n| n.render_group().map(str::to_string));
            self.unregister(node_id, group.as_deref());
        }
        self.nodes.remove_subtree(id)
    }

    /// Remove every node, returning all payloads
    pub fn clear(&mut self) -> Vec<P> {
        let roots: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent().is_none())
            .map(|(id, _)| id)
            .collect();
        let mut payloads = Vec::new();
        for root in roots {
            payloads.extend(self.remove_subtree(root));
        }
        payloads
    }

    /// Group names in draw order
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group_members(&self, name: &str) -> Option<&BTreeSet<NodeId>> {
        self.groups.get(name)
    }

    fn set_subtree_membership(&mut self, id: NodeId, in_scene: bool) {
        for node_id in self.nodes.subtree(id) {
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            if node.in_scene() == in_scene {
                continue;
            }
            let group = node.render_group().map(str::to_string);
            self.nodes.set_in_scene(node_id, in_scene);
            if in_scene {
                self.register(node_id, group.as_deref());
            } else {
                self.unregister(node_id, group.as_deref());
            }
        }
    }

    fn register(&mut self, id: NodeId, group: Option<&str>) {
        if let Some(group) = group {
            self.groups.entry(group.to_string()).or_default().insert(id);
        }
    }

    fn unregister(&mut self, id: NodeId, group: Option<&str>) {
        let Some(group) = group else {
            return;
        };
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&id);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
    }
}

impl<P: RenderNode> Scene<P> {
    /// Draw every render group in name order. Payloads cull themselves
    /// through the camera in their [`NodeView`].
    pub fn render(&mut self, gpu: &mut dyn GpuBackend) -> RenderStats {
        let mut stats = RenderStats::default();

        for members in self.groups.values() {
            let Some(&leader) = members.iter().next() else {
                continue;
            };
            stats.groups += 1;
            if let Some(payload) = self.nodes.payload_mut(leader) {
                payload.begin_group(gpu);
            }

            for &id in members {
                let Some(view) = make_view(&self.nodes, &self.camera, self.fog, id) else {
                    continue;
                };
                let Some(payload) = self.nodes.payload_mut(id) else {
                    continue;
                };
                let draws = payload.render(&view, gpu);
                stats.nodes += 1;
                stats.draw_calls += draws;
                if draws == 0 {
                    stats.culled += 1;
                }
            }

            if let Some(payload) = self.nodes.payload_mut(leader) {
                payload.end_group(gpu);
            }
        }

        log::trace!(
            "Scene render: {} groups, {} nodes, {} culled, {} draws",
            stats.groups,
            stats.nodes,
            stats.culled,
            stats.draw_calls
        );
        stats
    }
}

fn make_view<'a, P>(
    nodes: &NodeArena<P>,
    camera: &'a Camera,
    fog: Option<FogRange>,
    id: NodeId,
) -> Option<NodeView<'a>> {
    let node = nodes.get(id)?;
    let (position, rotation) = nodes.global_transform(id)?;
    Some(NodeView {
        id,
        position,
        rotation,
        bounding_box: node.bounding_box(),
        bounding_radius: nodes.bounding_radius(id)?,
        use_bounding_sphere_only: node.use_bounding_sphere_only,
        camera,
        fog,
    })
}
