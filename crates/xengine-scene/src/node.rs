//! Scene node arena: hierarchy, lazy global transforms and bounds

use slotmap::{new_key_type, SlotMap};
use std::cell::Cell;
use xengine_core::{BoundingBox, EngineError, Mat3, Mat4, Result, Vec3};

new_key_type! {
    /// Stable, generation-checked node id
    pub struct NodeId;
}

/// One node. Hierarchy edges are ids into the owning [`NodeArena`].
pub struct Node<P> {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    position: Vec3,
    rotation: Mat3,
    bounding_box: BoundingBox,
    /// Cull with the bounding sphere only (many small objects)
    pub use_bounding_sphere_only: bool,
    render_group: Option<String>,
    in_scene: bool,
    global: Cell<Option<(Vec3, Mat3)>>,
    bounding_radius: Cell<Option<f32>>,
    payload: P,
}

impl<P> Node<P> {
    fn new(payload: P) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            bounding_box: BoundingBox::default(),
            use_bounding_sphere_only: false,
            render_group: None,
            in_scene: false,
            global: Cell::new(None),
            bounding_radius: Cell::new(None),
            payload,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Mat3 {
        self.rotation
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn render_group(&self) -> Option<&str> {
        self.render_group.as_deref()
    }

    pub fn in_scene(&self) -> bool {
        self.in_scene
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// True if the cached global transform is current
    pub fn has_cached_transform(&self) -> bool {
        self.global.get().is_some()
    }
}

/// Arena owning every node of a hierarchy
pub struct NodeArena<P> {
    nodes: SlotMap<NodeId, Node<P>>,
}

impl<P> Default for NodeArena<P> {
    fn default() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }
}

impl<P> NodeArena<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached root node
    pub fn insert(&mut self, payload: P) -> NodeId {
        self.nodes.insert(Node::new(payload))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<P>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn payload(&self, id: NodeId) -> Option<&P> {
        self.nodes.get(id).map(|n| &n.payload)
    }

    pub fn payload_mut(&mut self, id: NodeId) -> Option<&mut P> {
        self.nodes.get_mut(id).map(|n| &mut n.payload)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node<P>)> {
        self.nodes.iter()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<P>> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::Configuration(format!("unknown scene node {:?}", id)))
    }

    /// Move `child` under `parent` (or make it a root with `None`).
    /// Scene membership is handled by the owning `Scene`.
    pub(crate) fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<()> {
        self.node_mut(child)?;
        if let Some(parent) = parent {
            self.node_mut(parent)?;
            if self.is_ancestor_or_self(child, parent) {
                return Err(EngineError::Configuration(format!(
                    "parenting {:?} under {:?} would create a cycle",
                    child, parent
                )));
            }
        }

        if let Some(old) = self.nodes[child].parent.take() {
            if let Some(old_parent) = self.nodes.get_mut(old) {
                old_parent.children.retain(|&c| c != child);
            }
        }
        if let Some(parent) = parent {
            self.nodes[parent].children.push(child);
            self.nodes[child].parent = Some(parent);
        }

        self.notify_transforms_changed(child);
        Ok(())
    }

    /// True if `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// `id` followed by all of its descendants (depth first, pre-order)
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<()> {
        self.node_mut(id)?.position = position;
        self.notify_transforms_changed(id);
        Ok(())
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Mat3) -> Result<()> {
        self.node_mut(id)?.rotation = rotation;
        self.notify_transforms_changed(id);
        Ok(())
    }

    pub fn set_bounding_box(&mut self, id: NodeId, bounds: BoundingBox) -> Result<()> {
        self.node_mut(id)?.bounding_box = bounds;
        self.notify_bounds_changed(id);
        Ok(())
    }

    pub fn set_use_bounding_sphere_only(&mut self, id: NodeId, enabled: bool) -> Result<()> {
        self.node_mut(id)?.use_bounding_sphere_only = enabled;
        Ok(())
    }

    /// Mark the global transforms of `id` and all its descendants stale.
    /// Scale may have changed too, so bounding radii are dropped as well.
    pub fn notify_transforms_changed(&mut self, id: NodeId) {
        for node_id in self.subtree(id) {
            let node = &self.nodes[node_id];
            node.global.set(None);
            node.bounding_radius.set(None);
        }
    }

    pub fn notify_bounds_changed(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get(id) {
            node.bounding_radius.set(None);
        }
    }

    /// Global (position, rotation), recomputed from the parent chain if stale
    pub fn global_transform(&self, id: NodeId) -> Option<(Vec3, Mat3)> {
        let node = self.nodes.get(id)?;
        if let Some(cached) = node.global.get() {
            return Some(cached);
        }
        let global = match node.parent.and_then(|p| self.global_transform(p)) {
            Some((parent_pos, parent_rot)) => (
                parent_pos + parent_rot.mul_vec3(node.position),
                parent_rot * node.rotation,
            ),
            None => (node.position, node.rotation),
        };
        node.global.set(Some(global));
        Some(global)
    }

    pub fn global_position(&self, id: NodeId) -> Option<Vec3> {
        self.global_transform(id).map(|(p, _)| p)
    }

    pub fn global_rotation(&self, id: NodeId) -> Option<Mat3> {
        self.global_transform(id).map(|(_, r)| r)
    }

    pub fn global_matrix(&self, id: NodeId) -> Option<Mat4> {
        self.global_transform(id).map(|(p, r)| r.to_mat4(p))
    }

    /// Radius of the sphere around the global position enclosing the
    /// bounding box, including accumulated scale
    pub fn bounding_radius(&self, id: NodeId) -> Option<f32> {
        let node = self.nodes.get(id)?;
        if let Some(radius) = node.bounding_radius.get() {
            return Some(radius);
        }
        let (_, rotation) = self.global_transform(id)?;
        let radius = node
            .bounding_box
            .farthest_corner_distance(rotation.scale_factors());
        node.bounding_radius.set(Some(radius));
        Some(radius)
    }

    pub(crate) fn set_in_scene(&mut self, id: NodeId, in_scene: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.in_scene = in_scene;
        }
    }

    pub(crate) fn set_render_group_key(&mut self, id: NodeId, key: Option<String>) -> Option<String> {
        match self.nodes.get_mut(id) {
            Some(node) => std::mem::replace(&mut node.render_group, key),
            None => None,
        }
    }

    /// Destroy `id` and its descendants, returning their payloads (root first)
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<P> {
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.children.retain(|&c| c != id);
            }
        }
        self.subtree(id)
            .into_iter()
            .filter_map(|node_id| self.nodes.remove(node_id))
            .map(|node| node.payload)
            .collect()
    }
}
