use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{HologramError, Result};
use crate::material::InstanceId;

/// Handle to a node stored in a [`SceneGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Local transform of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Interleaved vertex data shared between meshes.
///
/// Vertices are laid out as `position.xyz` followed by `normal.xyz`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    id: u64,
    pub label: String,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub const STRIDE: usize = 6;

    pub fn new(label: impl Into<String>, vertices: Vec<f32>, indices: Vec<u32>) -> Self {
        Self {
            id: NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            vertices,
            indices,
        }
    }

    /// Process-unique identifier, used as a GPU buffer cache key.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / Self::STRIDE
    }

    pub fn position(&self, index: usize) -> Vec3 {
        let base = index * Self::STRIDE;
        Vec3::from_slice(&self.vertices[base..base + 3])
    }

    pub fn needs_normals(&self) -> bool {
        self.vertices
            .chunks_exact(Self::STRIDE)
            .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    /// Replaces the normals with area-weighted face normals.
    pub fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertex_count()];

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            let p0 = self.position(i0);
            let p1 = self.position(i1);
            let p2 = self.position(i2);
            let normal = (p1 - p0).cross(p2 - p0);
            if normal.length_squared() > f32::EPSILON {
                let normal = normal.normalize();
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }

        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            let base = i * Self::STRIDE;
            self.vertices[base + 3..base + 6].copy_from_slice(&normal.to_array());
        }
    }
}

/// Surface material a mesh carries outside of the hologram effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub emissive: Vec3,
    pub metalness: f32,
    pub roughness: f32,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            emissive: Vec3::ZERO,
            metalness: 0.0,
            roughness: 1.0,
        }
    }
}

/// Material currently assigned to a mesh.
#[derive(Debug, Clone)]
pub enum MaterialSlot {
    Standard(Arc<StandardMaterial>),
    Hologram(InstanceId),
}

impl MaterialSlot {
    /// Identity comparison: standard materials compare by reference.
    pub fn same_as(&self, other: &MaterialSlot) -> bool {
        match (self, other) {
            (Self::Standard(a), Self::Standard(b)) => Arc::ptr_eq(a, b),
            (Self::Hologram(a), Self::Hologram(b)) => a == b,
            _ => false,
        }
    }

    pub fn hologram(&self) -> Option<InstanceId> {
        match self {
            Self::Hologram(id) => Some(*id),
            Self::Standard(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeshNode {
    pub geometry: Arc<Geometry>,
    pub material: MaterialSlot,
}

/// Line overlay (edges, helpers). Not affected by material effects.
#[derive(Debug, Clone)]
pub struct LineNode {
    pub geometry: Arc<Geometry>,
    pub color: Vec3,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
    Lines(LineNode),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, NodeKind::Mesh(_))
    }

    pub fn mesh(&self) -> Option<&MeshNode> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// Arena-backed node tree. Removed nodes leave a vacant slot so handles
/// are never reused within a graph.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Option<SceneNode>>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, name: impl Into<String>, parent: Option<NodeId>) -> NodeId {
        self.insert(name.into(), NodeKind::Group, parent)
    }

    pub fn add_mesh(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        geometry: Arc<Geometry>,
        material: Arc<StandardMaterial>,
    ) -> NodeId {
        let kind = NodeKind::Mesh(MeshNode {
            geometry,
            material: MaterialSlot::Standard(material),
        });
        self.insert(name.into(), kind, parent)
    }

    pub fn add_lines(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        geometry: Arc<Geometry>,
        color: Vec3,
    ) -> NodeId {
        self.insert(name.into(), NodeKind::Lines(LineNode { geometry, color }), parent)
    }

    fn insert(&mut self, name: String, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = parent.filter(|parent| self.contains(*parent));
        self.nodes.push(Some(SceneNode {
            name,
            transform: Transform::default(),
            visible: true,
            kind,
            parent,
            children: Vec::new(),
        }));
        match parent {
            Some(parent) => {
                if let Some(parent) = self.node_mut(parent) {
                    parent.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-order walk of `root` and everything below it.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let stack = if self.contains(root) {
            vec![root]
        } else {
            Vec::new()
        };
        Descendants { graph: self, stack }
    }

    /// Pre-order walk over every root.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().flat_map(|root| self.descendants(*root))
    }

    /// Mesh-like nodes under `root`, in traversal order.
    pub fn meshes_under(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .filter(|id| self.node(*id).map_or(false, SceneNode::is_mesh))
            .collect()
    }

    pub fn material(&self, id: NodeId) -> Option<&MaterialSlot> {
        self.node(id)?.mesh().map(|mesh| &mesh.material)
    }

    /// Swaps the material of a mesh node and returns the previous one.
    pub fn replace_material(&mut self, id: NodeId, material: MaterialSlot) -> Result<MaterialSlot> {
        match self.node_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::Mesh(mesh)) => Ok(std::mem::replace(&mut mesh.material, material)),
            _ => Err(HologramError::MissingNode(id)),
        }
    }

    /// World matrix obtained by composing the parent chain.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.node(id)) {
            matrix = node.transform.matrix() * matrix;
            current = node.parent;
        }
        matrix
    }

    /// A node is drawn only when it and all of its ancestors are visible.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.node(id)) {
            if !node.visible {
                return false;
            }
            current = node.parent;
        }
        true
    }

    /// Detaches and drops `root` with its whole subtree.
    pub fn remove_subtree(&mut self, root: NodeId) -> usize {
        let doomed: Vec<NodeId> = self.descendants(root).collect();
        if let Some(parent) = self.node(root).and_then(SceneNode::parent) {
            if let Some(parent) = self.node_mut(parent) {
                parent.children.retain(|child| *child != root);
            }
        } else {
            self.roots.retain(|id| *id != root);
        }
        for id in &doomed {
            self.nodes[id.0] = None;
        }
        doomed.len()
    }
}

pub struct Descendants<'a> {
    graph: &'a SceneGraph,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        if let Some(node) = self.graph.node(id) {
            self.stack.extend(node.children.iter().rev().copied());
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Arc<Geometry> {
        Arc::new(Geometry::new(
            "triangle",
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            ],
            vec![0, 1, 2],
        ))
    }

    #[test]
    fn traversal_is_pre_order() {
        let mut graph = SceneGraph::new();
        let root = graph.add_group("root", None);
        let a = graph.add_group("a", Some(root));
        let a1 = graph.add_mesh("a1", Some(a), triangle(), Arc::default());
        let b = graph.add_mesh("b", Some(root), triangle(), Arc::default());
        let order: Vec<NodeId> = graph.descendants(root).collect();
        assert_eq!(order, vec![root, a, a1, b]);
        assert_eq!(graph.meshes_under(root), vec![a1, b]);
    }

    #[test]
    fn lines_are_not_mesh_like() {
        let mut graph = SceneGraph::new();
        let root = graph.add_group("root", None);
        graph.add_lines("edges", Some(root), triangle(), Vec3::ONE);
        assert!(graph.meshes_under(root).is_empty());
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut graph = SceneGraph::new();
        let root = graph.add_group("root", None);
        let child = graph.add_group("child", Some(root));
        graph.node_mut(root).unwrap().transform = Transform::from_position(Vec3::X);
        graph.node_mut(child).unwrap().transform = Transform::from_position(Vec3::Y);
        let origin = graph.world_matrix(child).transform_point3(Vec3::ZERO);
        assert_eq!(origin, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn remove_subtree_frees_every_node() {
        let mut graph = SceneGraph::new();
        let keep = graph.add_group("keep", None);
        let root = graph.add_group("root", None);
        let mesh = graph.add_mesh("mesh", Some(root), triangle(), Arc::default());
        assert_eq!(graph.remove_subtree(root), 2);
        assert!(!graph.contains(mesh));
        assert_eq!(graph.roots(), &[keep]);
        assert_eq!(graph.descendants(root).count(), 0);
    }

    #[test]
    fn hidden_ancestor_hides_descendants() {
        let mut graph = SceneGraph::new();
        let root = graph.add_group("root", None);
        let mesh = graph.add_mesh("mesh", Some(root), triangle(), Arc::default());
        graph.node_mut(root).unwrap().visible = false;
        assert!(!graph.is_visible(mesh));
    }

    #[test]
    fn computes_missing_normals() {
        let mut geometry = (*triangle()).clone();
        assert!(geometry.needs_normals());
        geometry.compute_normals();
        for chunk in geometry.vertices.chunks_exact(Geometry::STRIDE) {
            let normal = Vec3::new(chunk[3], chunk[4], chunk[5]);
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
    }
}
