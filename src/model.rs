use std::collections::HashMap;
use std::f32::consts::{PI, TAU};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Quat, Vec3};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::params::rgb_from_hex;
use crate::scene::{Geometry, NodeId, SceneGraph, StandardMaterial, Transform};

/// Where the displayed model comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelSource {
    /// Box, sphere and cylinder placeholder group.
    #[default]
    Default,
    /// Single torus knot mesh.
    TorusKnot,
    /// glTF / GLB file on disk.
    Gltf(PathBuf),
    /// glTF / GLB document already in memory, e.g. a file picked in the browser.
    GltfBytes { name: String, data: Vec<u8> },
}

impl ModelSource {
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::GltfBytes {
            name: name.into(),
            data,
        }
    }
}

impl FromStr for ModelSource {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim() {
            "" | "default" => Self::Default,
            "torus-knot" | "torusknot" => Self::TorusKnot,
            path => Self::Gltf(PathBuf::from(path)),
        })
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::TorusKnot => f.write_str("torus-knot"),
            Self::Gltf(path) => write!(f, "{}", path.display()),
            Self::GltfBytes { name, .. } => f.write_str(name),
        }
    }
}

/// Placement applied to the model root after loading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    pub scale: f32,
    pub position: Vec3,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            position: Vec3::ZERO,
        }
    }
}

/// Loads `source` into `scene` and returns the model root.
pub fn load_model(scene: &mut SceneGraph, source: &ModelSource, options: ModelOptions) -> Result<NodeId> {
    let root = match source {
        ModelSource::Default => default_model(scene),
        ModelSource::TorusKnot => torus_knot_model(scene),
        ModelSource::Gltf(path) => load_gltf(scene, path)?,
        ModelSource::GltfBytes { name, data } => load_gltf_slice(scene, name, data)?,
    };
    place_root(scene, root, options);
    info!(
        "loaded model {source} with {} mesh(es)",
        scene.meshes_under(root).len()
    );
    Ok(root)
}

/// Like [`load_model`], but falls back to the placeholder group when the
/// loader fails.
pub fn load_or_fallback(scene: &mut SceneGraph, source: &ModelSource, options: ModelOptions) -> NodeId {
    match load_model(scene, source, options) {
        Ok(root) => root,
        Err(err) => {
            warn!("model {source} could not be loaded, using placeholder: {err:#}");
            let root = default_model(scene);
            place_root(scene, root, options);
            root
        }
    }
}

/// Placeholder group: translucent box, sphere and cylinder with a cyan
/// edge overlay on the box.
pub fn default_model(scene: &mut SceneGraph) -> NodeId {
    let root = scene.add_group("default-model", None);

    let cube_geometry = Arc::new(box_geometry());
    let cube = scene.add_mesh(
        "cube",
        Some(root),
        Arc::clone(&cube_geometry),
        Arc::new(StandardMaterial {
            color: rgb_from_hex(0x0088ff),
            opacity: 0.8,
            emissive: rgb_from_hex(0x001a33),
            metalness: 0.7,
            roughness: 0.2,
        }),
    );
    place(scene, cube, Vec3::new(-1.2, 0.0, 0.0));

    let sphere = scene.add_mesh(
        "sphere",
        Some(root),
        Arc::new(sphere_geometry(0.5, 32, 32)),
        Arc::new(StandardMaterial {
            color: rgb_from_hex(0x00aaff),
            opacity: 0.9,
            emissive: rgb_from_hex(0x002244),
            metalness: 0.5,
            roughness: 0.3,
        }),
    );
    place(scene, sphere, Vec3::ZERO);

    let cylinder = scene.add_mesh(
        "cylinder",
        Some(root),
        Arc::new(cylinder_geometry(0.3, 0.3, 1.5, 32)),
        Arc::new(StandardMaterial {
            color: rgb_from_hex(0x0066cc),
            opacity: 0.7,
            emissive: rgb_from_hex(0x001122),
            metalness: 0.8,
            roughness: 0.1,
        }),
    );
    place(scene, cylinder, Vec3::new(1.2, 0.0, 0.0));

    let edges = scene.add_lines(
        "cube-edges",
        Some(root),
        Arc::new(edges_geometry(&cube_geometry)),
        rgb_from_hex(0x00ffff),
    );
    place(scene, edges, Vec3::new(-1.2, 0.0, 0.0));

    root
}

/// Single-mesh fallback object.
pub fn torus_knot_model(scene: &mut SceneGraph) -> NodeId {
    scene.add_mesh(
        "torus-knot",
        None,
        Arc::new(torus_knot_geometry(1.0, 0.3, 100, 16, 2, 3)),
        Arc::new(StandardMaterial {
            color: rgb_from_hex(0x0088ff),
            opacity: 1.0,
            emissive: rgb_from_hex(0x001a33),
            metalness: 0.7,
            roughness: 0.2,
        }),
    )
}

/// Ground grid helper centred on the origin.
pub fn grid_helper(scene: &mut SceneGraph, size: f32, divisions: u32) -> NodeId {
    let divisions = divisions.max(1);
    let root = scene.add_group("grid-helper", None);
    let half = size / 2.0;
    let step = size / divisions as f32;
    let center = divisions / 2;

    let mut major = LineBuilder::default();
    let mut minor = LineBuilder::default();
    for i in 0..=divisions {
        let offset = -half + i as f32 * step;
        let lines = if i == center { &mut major } else { &mut minor };
        lines.segment(Vec3::new(-half, 0.0, offset), Vec3::new(half, 0.0, offset));
        lines.segment(Vec3::new(offset, 0.0, -half), Vec3::new(offset, 0.0, half));
    }
    scene.add_lines(
        "grid-center",
        Some(root),
        Arc::new(major.build("grid-center")),
        rgb_from_hex(0x0088ff),
    );
    scene.add_lines(
        "grid",
        Some(root),
        Arc::new(minor.build("grid")),
        rgb_from_hex(0x001a33),
    );
    root
}

/// Applies the model placement to an already loaded root.
pub fn place_root(scene: &mut SceneGraph, root: NodeId, options: ModelOptions) {
    if let Some(node) = scene.node_mut(root) {
        node.transform.position = options.position;
        node.transform.scale = Vec3::splat(options.scale);
    }
}

fn place(scene: &mut SceneGraph, node: NodeId, position: Vec3) {
    if let Some(node) = scene.node_mut(node) {
        node.transform = Transform::from_position(position);
    }
}

fn load_gltf(scene: &mut SceneGraph, path: &Path) -> Result<NodeId> {
    let (document, buffers, _images) =
        gltf::import(path).with_context(|| format!("failed to import {}", path.display()))?;
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("model");
    import_document(scene, name, &document, &buffers)
}

/// In-memory import. Only self-contained documents work here: GLB or glTF
/// with data URIs, since there is no directory to resolve other files from.
fn load_gltf_slice(scene: &mut SceneGraph, name: &str, data: &[u8]) -> Result<NodeId> {
    let (document, buffers, _images) =
        gltf::import_slice(data).with_context(|| format!("failed to import {name}"))?;
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    import_document(scene, stem, &document, &buffers)
}

fn import_document(
    scene: &mut SceneGraph,
    name: &str,
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Result<NodeId> {
    let gltf_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("{name} does not contain a scene"))?;

    let root = scene.add_group(name, None);
    let mut materials = HashMap::new();
    for node in gltf_scene.nodes() {
        if let Err(err) = import_node(scene, root, &node, buffers, &mut materials) {
            scene.remove_subtree(root);
            return Err(err);
        }
    }
    Ok(root)
}

fn import_node(
    scene: &mut SceneGraph,
    parent: NodeId,
    node: &gltf::Node<'_>,
    buffers: &[gltf::buffer::Data],
    materials: &mut HashMap<Option<usize>, Arc<StandardMaterial>>,
) -> Result<()> {
    let name = node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node-{}", node.index()));
    let id = scene.add_group(name.clone(), Some(parent));
    let (translation, rotation, scale) = node.transform().decomposed();
    if let Some(entry) = scene.node_mut(id) {
        entry.transform = Transform {
            position: Vec3::from_array(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from_array(scale),
        };
    }

    if let Some(mesh) = node.mesh() {
        for (index, primitive) in mesh.primitives().enumerate() {
            if !matches!(primitive.mode(), gltf::mesh::Mode::Triangles) {
                continue;
            }
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| anyhow!("primitive {index} of {name} has no positions"))?
                .collect();
            let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|iter| iter.collect());
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            if indices.iter().any(|i| *i as usize >= positions.len()) {
                return Err(anyhow!("primitive {index} of {name} has out-of-range indices"));
            }

            let mut vertices = Vec::with_capacity(positions.len() * Geometry::STRIDE);
            for (i, position) in positions.iter().enumerate() {
                vertices.extend_from_slice(position);
                let normal = normals
                    .as_ref()
                    .and_then(|normals| normals.get(i))
                    .copied()
                    .unwrap_or([0.0; 3]);
                vertices.extend_from_slice(&normal);
            }
            let mut geometry = Geometry::new(format!("{name}-{index}"), vertices, indices);
            if geometry.needs_normals() {
                geometry.compute_normals();
            }

            let gltf_material = primitive.material();
            let material = materials
                .entry(gltf_material.index())
                .or_insert_with(|| Arc::new(convert_material(&gltf_material)))
                .clone();
            scene.add_mesh(
                format!("{name}-primitive-{index}"),
                Some(id),
                Arc::new(geometry),
                material,
            );
        }
    }

    for child in node.children() {
        import_node(scene, id, &child, buffers, materials)?;
    }
    Ok(())
}

fn convert_material(material: &gltf::Material<'_>) -> StandardMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    StandardMaterial {
        color: Vec3::new(r, g, b),
        opacity: a,
        emissive: Vec3::from_array(material.emissive_factor()),
        metalness: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
    }
}

#[derive(Default)]
struct MeshBuilder {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    fn vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let index = (self.vertices.len() / Geometry::STRIDE) as u32;
        self.vertices.extend_from_slice(&position.to_array());
        self.vertices.extend_from_slice(&normal.to_array());
        index
    }

    fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    fn build(self, label: &str) -> Geometry {
        Geometry::new(label, self.vertices, self.indices)
    }
}

#[derive(Default)]
struct LineBuilder {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl LineBuilder {
    fn segment(&mut self, a: Vec3, b: Vec3) {
        let base = (self.vertices.len() / Geometry::STRIDE) as u32;
        for point in [a, b] {
            self.vertices.extend_from_slice(&point.to_array());
            self.vertices.extend_from_slice(&[0.0; 3]);
        }
        self.indices.extend_from_slice(&[base, base + 1]);
    }

    fn build(self, label: &str) -> Geometry {
        Geometry::new(label, self.vertices, self.indices)
    }
}

/// Unit cube with per-face normals.
pub fn box_geometry() -> Geometry {
    Geometry::new("box", CUBE_VERTICES.to_vec(), CUBE_INDICES.to_vec())
}

pub fn sphere_geometry(radius: f32, width_segments: u32, height_segments: u32) -> Geometry {
    let mut mesh = MeshBuilder::default();
    for y in 0..=height_segments {
        let v = y as f32 / height_segments as f32;
        let theta = v * PI;
        for x in 0..=width_segments {
            let u = x as f32 / width_segments as f32;
            let phi = u * TAU;
            let normal = Vec3::new(-phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin());
            mesh.vertex(normal * radius, normal);
        }
    }
    let row = width_segments + 1;
    for y in 0..height_segments {
        for x in 0..width_segments {
            let a = y * row + x + 1;
            let b = y * row + x;
            let c = (y + 1) * row + x;
            let d = (y + 1) * row + x + 1;
            if y != 0 {
                mesh.triangle(a, b, d);
            }
            if y != height_segments - 1 {
                mesh.triangle(b, c, d);
            }
        }
    }
    mesh.build("sphere")
}

pub fn cylinder_geometry(radius_top: f32, radius_bottom: f32, height: f32, radial_segments: u32) -> Geometry {
    let mut mesh = MeshBuilder::default();
    let half = height / 2.0;
    let slope = (radius_bottom - radius_top) / height;

    let mut rings = Vec::with_capacity(2);
    for (y, radius) in [(half, radius_top), (-half, radius_bottom)] {
        let ring: Vec<u32> = (0..=radial_segments)
            .map(|i| {
                let angle = i as f32 / radial_segments as f32 * TAU;
                let (sin, cos) = angle.sin_cos();
                let normal = Vec3::new(sin, slope, cos).normalize();
                mesh.vertex(Vec3::new(radius * sin, y, radius * cos), normal)
            })
            .collect();
        rings.push(ring);
    }
    for i in 0..radial_segments as usize {
        let (a, b) = (rings[0][i], rings[1][i]);
        let (c, d) = (rings[1][i + 1], rings[0][i + 1]);
        mesh.triangle(a, b, d);
        mesh.triangle(b, c, d);
    }

    for (y, radius, up) in [(half, radius_top, 1.0f32), (-half, radius_bottom, -1.0)] {
        let normal = Vec3::new(0.0, up, 0.0);
        let center = mesh.vertex(Vec3::new(0.0, y, 0.0), normal);
        let ring: Vec<u32> = (0..=radial_segments)
            .map(|i| {
                let angle = i as f32 / radial_segments as f32 * TAU;
                let (sin, cos) = angle.sin_cos();
                mesh.vertex(Vec3::new(radius * sin, y, radius * cos), normal)
            })
            .collect();
        for pair in ring.windows(2) {
            if up > 0.0 {
                mesh.triangle(center, pair[0], pair[1]);
            } else {
                mesh.triangle(center, pair[1], pair[0]);
            }
        }
    }
    mesh.build("cylinder")
}

pub fn torus_knot_geometry(
    radius: f32,
    tube: f32,
    tubular_segments: u32,
    radial_segments: u32,
    p: u32,
    q: u32,
) -> Geometry {
    let curve = |u: f32| {
        let cu = u.cos();
        let su = u.sin();
        let qu = q as f32 / p as f32 * u;
        let cs = qu.cos();
        Vec3::new(
            radius * (2.0 + cs) * 0.5 * cu,
            radius * (2.0 + cs) * su * 0.5,
            radius * qu.sin() * 0.5,
        )
    };

    let mut mesh = MeshBuilder::default();
    for i in 0..=tubular_segments {
        let u = i as f32 / tubular_segments as f32 * p as f32 * TAU;
        let p1 = curve(u);
        let p2 = curve(u + 0.01);
        let t = p2 - p1;
        let n = p2 + p1;
        let b = t.cross(n).normalize_or_zero();
        let n = b.cross(t).normalize_or_zero();
        for j in 0..=radial_segments {
            let v = j as f32 / radial_segments as f32 * TAU;
            let cx = -tube * v.cos();
            let cy = tube * v.sin();
            let position = p1 + n * cx + b * cy;
            mesh.vertex(position, (position - p1).normalize_or_zero());
        }
    }
    let row = radial_segments + 1;
    for j in 1..=tubular_segments {
        for i in 1..=radial_segments {
            let a = row * (j - 1) + (i - 1);
            let b = row * j + (i - 1);
            let c = row * j + i;
            let d = row * (j - 1) + i;
            mesh.triangle(a, b, d);
            mesh.triangle(b, c, d);
        }
    }
    mesh.build("torus-knot")
}

/// Edges whose adjacent faces meet at a hard angle (or border edges).
pub fn edges_geometry(geometry: &Geometry) -> Geometry {
    let key = |p: Vec3| (p * 1e4).round().to_array().map(|c| c as i64);
    let mut faces_by_edge: HashMap<([i64; 3], [i64; 3]), (Vec3, Vec3, Vec<Vec3>)> = HashMap::new();

    for triangle in geometry.indices.chunks_exact(3) {
        let points = [0, 1, 2].map(|k| geometry.position(triangle[k] as usize));
        let normal = (points[1] - points[0]).cross(points[2] - points[0]).normalize_or_zero();
        for k in 0..3 {
            let (a, b) = (points[k], points[(k + 1) % 3]);
            let (ka, kb) = (key(a), key(b));
            let edge = if ka <= kb { (ka, kb) } else { (kb, ka) };
            faces_by_edge
                .entry(edge)
                .or_insert_with(|| (a, b, Vec::new()))
                .2
                .push(normal);
        }
    }

    let mut edges: Vec<_> = faces_by_edge.into_iter().collect();
    edges.sort_by(|a, b| a.0.cmp(&b.0));

    let mut lines = LineBuilder::default();
    let threshold = 1.0_f32.to_radians().cos();
    for (_, (a, b, normals)) in edges {
        let hard = match normals.as_slice() {
            [first, second] => first.dot(*second) <= threshold,
            _ => true,
        };
        if hard {
            lines.segment(a, b);
        }
    }
    lines.build(&format!("{}-edges", geometry.label))
}

const CUBE_VERTICES: &[f32] = &[
    // positions        // normals
    -0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 0.5, 0.5, 0.5, 0.0, 0.0, 1.0,
    -0.5, 0.5, 0.5, 0.0, 0.0, 1.0, -0.5, -0.5, -0.5, 0.0, 0.0, -1.0, 0.5, -0.5, -0.5, 0.0, 0.0,
    -1.0, 0.5, 0.5, -0.5, 0.0, 0.0, -1.0, -0.5, 0.5, -0.5, 0.0, 0.0, -1.0, -0.5, -0.5, -0.5, -1.0,
    0.0, 0.0, -0.5, -0.5, 0.5, -1.0, 0.0, 0.0, -0.5, 0.5, 0.5, -1.0, 0.0, 0.0, -0.5, 0.5, -0.5,
    -1.0, 0.0, 0.0, 0.5, -0.5, -0.5, 1.0, 0.0, 0.0, 0.5, -0.5, 0.5, 1.0, 0.0, 0.0, 0.5, 0.5, 0.5,
    1.0, 0.0, 0.0, 0.5, 0.5, -0.5, 1.0, 0.0, 0.0, -0.5, -0.5, -0.5, 0.0, -1.0, 0.0, 0.5, -0.5,
    -0.5, 0.0, -1.0, 0.0, 0.5, -0.5, 0.5, 0.0, -1.0, 0.0, -0.5, -0.5, 0.5, 0.0, -1.0, 0.0, -0.5,
    0.5, -0.5, 0.0, 1.0, 0.0, 0.5, 0.5, -0.5, 0.0, 1.0, 0.0, 0.5, 0.5, 0.5, 0.0, 1.0, 0.0, -0.5,
    0.5, 0.5, 0.0, 1.0, 0.0,
];

const CUBE_INDICES: &[u32] = &[
    0, 1, 2, 0, 2, 3, // front
    4, 6, 5, 4, 7, 6, // back
    8, 9, 10, 8, 10, 11, // left
    12, 14, 13, 12, 15, 14, // right
    16, 18, 17, 16, 19, 18, // bottom
    20, 21, 22, 20, 22, 23, // top
];

/// One triangle in a self-contained glTF document.
#[cfg(test)]
pub(crate) const TRIANGLE_GLTF: &str = r#"{
    "asset": { "version": "2.0" },
    "scene": 0,
    "scenes": [{ "nodes": [0] }],
    "nodes": [{ "name": "tri", "mesh": 0 }],
    "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
    "accessors": [{
        "bufferView": 0,
        "componentType": 5126,
        "count": 3,
        "type": "VEC3",
        "min": [0.0, 0.0, 0.0],
        "max": [1.0, 1.0, 0.0]
    }],
    "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
    "buffers": [{
        "byteLength": 36,
        "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"
    }]
}"#;
