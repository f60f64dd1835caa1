use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use glam::{Mat3, Vec3, Vec4Swizzles};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use super::common::{CameraParams, DrawItem, DrawMaterial, LightParams};
use crate::material::HologramUniforms;
use crate::scene::Geometry;

const BACKGROUND: &str = "#000814";

/// Software renderer backed by a 2D canvas for WebAssembly builds. Triangles
/// are projected on the CPU, sorted back to front and filled flat.
pub struct Renderer {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    size: (u32, u32),
    camera: Option<CameraParams>,
    light: LightParams,
}

struct Face {
    depth: f32,
    points: [(f64, f64); 3],
    fill: String,
    alpha: f64,
    additive: bool,
}

impl Renderer {
    /// Creates a renderer that draws into the provided HTML canvas element.
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = canvas
            .get_context("2d")
            .map_err(|err| anyhow!("failed to query canvas context: {err:?}"))?
            .ok_or_else(|| anyhow!("canvas does not support 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| anyhow!("failed to cast canvas context"))?;

        let size = (canvas.width(), canvas.height());
        Ok(Self {
            canvas,
            context,
            size,
            camera: None,
            light: LightParams::default(),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Updates the canvas dimensions to match the browser layout.
    pub fn resize(&mut self, new_size: (u32, u32)) {
        if new_size.0 == 0 || new_size.1 == 0 {
            return;
        }
        self.size = new_size;
        self.canvas.set_width(new_size.0);
        self.canvas.set_height(new_size.1);
    }

    pub fn update_globals(&mut self, camera: &CameraParams, light: &LightParams) {
        self.camera = Some(camera.clone());
        self.light = light.clone();
    }

    pub fn render(&mut self, draws: &[DrawItem]) -> Result<(), JsValue> {
        self.clear_background();
        let Some(camera) = self.camera.clone() else {
            return Ok(());
        };

        let mut faces = Vec::new();
        for draw in draws {
            match &draw.material {
                DrawMaterial::Lines(color) => self.stroke_lines(&camera, draw, *color),
                DrawMaterial::Standard(material) => {
                    let shade = |normal: Vec3, center: Vec3| {
                        let light_dir = (self.light.position - center).normalize_or_zero();
                        let diffuse = normal.dot(light_dir).max(0.0) * self.light.intensity;
                        let lit = self.light.ambient * material.color
                            + material.color * self.light.color * diffuse
                            + material.emissive;
                        (css_color(lit), material.opacity as f64, false)
                    };
                    self.project_faces(&camera, draw, &mut faces, shade);
                }
                DrawMaterial::Hologram(uniforms) => {
                    let shade = |normal: Vec3, center: Vec3| {
                        hologram_shade(uniforms, &camera, normal, center)
                    };
                    self.project_faces(&camera, draw, &mut faces, shade);
                }
            }
        }

        faces.sort_by(|a, b| b.depth.partial_cmp(&a.depth).unwrap_or(Ordering::Equal));
        for face in &faces {
            self.fill_face(face)?;
        }
        self.context.set_global_alpha(1.0);
        self.context.set_global_composite_operation("source-over")?;

        if let Some(uniforms) = draws.iter().find_map(|draw| match &draw.material {
            DrawMaterial::Hologram(uniforms) => Some(*uniforms),
            _ => None,
        }) {
            self.draw_scanlines(&uniforms)?;
        }
        Ok(())
    }

    fn project_faces<F>(
        &self,
        camera: &CameraParams,
        draw: &DrawItem,
        faces: &mut Vec<Face>,
        shade: F,
    ) where
        F: Fn(Vec3, Vec3) -> (String, f64, bool),
    {
        let geometry = &draw.geometry;
        let normal_matrix = Mat3::from_mat4(draw.model.inverse().transpose());
        let jitter = match &draw.material {
            DrawMaterial::Hologram(uniforms) => glitch_offset(uniforms),
            _ => 0.0,
        };
        for triangle in geometry.indices.chunks_exact(3) {
            let world: Vec<Vec3> = triangle
                .iter()
                .map(|index| draw.model.transform_point3(geometry.position(*index as usize)))
                .collect();
            let normal = (normal_matrix * face_normal(geometry, triangle)).normalize_or_zero();
            let center = (world[0] + world[1] + world[2]) / 3.0;

            let mut points = [(0.0, 0.0); 3];
            let mut depth = 0.0;
            let mut visible = true;
            for (slot, position) in points.iter_mut().zip(&world) {
                match self.to_screen(camera, *position) {
                    Some((x, y, z)) => {
                        *slot = (x + jitter, y);
                        depth += z / 3.0;
                    }
                    None => visible = false,
                }
            }
            if !visible {
                continue;
            }
            let (fill, alpha, additive) = shade(normal, center);
            faces.push(Face {
                depth,
                points,
                fill,
                alpha,
                additive,
            });
        }
    }

    fn stroke_lines(&self, camera: &CameraParams, draw: &DrawItem, color: Vec3) {
        let context = &self.context;
        context.set_stroke_style(&JsValue::from_str(&css_color(color)));
        context.set_line_width(1.0);
        context.begin_path();
        for segment in draw.geometry.indices.chunks_exact(2) {
            let start = draw
                .model
                .transform_point3(draw.geometry.position(segment[0] as usize));
            let end = draw
                .model
                .transform_point3(draw.geometry.position(segment[1] as usize));
            if let (Some(a), Some(b)) = (self.to_screen(camera, start), self.to_screen(camera, end)) {
                context.move_to(a.0, a.1);
                context.line_to(b.0, b.1);
            }
        }
        context.stroke();
    }

    fn fill_face(&self, face: &Face) -> Result<(), JsValue> {
        let context = &self.context;
        context.set_global_alpha(face.alpha.clamp(0.0, 1.0));
        context.set_global_composite_operation(if face.additive { "lighter" } else { "source-over" })?;
        context.set_fill_style(&JsValue::from_str(&face.fill));
        context.begin_path();
        context.move_to(face.points[0].0, face.points[0].1);
        context.line_to(face.points[1].0, face.points[1].1);
        context.line_to(face.points[2].0, face.points[2].1);
        context.close_path();
        context.fill();
        Ok(())
    }

    fn draw_scanlines(&self, uniforms: &HologramUniforms) -> Result<(), JsValue> {
        let [intensity, count, ..] = uniforms.effects;
        if intensity <= 0.0 || count <= 0.0 {
            return Ok(());
        }
        let (width, height) = (self.size.0 as f64, self.size.1 as f64);
        let spacing = (height / (count as f64 * 2.0)).max(2.0);
        let offset = (uniforms.time[0] as f64 * 20.0) % spacing;
        self.context.set_global_alpha((intensity as f64 * 0.25).clamp(0.0, 1.0));
        self.context.set_fill_style(&JsValue::from_str(BACKGROUND));
        let mut y = offset;
        while y < height {
            self.context.fill_rect(0.0, y, width, 1.0);
            y += spacing;
        }
        self.context.set_global_alpha(1.0);
        Ok(())
    }

    /// Writes text lines over the frame, top-left aligned.
    pub fn draw_overlay(&self, lines: &[String], color: &str) -> Result<(), JsValue> {
        self.context.set_global_alpha(1.0);
        self.context.set_font("14px monospace");
        self.context.set_fill_style(&JsValue::from_str(color));
        for (row, line) in lines.iter().enumerate() {
            self.context.fill_text(line, 12.0, 24.0 + row as f64 * 18.0)?;
        }
        Ok(())
    }

    fn to_screen(&self, camera: &CameraParams, position: Vec3) -> Option<(f64, f64, f32)> {
        let clip = camera.view_proj * position.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        let (width, height) = (self.size.0 as f64, self.size.1 as f64);
        Some((
            (ndc.x as f64 + 1.0) * 0.5 * width,
            (1.0 - ndc.y as f64) * 0.5 * height,
            ndc.z,
        ))
    }

    fn clear_background(&self) {
        self.context.set_global_alpha(1.0);
        self.context.set_fill_style(&JsValue::from_str(BACKGROUND));
        self.context
            .fill_rect(0.0, 0.0, self.size.0 as f64, self.size.1 as f64);
    }
}

fn face_normal(geometry: &Geometry, triangle: &[u32]) -> Vec3 {
    let a = geometry.position(triangle[0] as usize);
    let b = geometry.position(triangle[1] as usize);
    let c = geometry.position(triangle[2] as usize);
    (b - a).cross(c - a)
}

/// Flat approximation of the hologram shader: base opacity plus a rim term,
/// modulated by a time-based flicker.
fn hologram_shade(
    uniforms: &HologramUniforms,
    camera: &CameraParams,
    normal: Vec3,
    center: Vec3,
) -> (String, f64, bool) {
    let [r, g, b, opacity] = uniforms.color;
    let [rim_power, rim_intensity, ..] = uniforms.rim;
    let [_, _, grid, glitch] = uniforms.effects;
    let time = uniforms.time[0];

    let view_dir = (camera.position - center).normalize_or_zero();
    let rim = (1.0 - normal.dot(view_dir).abs()).powf(rim_power) * rim_intensity;
    let flicker = 1.0 - glitch * hash((time * 20.0).floor());
    let intensity = ((opacity + rim + grid * 0.25) * flicker).clamp(0.0, 1.5);
    let color = Vec3::new(r, g, b) * intensity;
    (css_color(color), (opacity + rim * 0.5).clamp(0.0, 1.0) as f64, true)
}

/// Horizontal pixel shift applied to a whole mesh on glitch frames.
fn glitch_offset(uniforms: &HologramUniforms) -> f64 {
    let glitch = uniforms.effects[3];
    let frame = (uniforms.time[0] * 12.0).floor();
    if hash(frame) > 0.92 {
        ((hash(frame + 1.0) - 0.5) * glitch * 200.0) as f64
    } else {
        0.0
    }
}

fn hash(value: f32) -> f32 {
    ((value * 127.1).sin() * 43758.547).fract().abs()
}

fn css_color(color: Vec3) -> String {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!(
        "rgb({}, {}, {})",
        channel(color.x),
        channel(color.y),
        channel(color.z)
    )
}
