use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4};
use log::info;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::common::{CameraParams, DrawItem, DrawMaterial, LightParams};
use super::shaders::{HOLOGRAM_SHADER, LINE_SHADER, LIT_SHADER};
use crate::material::HologramUniforms;
use crate::scene::Geometry;

/// GPU renderer backed by wgpu that draws the viewer's draw list.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    lit_pipeline: wgpu::RenderPipeline,
    hologram_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    mesh_cache: HashMap<u64, MeshBuffers>,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("failed to acquire GPU adapter"))?;
        info!("using GPU adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("renderer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[uniform_entry(std::mem::size_of::<GlobalUniform>())],
        });

        // Per-draw uniform layout, shared by all three pipelines
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[uniform_entry(std::mem::size_of::<ObjectConstants>())],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let builder = PipelineBuilder {
            device: &device,
            layout: &pipeline_layout,
            format: surface_format,
        };
        let lit_pipeline = builder.build(PipelineKind {
            label: "lit-pipeline",
            source: LIT_SHADER,
            topology: wgpu::PrimitiveTopology::TriangleList,
            blend: wgpu::BlendState::ALPHA_BLENDING,
            depth_write: true,
        });
        // Additive, double-sided, reads depth but never writes it
        let hologram_pipeline = builder.build(PipelineKind {
            label: "hologram-pipeline",
            source: HOLOGRAM_SHADER,
            topology: wgpu::PrimitiveTopology::TriangleList,
            blend: wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            depth_write: false,
        });
        let line_pipeline = builder.build(PipelineKind {
            label: "line-pipeline",
            source: LINE_SHADER,
            topology: wgpu::PrimitiveTopology::LineList,
            blend: wgpu::BlendState::ALPHA_BLENDING,
            depth_write: true,
        });

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            lit_pipeline,
            hologram_pipeline,
            line_pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            mesh_cache: HashMap::new(),
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Updates the camera and lighting uniforms before rendering.
    pub fn update_globals(&self, camera: &CameraParams, light: &LightParams) {
        let uniform = GlobalUniform {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            light_position: light.position.extend(1.0).into(),
            light_color: light.color.extend(light.intensity).into(),
            ambient: light.ambient.extend(1.0).into(),
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    /// Draws one frame. Draw items are expected in pass order (lit meshes,
    /// lines, holograms), which is what `collect_draws` produces.
    pub fn render(&mut self, draws: &[DrawItem]) -> Result<(), wgpu::SurfaceError> {
        self.sync_meshes(draws);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        let bind_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|draw| {
                let constants = ObjectConstants::from_draw(draw);
                let object_buffer =
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("object-uniform"),
                            contents: bytes_of(&constants),
                            usage: wgpu::BufferUsages::UNIFORM,
                        });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &self.object_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: object_buffer.as_entire_binding(),
                    }],
                    label: Some("object-bind-group"),
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.0,
                        g: 0.0,
                        b: 0.0,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_bind_group(0, &self.global_bind_group, &[]);
        for (draw, bind_group) in draws.iter().zip(&bind_groups) {
            let Some(mesh) = self
                .mesh_cache
                .get(&draw.geometry.id())
                .filter(|mesh| mesh.index_count > 0)
            else {
                continue;
            };
            let pipeline = match draw.material {
                DrawMaterial::Standard(_) => &self.lit_pipeline,
                DrawMaterial::Lines(_) => &self.line_pipeline,
                DrawMaterial::Hologram(_) => &self.hologram_pipeline,
            };
            pass.set_pipeline(pipeline);
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, bind_group, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Uploads geometry seen for the first time and drops buffers whose
    /// geometry is no longer drawn.
    fn sync_meshes(&mut self, draws: &[DrawItem]) {
        let live: HashSet<u64> = draws.iter().map(|draw| draw.geometry.id()).collect();
        self.mesh_cache.retain(|id, _| live.contains(id));
        for draw in draws {
            if !self.mesh_cache.contains_key(&draw.geometry.id()) {
                let buffers = MeshBuffers::from_geometry(&self.device, &draw.geometry);
                self.mesh_cache.insert(draw.geometry.id(), buffers);
            }
        }
    }
}

fn uniform_entry(size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

struct PipelineKind {
    label: &'static str,
    source: &'static str,
    topology: wgpu::PrimitiveTopology,
    blend: wgpu::BlendState,
    depth_write: bool,
}

struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    layout: &'a wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
}

impl PipelineBuilder<'_> {
    fn build(&self, kind: PipelineKind) -> wgpu::RenderPipeline {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kind.label),
                source: wgpu::ShaderSource::Wgsl(kind.source.into()),
            });
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(kind.label),
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: (Geometry::STRIDE * std::mem::size_of::<f32>()) as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                                shader_location: 0,
                            },
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: (3 * std::mem::size_of::<f32>()) as u64,
                                shader_location: 1,
                            },
                        ],
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: kind.topology,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthBuffer::FORMAT,
                    depth_write_enabled: kind.depth_write,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: Some(kind.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_geometry(device: &wgpu::Device, geometry: &Geometry) -> Self {
        let label = &geometry.label;
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: geometry.indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light_position: [f32; 4],
    light_color: [f32; 4],
    ambient: [f32; 4],
}

/// Per-draw block. Lit and line draws read `color`/`emissive` from the
/// first two rows of `extra`; hologram draws read all four as
/// [`HologramUniforms`].
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    extra: [[f32; 4]; 4],
}

impl ObjectConstants {
    fn from_draw(draw: &DrawItem) -> Self {
        let model: Mat4 = draw.model;
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let extra = match &draw.material {
            DrawMaterial::Standard(material) => [
                material.color.extend(material.opacity).into(),
                material.emissive.extend(material.metalness).into(),
                [0.0; 4],
                [0.0; 4],
            ],
            DrawMaterial::Lines(color) => [color.extend(1.0).into(), [0.0; 4], [0.0; 4], [0.0; 4]],
            DrawMaterial::Hologram(uniforms) => hologram_rows(uniforms),
        };
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            extra,
        }
    }
}

fn hologram_rows(uniforms: &HologramUniforms) -> [[f32; 4]; 4] {
    [uniforms.color, uniforms.rim, uniforms.effects, uniforms.time]
}
