//! wgpu render backend
//!
//! Owns the GPU device, the per-eye offscreen targets and camera textures,
//! and the desktop mirror that shows both eyes side by side through a lens
//! distortion pass.

use std::sync::Arc;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use glam::UVec2;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, CommandBuffer, CommandEncoder, Device, DeviceDescriptor,
    Instance, InstanceDescriptor, Queue, RenderPipeline, Sampler, Surface, SurfaceConfiguration,
    TextureUsages,
};
use winit::window::Window;

use crate::backend::{EyeTarget, RenderBackend, ScreenDraw, TargetId};
use crate::camera::{CameraImage, PixelFormat};
use crate::error::{Error, Result};
use crate::pose::Eye;
use crate::screen::ScreenMesh;
use crate::vertex::Vertex;

const EYE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// Lens distortion coefficients of the mirror pass.
const K1: f32 = 0.25;
const K2: f32 = 0.15;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ScreenUniforms {
    view_proj: [[f32; 4]; 4],
    params: [f32; 4], // x = has camera image, y = time
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct DistortionUniforms {
    lens_radius: f32,
    lens_center_offset: f32,
    scale_factor: f32,
    padding: f32,
}

impl DistortionUniforms {
    fn new(lens_radius: f32, lens_center_offset: f32) -> Self {
        // Shrink the image so the edge of the lens circle stays in view.
        let r2 = lens_radius.min(1.0).powi(2);
        let distortion_at_edge = 1.0 + K1 * r2 + K2 * r2 * r2;
        Self {
            lens_radius,
            lens_center_offset,
            scale_factor: 1.0 / distortion_at_edge,
            padding: 0.0,
        }
    }
}

/// Offscreen color and depth target of one eye.
pub struct EyeTexture {
    id: TargetId,
    eye: Eye,
    size: UVec2,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    uniform_buffer: Buffer,
    uniform_bind_group: BindGroup,
    mirror_bind_group: BindGroup,
}

impl EyeTarget for EyeTexture {
    fn id(&self) -> TargetId {
        self.id
    }

    fn size(&self) -> UVec2 {
        self.size
    }
}

impl Drop for EyeTexture {
    fn drop(&mut self) {
        debug!("Released {} eye target {}", self.eye.name(), self.id);
    }
}

/// Camera texture of one eye. Starts as a 1x1 placeholder.
struct CameraSlot {
    texture: wgpu::Texture,
    bind_group: BindGroup,
    format: PixelFormat,
    has_image: bool,
}

struct ScreenBuffers {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
}

pub struct WgpuBackend {
    window: Arc<Window>,
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,

    // Screen
    screen_pipeline: RenderPipeline,
    screen_uniform_layout: BindGroupLayout,
    screen: Option<ScreenBuffers>,

    // Camera textures, indexed by eye
    texture_layout: BindGroupLayout,
    sampler: Sampler,
    cameras: [CameraSlot; 2],
    // Last oversized image per eye, so the warning is logged once.
    rejected_camera_sizes: [Option<UVec2>; 2],

    // Mirror (distortion)
    mirror_pipeline: RenderPipeline,
    mirror_layout: BindGroupLayout,
    distortion_buffer: Buffer,

    encoder: Option<CommandEncoder>,
    pending: Vec<CommandBuffer>,
    next_target_id: TargetId,
    start_time: Instant,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = Instance::new(&InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| Error::Graphics(format!("cannot create surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::DeviceUnavailable("no suitable GPU adapter".into()))?;
        info!("GPU adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor::default(), None)
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("cannot create GPU device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| Error::Graphics("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let screen_uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Screen Uniform Layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT)],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Texture Layout"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });

        let screen_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Screen Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/screen.wgsl").into()),
        });

        let screen_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Screen Pipeline Layout"),
            bind_group_layouts: &[&screen_uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let screen_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Screen Pipeline"),
            layout: Some(&screen_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &screen_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &screen_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: EYE_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // The screen is seen from inside the cylinder.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let cameras = [
            CameraSlot::placeholder(&device, &texture_layout, &sampler, Eye::Left),
            CameraSlot::placeholder(&device, &texture_layout, &sampler, Eye::Right),
        ];

        // --- Mirror Pipeline Setup ---

        let distortion_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Distortion Buffer"),
            contents: bytemuck::bytes_of(&DistortionUniforms::new(1.0, 0.0)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let mirror_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mirror Bind Group Layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let mirror_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mirror Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mirror.wgsl").into()),
        });

        let mirror_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mirror Pipeline Layout"),
            bind_group_layouts: &[&mirror_layout],
            push_constant_ranges: &[],
        });

        let mirror_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mirror Pipeline"),
            layout: Some(&mirror_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &mirror_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &mirror_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        info!(
            "Renderer ready: mirror {}x{} ({:?})",
            config.width, config.height, surface_format
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            screen_pipeline,
            screen_uniform_layout,
            screen: None,
            texture_layout,
            sampler,
            cameras,
            rejected_camera_sizes: [None; 2],
            mirror_pipeline,
            mirror_layout,
            distortion_buffer,
            encoder: None,
            pending: Vec::new(),
            next_target_id: 0,
            start_time: Instant::now(),
        })
    }

    /// Sets the lens parameters of the mirror pass.
    pub fn set_distortion(&mut self, lens_radius: f32, lens_center_offset: f32) {
        let uniforms = DistortionUniforms::new(lens_radius, lens_center_offset);
        self.queue
            .write_buffer(&self.distortion_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    fn resize_if_needed(&mut self) {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return;
        }
        if size.width != self.config.width || size.height != self.config.height {
            self.config.width = size.width;
            self.config.height = size.height;
            self.surface.configure(&self.device, &self.config);
            debug!("Mirror resized to {}x{}", size.width, size.height);
        }
    }
}

impl CameraSlot {
    fn placeholder(device: &Device, layout: &BindGroupLayout, sampler: &Sampler, eye: Eye) -> Self {
        let mut slot = Self::with_texture(device, layout, sampler, eye, UVec2::ONE, PixelFormat::Rgba8);
        slot.has_image = false;
        slot
    }

    fn with_texture(
        device: &Device,
        layout: &BindGroupLayout,
        sampler: &Sampler,
        eye: Eye,
        size: UVec2,
        format: PixelFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(match eye {
                Eye::Left => "Left Camera Texture",
                Eye::Right => "Right Camera Texture",
            }),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: camera_texture_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
            ],
        });
        Self {
            texture,
            bind_group,
            format,
            has_image: true,
        }
    }

    fn matches(&self, image: &CameraImage<'_>) -> bool {
        let size = self.texture.size();
        self.has_image && self.format == image.format && size.width == image.width && size.height == image.height
    }
}

impl RenderBackend for WgpuBackend {
    type Target = EyeTexture;

    fn create_eye_target(&mut self, eye: Eye, size: UVec2) -> Result<EyeTexture> {
        let max = self.device.limits().max_texture_dimension_2d;
        if !fits_texture_limit(size, max) {
            return Err(Error::Graphics(format!(
                "cannot create {}x{} {} eye target (limit {max})",
                size.x,
                size.y,
                eye.name()
            )));
        }

        let extent = wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        };
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Eye Color Target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: EYE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Eye Depth Target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Screen Uniform Buffer"),
            size: std::mem::size_of::<ScreenUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Screen Uniform Bind Group"),
            layout: &self.screen_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let mirror_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mirror Bind Group"),
            layout: &self.mirror_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&color_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: self.distortion_buffer.as_entire_binding() },
            ],
        });

        let id = self.next_target_id;
        self.next_target_id += 1;
        info!("Created {} eye target {} ({}x{})", eye.name(), id, size.x, size.y);

        Ok(EyeTexture {
            id,
            eye,
            size,
            color_view,
            depth_view,
            uniform_buffer,
            uniform_bind_group,
            mirror_bind_group,
        })
    }

    fn load_screen(&mut self, mesh: &ScreenMesh) -> Result<()> {
        let indices = mesh.triangle_list();
        if indices.is_empty() {
            return Err(Error::Graphics("screen mesh has no triangles".into()));
        }
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Screen Vertex Buffer"),
            contents: bytemuck::cast_slice(mesh.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Screen Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.screen = Some(ScreenBuffers {
            vertices,
            indices: index_buffer,
            index_count: indices.len() as u32,
        });
        Ok(())
    }

    fn bind_and_clear(&mut self, target: &mut EyeTexture) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Eye Encoder"),
        });
        {
            let _clear_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Eye Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        if self.encoder.replace(encoder).is_some() {
            warn!("Eye target {} bound while another target was still bound", target.id);
        }
    }

    fn upload_camera_image(&mut self, eye: Eye, image: &CameraImage<'_>) {
        let size = UVec2::new(image.width, image.height);
        let max = self.device.limits().max_texture_dimension_2d;
        if !fits_texture_limit(size, max) {
            let rejected = &mut self.rejected_camera_sizes[eye.index()];
            if *rejected != Some(size) {
                warn!(
                    "{} camera image {}x{} exceeds the texture limit {max}, keeping the previous image",
                    eye.name(),
                    size.x,
                    size.y
                );
                *rejected = Some(size);
            }
            return;
        }
        self.rejected_camera_sizes[eye.index()] = None;

        let slot = &mut self.cameras[eye.index()];
        if !slot.matches(image) {
            *slot = CameraSlot::with_texture(&self.device, &self.texture_layout, &self.sampler, eye, size, image.format);
            debug!("{} camera texture is now {}x{} {:?}", eye.name(), image.width, image.height, image.format);
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.bytes_per_row()),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn draw_screen(&mut self, target: &mut EyeTexture, eye: Eye, draw: &ScreenDraw) {
        let Some(screen) = self.screen.as_ref() else {
            warn!("draw_screen called before the screen mesh was loaded");
            return;
        };
        let Some(encoder) = self.encoder.as_mut() else {
            warn!("draw_screen called on unbound eye target {}", target.id);
            return;
        };
        let slot = &self.cameras[eye.index()];

        let uniforms = ScreenUniforms {
            view_proj: draw.view_projection().to_cols_array_2d(),
            params: [
                if slot.has_image { 1.0 } else { 0.0 },
                self.start_time.elapsed().as_secs_f32(),
                0.0,
                0.0,
            ],
        };
        self.queue
            .write_buffer(&target.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Screen Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_viewport(0.0, 0.0, target.size.x as f32, target.size.y as f32, 0.0, 1.0);
        render_pass.set_pipeline(&self.screen_pipeline);
        render_pass.set_bind_group(0, &target.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &slot.bind_group, &[]);
        render_pass.set_vertex_buffer(0, screen.vertices.slice(..));
        render_pass.set_index_buffer(screen.indices.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..screen.index_count, 0, 0..1);
    }

    fn unbind(&mut self, target: &mut EyeTexture) {
        match self.encoder.take() {
            Some(encoder) => self.pending.push(encoder.finish()),
            None => warn!("Eye target {} released without being bound", target.id),
        }
    }

    fn commit(&mut self, _target: &mut EyeTexture) {
        if !self.pending.is_empty() {
            self.queue.submit(self.pending.drain(..));
        }
    }

    fn present_mirror(&mut self, targets: &[EyeTexture; 2]) {
        self.resize_if_needed();

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                debug!("Mirror frame skipped: {e}");
                self.surface.configure(&self.device, &self.config);
                return;
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Mirror Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mirror Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.mirror_pipeline);

            let half_width = self.config.width as f32 / 2.0;
            let height = self.config.height as f32;
            for (eye, target) in Eye::ALL.iter().zip(targets) {
                let x = eye.index() as f32 * half_width;
                render_pass.set_viewport(x, 0.0, half_width, height, 0.0, 1.0);
                render_pass.set_bind_group(0, &target.mirror_bind_group, &[]);
                render_pass.draw(0..6, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

/// Whether a 2D texture of `size` can be created on a device whose largest
/// texture side is `max_dimension`.
fn fits_texture_limit(size: UVec2, max_dimension: u32) -> bool {
    size.x > 0 && size.y > 0 && size.x <= max_dimension && size.y <= max_dimension
}

fn camera_texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8UnormSrgb,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<ScreenUniforms>(), 80);
        assert_eq!(std::mem::size_of::<DistortionUniforms>() % 16, 0);
    }

    #[test]
    fn test_distortion_scale_keeps_lens_edge_in_view() {
        let full = DistortionUniforms::new(1.0, 0.0);
        assert!((full.scale_factor - 1.0 / 1.4).abs() < 1e-6);
        // Radii past the lens edge do not shrink the image further.
        assert_eq!(DistortionUniforms::new(1.5, 0.0).scale_factor, full.scale_factor);
        assert_eq!(DistortionUniforms::new(0.0, 0.0).scale_factor, 1.0);
    }

    #[test]
    fn test_configured_lens_shrinks_less_for_small_radius() {
        let hmd = crate::config::AppConfig::from_toml_str("[hmd]\nlens_radius = 0.5\nlens_center_offset = 0.05\n")
            .unwrap()
            .hmd;
        let lens = DistortionUniforms::new(hmd.lens_radius, hmd.lens_center_offset);
        assert_eq!(lens.lens_radius, 0.5);
        assert_eq!(lens.lens_center_offset, 0.05);
        let edge = 1.0 + K1 * 0.25 + K2 * 0.25 * 0.25;
        assert!((lens.scale_factor - 1.0 / edge).abs() < 1e-6);
        assert!(lens.scale_factor > DistortionUniforms::new(1.0, 0.0).scale_factor);
    }

    #[test]
    fn test_texture_limit_rejects_oversized_camera_halves() {
        let max = wgpu::Limits::default().max_texture_dimension_2d;
        assert!(fits_texture_limit(UVec2::new(960, 950), max));
        assert!(fits_texture_limit(UVec2::new(max, max), max));
        // One half of a 20000x4000 side-by-side photo.
        assert!(!fits_texture_limit(UVec2::new(10000, 4000), max));
        assert!(!fits_texture_limit(UVec2::new(640, max + 1), max));
        assert!(!fits_texture_limit(UVec2::new(0, 480), max));
    }

    #[test]
    fn test_camera_formats_keep_channel_order() {
        assert_eq!(camera_texture_format(PixelFormat::Bgra8), wgpu::TextureFormat::Bgra8UnormSrgb);
        assert_eq!(camera_texture_format(PixelFormat::Rgba8), wgpu::TextureFormat::Rgba8UnormSrgb);
    }
}
