//! wgpu renderer backing the render-device contract.
//!
//! Owns the device, queue, the single mesh pipeline, a dynamic-offset
//! uniform buffer, and the handle→buffer table behind [`RenderDevice`].
//! A frame is rendered by replaying a recorded [`DrawList`].

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use wgpu::util::DeviceExt;

use crate::gpu::pipeline::{self, DEPTH_FORMAT};
use crate::gpu::{DrawList, MeshHandle, RenderDevice, Vertex};

/// Maximum draws per frame; each needs a slot in the dynamic uniform
/// buffer.
const MAX_DRAWS_PER_FRAME: usize = 256;

/// WebGPU minUniformBufferOffsetAlignment is typically 256 bytes.
const UNIFORM_ALIGNMENT: usize = 256;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    // Padding to reach the 256-byte dynamic-offset alignment.
    _padding: [f32; 48],
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,

    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,

    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),

    meshes: HashMap<MeshHandle, GpuMesh>,
    next_handle: u64,
}

impl Renderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_DRAWS_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<Uniforms>() as u64
                    ),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                }),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = pipeline::create_render_pipeline(&device, &pipeline_layout, format);

        let (depth_view, depth_size) = Self::create_depth(&device, width, height);

        Self {
            device,
            queue,
            format,
            pipeline,
            uniform_buffer,
            bind_group,
            depth_view,
            depth_size,
            meshes: HashMap::new(),
            next_handle: 1,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    fn create_depth(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::TextureView, (u32, u32)) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Buffer"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (view, (width, height))
    }

    /// Replay a recorded draw list into `target`, clearing to `clear`.
    pub fn render(
        &mut self,
        target: &wgpu::TextureView,
        width: u32,
        height: u32,
        clear: Vec4,
        list: &DrawList,
    ) {
        if self.depth_size != (width, height) {
            let (view, size) = Self::create_depth(&self.device, width, height);
            self.depth_view = view;
            self.depth_size = size;
        }

        let draws = if list.items.len() > MAX_DRAWS_PER_FRAME {
            log::warn!(
                "draw list has {} items, truncating to {}",
                list.items.len(),
                MAX_DRAWS_PER_FRAME
            );
            &list.items[..MAX_DRAWS_PER_FRAME]
        } else {
            &list.items[..]
        };

        for (i, cmd) in draws.iter().enumerate() {
            let uniforms = Uniforms {
                view_proj: (cmd.proj * cmd.view).to_cols_array_2d(),
                _padding: [0.0; 48],
            };
            self.queue.write_buffer(
                &self.uniform_buffer,
                (i * UNIFORM_ALIGNMENT) as u64,
                bytemuck::bytes_of(&uniforms),
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.x as f64,
                            g: clear.y as f64,
                            b: clear.z as f64,
                            a: clear.w as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            for (i, cmd) in draws.iter().enumerate() {
                let Some(mesh) = self.meshes.get(&cmd.mesh) else {
                    continue;
                };
                pass.set_bind_group(0, &self.bind_group, &[(i * UNIFORM_ALIGNMENT) as u32]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.draw(0..mesh.vertex_count, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl RenderDevice for Renderer {
    fn upload_mesh(&mut self, vertices: &[Vertex]) -> anyhow::Result<MeshHandle> {
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        self.meshes.insert(
            handle,
            GpuMesh {
                vertex_buffer,
                vertex_count: vertices.len() as u32,
            },
        );
        Ok(handle)
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        if self.meshes.remove(&handle).is_none() {
            log::warn!("release of unknown mesh handle {handle:?}");
        }
    }
}
