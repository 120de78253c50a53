//! Chunk images as textured quads in world space

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::map::chunk::ChunkCoord;
use crate::map::renderer::ChunkImage;

/// Vertex for chunk rendering, position in world pixels
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ChunkVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl ChunkVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ChunkVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Indices for a quad (2 triangles)
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// GPU copy of one chunk image
struct ChunkTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
}

pub struct ChunkLayer {
    render_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    index_buffer: wgpu::Buffer,
    textures: HashMap<ChunkCoord, ChunkTexture>,
    /// Images waiting for the next `prepare`, latest per chunk
    uploads: HashMap<ChunkCoord, ChunkImage>,
    removals: Vec<ChunkCoord>,
}

impl ChunkLayer {
    pub fn new(
        device: &wgpu::Device,
        texture_format: wgpu::TextureFormat,
        camera_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Chunk Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/tile.wgsl").into()),
        });

        // Bind group layout for texture + sampler
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Chunk Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Chunk Pipeline Layout"),
            bind_group_layouts: &[camera_layout, &bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Chunk Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[ChunkVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Tiles are flat squares, keep their edges hard when magnified
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Chunk Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Chunk Index Buffer"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            render_pipeline,
            bind_group_layout,
            sampler,
            index_buffer,
            textures: HashMap::new(),
            uploads: HashMap::new(),
            removals: Vec::new(),
        }
    }

    pub fn queue_upload(&mut self, image: &ChunkImage) {
        self.removals.retain(|coord| *coord != image.coord);
        self.uploads.insert(image.coord, image.clone());
    }

    pub fn queue_removal(&mut self, coord: ChunkCoord) {
        self.uploads.remove(&coord);
        self.removals.push(coord);
    }

    /// Apply queued removals and upload queued images
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        for coord in self.removals.drain(..) {
            self.textures.remove(&coord);
        }
        for (coord, image) in std::mem::take(&mut self.uploads) {
            let texture = self.create_texture(device, queue, &image);
            self.textures.insert(coord, texture);
        }
    }

    fn create_texture(&self, device: &wgpu::Device, queue: &wgpu::Queue, image: &ChunkImage) -> ChunkTexture {
        let (width, height) = image.image.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Chunk Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Chunk Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let vertices = chunk_quad(image.origin, width as f64, height as f64);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Chunk Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        ChunkTexture {
            _texture: texture,
            bind_group,
            vertex_buffer,
        }
    }

    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>, camera: &wgpu::BindGroup) {
        if self.textures.is_empty() {
            return;
        }
        render_pass.set_pipeline(&self.render_pipeline);
        render_pass.set_bind_group(0, camera, &[]);
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);

        for texture in self.textures.values() {
            render_pass.set_bind_group(1, &texture.bind_group, &[]);
            render_pass.set_vertex_buffer(0, texture.vertex_buffer.slice(..));
            render_pass.draw_indexed(0..6, 0, 0..1);
        }
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

/// Quad covering a chunk image at its world origin
fn chunk_quad(origin: (f64, f64), width: f64, height: f64) -> [ChunkVertex; 4] {
    let (x, y) = (origin.0 as f32, origin.1 as f32);
    let (w, h) = (width as f32, height as f32);
    [
        ChunkVertex {
            position: [x, y],
            tex_coords: [0.0, 0.0],
        },
        ChunkVertex {
            position: [x + w, y],
            tex_coords: [1.0, 0.0],
        },
        ChunkVertex {
            position: [x + w, y + h],
            tex_coords: [1.0, 1.0],
        },
        ChunkVertex {
            position: [x, y + h],
            tex_coords: [0.0, 1.0],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_quad_spans_image() {
        let quad = chunk_quad((384.0, 768.0), 384.0, 384.0);
        assert_eq!(quad[0].position, [384.0, 768.0]);
        assert_eq!(quad[2].position, [768.0, 1152.0]);
        assert_eq!(quad[2].tex_coords, [1.0, 1.0]);
    }
}
