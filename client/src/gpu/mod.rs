//! wgpu drawing surface for the map engine

mod chunk_layer;
mod grid_overlay;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::map::DrawSurface;
use crate::map::camera::MapCamera;
use crate::map::chunk::ChunkCoord;
use crate::map::grid::GridOverlay;
use crate::map::renderer::ChunkImage;

pub use chunk_layer::ChunkLayer;
pub use grid_overlay::GridOverlayLayer;

/// World-to-screen transform shared by every map pipeline
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct CameraUniform {
    offset: [f32; 2],
    scale: f32,
    _pad: f32,
    viewport: [f32; 2],
    _pad2: [f32; 2],
}

impl CameraUniform {
    pub fn from_camera(camera: &MapCamera) -> Self {
        Self {
            offset: [camera.offset.0 as f32, camera.offset.1 as f32],
            scale: camera.scale as f32,
            _pad: 0.0,
            viewport: [
                camera.viewport_width.max(1) as f32,
                camera.viewport_height.max(1) as f32,
            ],
            _pad2: [0.0; 2],
        }
    }
}

pub struct CameraBinding {
    buffer: wgpu::Buffer,
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl CameraBinding {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Map Camera Buffer"),
            contents: bytemuck::bytes_of(&CameraUniform::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Map Camera Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Map Camera Bind Group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            buffer,
            layout,
            bind_group,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, camera: &MapCamera) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&CameraUniform::from_camera(camera)));
    }
}

/// Chunk textures plus grid overlay, fed by the engine through
/// [`DrawSurface`] and uploaded in [`MapSurface::prepare`]
pub struct MapSurface {
    camera: CameraBinding,
    chunks: ChunkLayer,
    grid: GridOverlayLayer,
    /// Set by `batch_draw`; queued changes wait for it
    batch_ready: bool,
}

impl MapSurface {
    pub fn new(device: &wgpu::Device, texture_format: wgpu::TextureFormat) -> Self {
        let camera = CameraBinding::new(device);
        let chunks = ChunkLayer::new(device, texture_format, &camera.layout);
        let grid = GridOverlayLayer::new(device, texture_format, &camera.layout);
        Self {
            camera,
            chunks,
            grid,
            batch_ready: false,
        }
    }

    /// Upload the last completed batch and the current camera
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, camera: &MapCamera) {
        if std::mem::take(&mut self.batch_ready) {
            self.chunks.prepare(device, queue);
            self.grid.prepare(device);
        }
        self.camera.update(queue, camera);
    }

    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.chunks.render(render_pass, &self.camera.bind_group);
        self.grid.render(render_pass, &self.camera.bind_group);
    }

    pub fn texture_count(&self) -> usize {
        self.chunks.texture_count()
    }
}

impl DrawSurface for MapSurface {
    fn add_image(&mut self, image: &ChunkImage) {
        self.chunks.queue_upload(image);
    }

    fn remove_image(&mut self, coord: ChunkCoord) {
        self.chunks.queue_removal(coord);
    }

    fn set_grid(&mut self, grid: Option<GridOverlay>) {
        self.grid.set(grid);
    }

    fn batch_draw(&mut self) {
        self.batch_ready = true;
    }
}
