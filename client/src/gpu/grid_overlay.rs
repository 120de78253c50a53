//! Tile grid overlay drawn as thin quads

use bytemuck::{Pod, Zeroable};
use wgpu::include_wgsl;
use wgpu::util::DeviceExt;

use crate::map::grid::{GridLine, GridOverlay};

/// Grid vertex for coloured quads, position in world pixels
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GridVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

impl GridVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x4,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GridVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

pub struct GridOverlayLayer {
    render_pipeline: wgpu::RenderPipeline,

    /// Latest overlay from the engine
    overlay: Option<GridOverlay>,

    /// Cached vertex buffer (rebuilt when the overlay changes)
    vertex_buffer: Option<wgpu::Buffer>,
    vertex_count: u32,

    dirty: bool,
}

impl GridOverlayLayer {
    pub fn new(
        device: &wgpu::Device,
        texture_format: wgpu::TextureFormat,
        camera_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(include_wgsl!("../shader/grid.wgsl"));

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Grid Pipeline Layout"),
            bind_group_layouts: &[camera_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Grid Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[GridVertex::desc()],
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

        Self {
            render_pipeline,
            overlay: None,
            vertex_buffer: None,
            vertex_count: 0,
            dirty: false,
        }
    }

    pub fn set(&mut self, overlay: Option<GridOverlay>) {
        if self.overlay != overlay {
            self.overlay = overlay;
            self.dirty = true;
        }
    }

    /// Update vertex buffer if dirty
    pub fn prepare(&mut self, device: &wgpu::Device) {
        if !self.dirty {
            return;
        }

        let vertices = self.overlay.as_ref().map(overlay_vertices).unwrap_or_default();
        self.vertex_count = vertices.len() as u32;

        if !vertices.is_empty() {
            self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Grid Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }));
        } else {
            self.vertex_buffer = None;
        }

        self.dirty = false;
    }

    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>, camera: &wgpu::BindGroup) {
        if self.vertex_count == 0 {
            return;
        }

        if let Some(ref buffer) = self.vertex_buffer {
            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, camera, &[]);
            render_pass.set_vertex_buffer(0, buffer.slice(..));
            render_pass.draw(0..self.vertex_count, 0..1);
        }
    }
}

/// Two triangles per grid line
fn overlay_vertices(overlay: &GridOverlay) -> Vec<GridVertex> {
    let half = overlay.stroke_width / 2.0;
    let mut vertices = Vec::with_capacity(overlay.lines.len() * 6);

    for line in &overlay.lines {
        let [a, b, c, d] = line_corners(line, half);
        for corner in [a, b, c, a, c, d] {
            vertices.push(GridVertex {
                position: [corner.0 as f32, corner.1 as f32],
                color: overlay.color,
            });
        }
    }

    vertices
}

/// Axis-aligned rectangle around a horizontal or vertical line
fn line_corners(line: &GridLine, half: f64) -> [(f64, f64); 4] {
    let x1 = line.from.0.min(line.to.0) - half;
    let x2 = line.from.0.max(line.to.0) + half;
    let y1 = line.from.1.min(line.to.1) - half;
    let y2 = line.from.1.max(line.to.1) + half;
    [(x1, y1), (x2, y1), (x2, y2), (x1, y2)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_line_becomes_thin_quad() {
        let line = GridLine {
            from: (48.0, 0.0),
            to: (48.0, 96.0),
        };
        let corners = line_corners(&line, 0.5);
        assert_eq!(corners[0], (47.5, -0.5));
        assert_eq!(corners[2], (48.5, 96.5));
    }

    #[test]
    fn test_overlay_emits_six_vertices_per_line() {
        let overlay = GridOverlay {
            lines: vec![
                GridLine {
                    from: (0.0, 0.0),
                    to: (0.0, 24.0),
                },
                GridLine {
                    from: (0.0, 24.0),
                    to: (24.0, 24.0),
                },
            ],
            stroke_width: 1.0,
            color: [1.0, 1.0, 1.0, 0.25],
        };
        let vertices = overlay_vertices(&overlay);
        assert_eq!(vertices.len(), 12);
        assert!(vertices.iter().all(|v| v.color == [1.0, 1.0, 1.0, 0.25]));
    }
}
