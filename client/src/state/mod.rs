use std::sync::Arc;
use egui::{
    Area, Color32, Context, FullOutput, Id, Pos2, Rect, Sense, Stroke, StrokeKind, TextureHandle,
    TextureOptions, TopBottomPanel, Ui, vec2,
};
use egui_wgpu::{Renderer, RendererOptions, ScreenDescriptor};
use log::{info, warn};
use wgpu::{Backends, ExperimentalFeatures, Features, Instance, InstanceDescriptor, MemoryHints, SurfaceError, Trace};
use winit::window::Window;

use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};

use crate::config::{MINIMAP_DISPLAY_SIZE, MapConfig};
use crate::gpu::MapSurface;
use crate::input::PointerTracker;
use crate::map::cache::CacheStats;
use crate::map::loader::ChunkLoader;
use crate::map::minimap::MinimapPhase;
use crate::map::tile::LEGEND;
use crate::map::{MapEngine, MapInput};

const SWATCH_SIZE: f32 = 20.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Window, GPU and UI state around the map engine
pub struct State {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,
    resize_request: Option<PhysicalSize<u32>>,
    ui_renderer: Renderer,
    egui_ctx: Context,
    egui_state: egui_winit::State,
    egui_output: Option<FullOutput>,
    engine: MapEngine<MapSurface>,
    pointer: PointerTracker,
    show_minimap: bool,
    minimap_texture: Option<TextureHandle>,
    minimap_revision: Option<u64>,
    notice: Option<String>,
}

impl State {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let surface: wgpu::Surface<'_> = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Main Device"),
                required_features: Features::empty(),
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                experimental_features: ExperimentalFeatures::disabled(),
                memory_hints: MemoryHints::Performance,
                trace: Trace::Off,
            })
            .await?;

        let cap: wgpu::SurfaceCapabilities = surface.get_capabilities(&adapter);

        let texture_format = cap
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| cap.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no texture formats"))?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: size.width,
            height: size.height,
            present_mode: cap.present_modes[0],
            alpha_mode: cap.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let ui_renderer = Renderer::new(&device, texture_format, RendererOptions {
            msaa_samples: 0,
            depth_stencil_format: None,
            dithering: false,
            predictable_texture_filtering: false,
        });
        let egui_ctx = Context::default();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            window.as_ref(),
            egui_ctx.native_pixels_per_point(),
            window.theme(),
            None,
        );

        let map_config = MapConfig::from_env();
        let loader = build_loader(&map_config)?;
        let mut engine = MapEngine::new(map_config, loader, MapSurface::new(&device, texture_format))
            .with_viewport(size.width, size.height);
        engine.start();

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            resize_request: None,
            ui_renderer,
            egui_ctx,
            egui_state,
            egui_output: None,
            engine,
            pointer: PointerTracker::new(),
            show_minimap: true,
            minimap_texture: None,
            minimap_revision: None,
            notice: None,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            if !self.is_surface_configured {
                self.apply_size(width, height);
                self.is_surface_configured = true;
            } else {
                self.resize_request = Some(PhysicalSize::new(width, height));
            }
        }
    }

    fn apply_size(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.engine.dispatch(MapInput::Resize { width, height });
    }

    /// Let egui see the event first; returns true when egui consumed it.
    ///
    /// Button releases always reach the map so a drag that ends over a
    /// panel still finishes.
    pub fn handle_input(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(self.window.as_ref(), event);
        let release = matches!(
            event,
            WindowEvent::MouseInput {
                state: ElementState::Released,
                ..
            }
        );
        response.consumed && !release
    }

    pub fn handle_map_event(&mut self, event: &WindowEvent) {
        for input in self.pointer.handle(event) {
            self.engine.dispatch(input);
        }
    }

    pub fn toggle_minimap(&mut self) {
        self.show_minimap = !self.show_minimap;
    }

    pub fn update(&mut self) {
        self.engine.update();
        if let Some(notice) = self.engine.take_notification() {
            self.notice = Some(notice);
        }
        self.sync_minimap_texture();

        let mut actions = Vec::new();
        let mut dismiss = false;
        let pixels_per_point = self.egui_ctx.pixels_per_point();

        let input = self.egui_state.take_egui_input(self.window.as_ref());
        let output = self.egui_ctx.run(input, |ctx| {
            if self.pointer.is_dragging() {
                ctx.set_cursor_icon(egui::CursorIcon::Grabbing);
            }

            TopBottomPanel::top("toolbar").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    let status = self.engine.status();
                    let [r, g, b] = status.color();
                    ui.colored_label(Color32::from_rgb(r, g, b), status.label());
                    ui.separator();
                    palette(ui, self.engine.selected_tile().0, &mut actions);
                    ui.separator();
                    let (chunks, images) = self.engine.cache_stats();
                    ui.label(cache_label("Chunks", &chunks));
                    ui.label(cache_label("Images", &images));
                    ui.label(format!("{:.1} MiB", self.engine.image_cache_bytes() as f64 / MIB));
                    ui.label(format!("Textures {}", self.engine.surface().texture_count()));
                });
            });

            if let Some(tooltip) = self.engine.tooltip() {
                let (x, y) = tooltip.anchor;
                let pos = Pos2::new(x as f32 / pixels_per_point + 12.0, y as f32 / pixels_per_point + 12.0);
                Area::new(Id::new("tile_tooltip"))
                    .fixed_pos(pos)
                    .interactable(false)
                    .show(ctx, |ui| {
                        egui::Frame::popup(ui.style()).show(ui, |ui| {
                            for line in tooltip.lines() {
                                ui.label(line);
                            }
                        });
                    });
            }

            if self.show_minimap {
                if let Some(texture) = &self.minimap_texture {
                    egui::Window::new("Minimap")
                        .resizable(false)
                        .collapsible(true)
                        .anchor(egui::Align2::RIGHT_BOTTOM, vec2(-12.0, -12.0))
                        .show(ctx, |ui| {
                            minimap(ui, texture, &self.engine, &mut actions);
                        });
                }
            }

            if let Some(notice) = &self.notice {
                egui::Window::new("Notice")
                    .collapsible(false)
                    .resizable(false)
                    .anchor(egui::Align2::CENTER_TOP, vec2(0.0, 48.0))
                    .show(ctx, |ui| {
                        ui.label(notice);
                        if ui.button("OK").clicked() {
                            dismiss = true;
                        }
                    });
            }
        });
        self.egui_output = Some(output);

        if dismiss {
            self.notice = None;
        }
        for action in actions {
            self.engine.dispatch(action);
        }
    }

    /// Re-upload the minimap raster when the engine changed it
    fn sync_minimap_texture(&mut self) {
        let minimap = self.engine.minimap();
        if self.minimap_revision == Some(minimap.revision()) {
            return;
        }

        let size = [minimap.width() as usize, minimap.height() as usize];
        let image = egui::ColorImage::from_rgba_unmultiplied(size, minimap.image().as_raw());
        match &mut self.minimap_texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                info!("Minimap texture {}x{}", size[0], size[1]);
                self.minimap_texture = Some(self.egui_ctx.load_texture("minimap", image, TextureOptions::LINEAR));
            }
        }
        self.minimap_revision = Some(minimap.revision());
    }

    pub fn render(&mut self) -> Result<(), SurfaceError> {
        self.window.request_redraw();

        if !self.is_surface_configured {
            return Ok(());
        }

        if let Some(PhysicalSize { width, height }) = self.resize_request.take() {
            self.apply_size(width, height)
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(_) => {
                self.surface.configure(&self.device, &self.config);
                self.surface.get_current_texture()?
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        let camera = self.engine.camera().clone();
        self.engine.surface_mut().prepare(&self.device, &self.queue, &camera);

        let mut egui_frame = None;
        if let Some(output) = self.egui_output.take() {
            let FullOutput {
                platform_output,
                textures_delta,
                shapes,
                pixels_per_point,
                viewport_output
            } = output;

            for _ in viewport_output {
                warn!("Viewport change is not handled!")
            }

            self.egui_state.handle_platform_output(self.window.as_ref(), platform_output);

            for (id, delta) in &textures_delta.set {
                self.ui_renderer.update_texture(&self.device, &self.queue, *id, delta);
            }
            let descriptor = ScreenDescriptor {
                size_in_pixels: [self.config.width, self.config.height],
                pixels_per_point,
            };
            let primitives = self.egui_ctx.tessellate(shapes, pixels_per_point);
            self.ui_renderer.update_buffers(&self.device, &self.queue, &mut encoder, &primitives, &descriptor);
            egui_frame = Some((primitives, descriptor, textures_delta.free));
        }

        {
            let mut render_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: 0.01,
                                g: 0.01,
                                b: 0.02,
                                a: 1.0,
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                })
                .forget_lifetime();

            self.engine.surface().render(&mut render_pass);

            if let Some((primitives, descriptor, _)) = &egui_frame {
                self.ui_renderer.render(&mut render_pass, primitives, descriptor);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        if let Some((_, _, free)) = egui_frame {
            for id in free {
                self.ui_renderer.free_texture(&id)
            }
        }

        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn build_loader(config: &MapConfig) -> anyhow::Result<ChunkLoader> {
    use crate::map::store::{ChunkStore, HttpStore, MemoryStore};

    let store: Arc<dyn ChunkStore> = match &config.api {
        Some(api) => {
            info!("Using chunk store at {}", api.chunk_url);
            Arc::new(HttpStore::new(api.clone())?)
        }
        None => {
            info!("WORLDMAP_API_BASE not set, editing an in-memory world");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(ChunkLoader::spawn(store))
}

#[cfg(target_arch = "wasm32")]
fn build_loader(config: &MapConfig) -> anyhow::Result<ChunkLoader> {
    // Relative endpoints resolve against the page origin
    Ok(ChunkLoader::web(config.api.clone().unwrap_or_default()))
}

fn cache_label(name: &str, stats: &CacheStats) -> String {
    format!(
        "{name} {}/{} ({:.0}%) hits {:.0}% evict {}",
        stats.entries,
        stats.capacity,
        stats.usage_percent(),
        stats.hit_rate() * 100.0,
        stats.evictions
    )
}

/// One swatch per legend entry; the selected tile is outlined
fn palette(ui: &mut Ui, selected: i64, actions: &mut Vec<MapInput>) {
    for entry in LEGEND.iter() {
        let [r, g, b] = entry.rgb;
        let (rect, response) = ui.allocate_exact_size(vec2(SWATCH_SIZE, SWATCH_SIZE), Sense::click());
        let painter = ui.painter();
        painter.rect_filled(rect, 3.0, Color32::from_rgb(r, g, b));
        if entry.id.0 == selected {
            painter.rect_stroke(rect, 3.0, Stroke::new(2.0, Color32::WHITE), StrokeKind::Outside);
        }
        if response.on_hover_text(format!("{} {}", entry.name, entry.hex)).clicked() {
            actions.push(MapInput::SelectTile(entry.id));
        }
    }
}

/// Minimap image with the viewport outline; clicking or dragging recentres
fn minimap(ui: &mut Ui, texture: &TextureHandle, engine: &MapEngine<MapSurface>, actions: &mut Vec<MapInput>) {
    let size = vec2(MINIMAP_DISPLAY_SIZE, MINIMAP_DISPLAY_SIZE);
    let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());
    let painter = ui.painter_at(rect);
    painter.image(
        texture.id(),
        rect,
        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
        Color32::WHITE,
    );

    let viewport = engine.minimap_viewport();
    let outline = Rect::from_min_max(
        rect.min + vec2(viewport.x1 as f32 * rect.width(), viewport.y1 as f32 * rect.height()),
        rect.min + vec2(viewport.x2 as f32 * rect.width(), viewport.y2 as f32 * rect.height()),
    );
    painter.rect_stroke(outline, 0.0, Stroke::new(1.5, Color32::RED), StrokeKind::Middle);

    match engine.minimap().phase() {
        MinimapPhase::Unloaded | MinimapPhase::Fetching => {
            ui.label("Loading minimap...");
        }
        MinimapPhase::Building => {
            ui.label("Generating minimap...");
        }
        MinimapPhase::Failed => {
            ui.colored_label(Color32::from_rgb(0xe7, 0x4c, 0x3c), "Minimap unavailable");
        }
        MinimapPhase::Ready => {}
    }

    if response.clicked() || response.dragged() {
        if let Some(pos) = response.interact_pointer_pos() {
            actions.push(MapInput::NavigateMinimap {
                fx: ((pos.x - rect.min.x) / rect.width()) as f64,
                fy: ((pos.y - rect.min.y) / rect.height()) as f64,
            });
        }
    }
}
