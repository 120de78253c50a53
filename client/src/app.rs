//! winit shell around the map: window creation, event routing, key bindings

use std::sync::Arc;

use log::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::ActiveEventLoop;
#[cfg(target_arch = "wasm32")]
use winit::event_loop::{EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::state::State;

const WINDOW_TITLE: &str = "World Map";

#[cfg(target_arch = "wasm32")]
const CANVAS_ID: &str = "canvas";

/// Keyboard shortcuts of the map window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyCommand {
    Quit,
    ToggleMinimap,
}

impl KeyCommand {
    /// Only fresh presses count; held keys do not toggle repeatedly
    fn from_key(key: PhysicalKey, state: ElementState, repeat: bool) -> Option<Self> {
        if state != ElementState::Pressed || repeat {
            return None;
        }
        match key {
            PhysicalKey::Code(KeyCode::Escape) => Some(Self::Quit),
            PhysicalKey::Code(KeyCode::KeyM) => Some(Self::ToggleMinimap),
            _ => None,
        }
    }
}

/// Owns the map [`State`] once the window and GPU are ready.
/// On the web the state is built asynchronously and delivered as a user event.
pub struct MapApp {
    #[cfg(target_arch = "wasm32")]
    proxy: Option<EventLoopProxy<State>>,
    state: Option<State>,
}

impl MapApp {
    pub fn new(#[cfg(target_arch = "wasm32")] event_loop: &EventLoop<State>) -> Self {
        Self {
            #[cfg(target_arch = "wasm32")]
            proxy: Some(event_loop.create_proxy()),
            state: None,
        }
    }

    fn window_attributes() -> WindowAttributes {
        let attributes = Window::default_attributes().with_title(WINDOW_TITLE);

        #[cfg(target_arch = "wasm32")]
        let attributes = {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas = wgpu::web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID))
                .map(|element| element.unchecked_into::<wgpu::web_sys::HtmlCanvasElement>());
            if canvas.is_none() {
                error!("No #{CANVAS_ID} element, letting winit create one");
            }
            attributes.with_canvas(canvas)
        };

        attributes
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn install_state(&mut self, event_loop: &ActiveEventLoop, window: Arc<Window>) {
        match pollster::block_on(State::new(window)) {
            Ok(state) => {
                info!("Map window ready");
                self.state = Some(state);
            }
            Err(e) => {
                error!("Failed to initialise renderer: {e:#}");
                event_loop.exit();
            }
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn install_state(&mut self, _event_loop: &ActiveEventLoop, window: Arc<Window>) {
        let Some(proxy) = self.proxy.take() else {
            return;
        };
        wasm_bindgen_futures::spawn_local(async move {
            match State::new(window).await {
                Ok(state) => {
                    if proxy.send_event(state).is_err() {
                        error!("Event loop closed before the map was ready");
                    }
                }
                Err(e) => error!("Failed to initialise renderer: {e:#}"),
            }
        });
    }
}

impl ApplicationHandler<State> for MapApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match event_loop.create_window(Self::window_attributes()) {
            Ok(window) => self.install_state(event_loop, Arc::new(window)),
            Err(e) => {
                error!("Failed to create window: {e}");
                event_loop.exit();
            }
        }
    }

    #[allow(unused_mut)]
    fn user_event(&mut self, _event_loop: &ActiveEventLoop, mut state: State) {
        #[cfg(target_arch = "wasm32")]
        {
            let size = state.window.inner_size();
            state.resize(size.width, size.height);
            state.window.request_redraw();
        }
        info!("Map canvas ready");
        self.state = Some(state);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        // egui gets first pick; the map only sees what the UI left alone
        if state.handle_input(&event) {
            return;
        }
        state.handle_map_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => redraw(state),
            WindowEvent::KeyboardInput { event: key, .. } => {
                match KeyCommand::from_key(key.physical_key, key.state, key.repeat) {
                    Some(KeyCommand::Quit) => event_loop.exit(),
                    Some(KeyCommand::ToggleMinimap) => state.toggle_minimap(),
                    None => {}
                }
            }
            _ => {}
        }
    }
}

fn redraw(state: &mut State) {
    state.update();
    match state.render() {
        Ok(()) => {}
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            let (width, height) = (state.config.width, state.config.height);
            state.resize(width, height);
        }
        Err(e) => error!("Failed to render frame: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_commands_fire_on_fresh_press() {
        let escape = PhysicalKey::Code(KeyCode::Escape);
        let m = PhysicalKey::Code(KeyCode::KeyM);
        assert_eq!(
            KeyCommand::from_key(escape, ElementState::Pressed, false),
            Some(KeyCommand::Quit)
        );
        assert_eq!(
            KeyCommand::from_key(m, ElementState::Pressed, false),
            Some(KeyCommand::ToggleMinimap)
        );
        assert_eq!(KeyCommand::from_key(m, ElementState::Pressed, true), None);
        assert_eq!(KeyCommand::from_key(m, ElementState::Released, false), None);
        assert_eq!(
            KeyCommand::from_key(PhysicalKey::Code(KeyCode::KeyQ), ElementState::Pressed, false),
            None
        );
    }
}
