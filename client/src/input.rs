//! Pointer and modifier tracking that turns winit events into map input

use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::map::MapInput;

/// Pointer travel (screen pixels) before a press becomes a drag
pub const DRAG_THRESHOLD: f64 = 4.0;

/// Pixels per wheel line when the platform reports line deltas
const LINE_HEIGHT: f64 = 40.0;

#[derive(Debug, Default)]
pub struct PointerTracker {
    position: Option<(f64, f64)>,
    pressed_at: Option<(f64, f64)>,
    dragging: bool,
    alt: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one window event; most events map to nothing
    pub fn handle(&mut self, event: &WindowEvent) -> Vec<MapInput> {
        match event {
            WindowEvent::CursorMoved { position, .. } => self.moved(position.x, position.y),
            WindowEvent::CursorLeft { .. } => vec![self.left()],
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.button(*state == ElementState::Pressed).into_iter().collect(),
            WindowEvent::MouseWheel { delta, .. } => {
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y as f64 * LINE_HEIGHT,
                    MouseScrollDelta::PixelDelta(position) => position.y,
                };
                // winit reports scrolling down as negative
                self.wheel(-delta_y).into_iter().collect()
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers(modifiers.state().alt_key()).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn moved(&mut self, x: f64, y: f64) -> Vec<MapInput> {
        let previous = self.position.replace((x, y));

        let Some(pressed) = self.pressed_at else {
            return vec![MapInput::Hover {
                x,
                y,
                modifier: self.alt,
            }];
        };

        if self.dragging {
            let (px, py) = previous.unwrap_or(pressed);
            return vec![MapInput::PanBy { dx: x - px, dy: y - py }];
        }

        let (dx, dy) = (x - pressed.0, y - pressed.1);
        if dx.hypot(dy) > DRAG_THRESHOLD {
            self.dragging = true;
            vec![MapInput::PanBy { dx, dy }]
        } else {
            Vec::new()
        }
    }

    /// A release that never became a drag is a click at the press position
    pub fn button(&mut self, pressed: bool) -> Option<MapInput> {
        if pressed {
            self.pressed_at = self.position;
            self.dragging = false;
            return None;
        }

        let pressed_at = self.pressed_at.take();
        if std::mem::take(&mut self.dragging) {
            Some(MapInput::PanEnd)
        } else {
            pressed_at.map(|(x, y)| MapInput::Click { x, y })
        }
    }

    pub fn wheel(&mut self, delta_y: f64) -> Option<MapInput> {
        if delta_y == 0.0 {
            return None;
        }
        let (x, y) = self.position?;
        Some(MapInput::Zoom { delta_y, x, y })
    }

    pub fn modifiers(&mut self, alt: bool) -> Option<MapInput> {
        if alt == self.alt {
            return None;
        }
        self.alt = alt;
        if !alt {
            return Some(MapInput::ModifierReleased);
        }
        match (self.position, self.pressed_at) {
            (Some((x, y)), None) => Some(MapInput::Hover { x, y, modifier: true }),
            _ => None,
        }
    }

    pub fn left(&mut self) -> MapInput {
        self.position = None;
        MapInput::PointerLeft
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }
}
