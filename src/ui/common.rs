//! Overlay drawing helpers and the per-frame view of the session
//!
//! [`OverlayView`] is copied out of the session under the lock; all painting
//! works on that copy so the lock is never held while egui tessellates.

use crate::controller::detector::ControllerFamily;
use crate::controller::mapping::{LogicalButton, LANE_ORDER};
use crate::controller::session::StreamSession;
use crate::notes::{LaneLayout, Note};
use eframe::egui::{
    pos2, vec2, Align2, Color32, FontId, Painter, Pos2, Rect, Shape, Stroke, StrokeKind,
};

/// Overlay palette
pub struct UiColors;

impl UiColors {
    pub const BACKGROUND: Color32 = Color32::from_rgb(20, 20, 30);

    pub const LANE_BG: Color32 = Color32::from_rgb(40, 40, 50);

    /// Lane and button cap outlines, also the idle cap fill
    pub const LANE_BORDER: Color32 = Color32::from_rgb(60, 60, 70);

    pub const TEXT: Color32 = Color32::WHITE;

    pub const STATUS_OK: Color32 = Color32::from_rgb(0, 255, 0);

    pub const STATUS_MISSING: Color32 = Color32::from_rgb(255, 100, 100);
}

/// Notes taller than this get a glow outline
pub const GLOW_THRESHOLD: f32 = 50.0;

pub fn button_color(button: LogicalButton) -> Color32 {
    let (r, g, b) = button.color();
    Color32::from_rgb(r, g, b)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDevice {
    pub name: String,
    pub family: ControllerFamily,
    pub hat_only_dpad: bool,
}

/// Everything one frame needs from the session
#[derive(Debug, Clone)]
pub struct OverlayView {
    pub layout: LaneLayout,
    pub notes: Vec<Note>,
    pub pressed: Vec<LogicalButton>,
    pub device: Option<ActiveDevice>,
    pub total_presses: u64,
}

impl OverlayView {
    pub fn capture(session: &StreamSession) -> Self {
        Self {
            layout: session.layout(),
            notes: session.notes().notes().to_vec(),
            pressed: session.store().pressed(),
            device: session.profile().map(|profile| ActiveDevice {
                name: profile.name.clone(),
                family: profile.family,
                hat_only_dpad: profile.hat_only_dpad,
            }),
            total_presses: session.store().total_presses(),
        }
    }

    pub fn is_pressed(&self, button: LogicalButton) -> bool {
        self.pressed.contains(&button)
    }
}

/// Rect of the button cap under `lane`
pub fn button_rect(layout: &LaneLayout, lane: usize, origin: Pos2, button_height: f32) -> Rect {
    Rect::from_min_size(
        origin + vec2(layout.lane_x(lane) + 5.0, layout.lane_height),
        vec2(layout.lane_width - 10.0, button_height),
    )
}

/// Arrow glyph for a d-pad cap, `None` for other buttons
pub fn triangle_points(rect: Rect, button: LogicalButton) -> Option<[Pos2; 3]> {
    let c = rect.center();
    let size = (rect.width().min(rect.height()) / 4.0).floor();
    let half = (size / 2.0).floor();

    let points = match button {
        LogicalButton::DPadUp => [
            pos2(c.x, c.y - size),
            pos2(c.x - size, c.y + half),
            pos2(c.x + size, c.y + half),
        ],
        LogicalButton::DPadDown => [
            pos2(c.x, c.y + size),
            pos2(c.x - size, c.y - half),
            pos2(c.x + size, c.y - half),
        ],
        LogicalButton::DPadLeft => [
            pos2(c.x - size, c.y),
            pos2(c.x + half, c.y - size),
            pos2(c.x + half, c.y + size),
        ],
        LogicalButton::DPadRight => [
            pos2(c.x + size, c.y),
            pos2(c.x - half, c.y - size),
            pos2(c.x - half, c.y + size),
        ],
        _ => return None,
    };
    Some(points)
}

pub fn draw_lanes(painter: &Painter, origin: Pos2, view: &OverlayView, button_height: f32) {
    let layout = &view.layout;

    for (lane, button) in LANE_ORDER.iter().enumerate() {
        let lane_rect = Rect::from_min_size(
            origin + vec2(layout.lane_x(lane), -10.0),
            vec2(layout.lane_width, layout.lane_height),
        );
        painter.rect_filled(lane_rect, 0.0, UiColors::LANE_BG);
        painter.rect_stroke(
            lane_rect,
            0.0,
            Stroke::new(2.0, UiColors::LANE_BORDER),
            StrokeKind::Inside,
        );

        let pressed = view.is_pressed(*button);
        let cap = button_rect(layout, lane, origin, button_height);
        let fill = if pressed {
            button_color(*button)
        } else {
            UiColors::LANE_BORDER
        };
        painter.rect_filled(cap, 0.0, fill);
        painter.rect_stroke(
            cap,
            0.0,
            Stroke::new(3.0, UiColors::LANE_BORDER),
            StrokeKind::Inside,
        );

        let glyph = if pressed { Color32::BLACK } else { UiColors::TEXT };
        match triangle_points(cap, *button) {
            Some(points) => {
                painter.add(Shape::convex_polygon(points.to_vec(), glyph, Stroke::NONE));
            }
            None => {
                painter.text(
                    cap.center(),
                    Align2::CENTER_CENTER,
                    button.label(),
                    FontId::proportional(24.0),
                    glyph,
                );
            }
        }
    }
}

pub fn draw_notes(painter: &Painter, origin: Pos2, notes: &[Note]) {
    for note in notes {
        let (r, g, b) = note.color;
        let rect = Rect::from_min_size(
            origin + vec2(note.x, note.y),
            vec2(note.width, note.height),
        );

        if note.height > GLOW_THRESHOLD {
            for ring in 0..3u8 {
                let grow = f32::from(ring + 1) * 2.0;
                let alpha = 60 - ring * 15;
                painter.rect_stroke(
                    rect.expand(grow),
                    0.0,
                    Stroke::new(2.0, Color32::from_rgba_unmultiplied(r, g, b, alpha)),
                    StrokeKind::Inside,
                );
            }
        }

        painter.rect_filled(rect, 0.0, Color32::from_rgb(r, g, b));
    }
}

pub fn draw_help(painter: &Painter, screen: Rect, view: &OverlayView) {
    let font = FontId::proportional(16.0);
    let (status, color) = match &view.device {
        Some(device) => (
            format!("Controller: {} ({})", device.name, device.family),
            UiColors::STATUS_OK,
        ),
        None => (
            "No Controller Connected - Press R to refresh".to_string(),
            UiColors::STATUS_MISSING,
        ),
    };
    painter.text(
        screen.min + vec2(10.0, 10.0),
        Align2::LEFT_TOP,
        status,
        font.clone(),
        color,
    );
    painter.text(
        screen.min + vec2(10.0, 35.0),
        Align2::LEFT_TOP,
        format!("Total Presses: {}", view.total_presses),
        font.clone(),
        UiColors::TEXT,
    );

    let hat_mode = view
        .device
        .as_ref()
        .is_some_and(|device| device.hat_only_dpad);
    let instructions = [
        "H: Toggle help".to_string(),
        "ESC: Emergency cleanup".to_string(),
        "R: Refresh controllers".to_string(),
        "TAB: Switch controller".to_string(),
        "C: Raw dump on/off".to_string(),
        "V: Validate button states".to_string(),
        format!("D-pad via HAT: {}", if hat_mode { "ON" } else { "OFF" }),
    ];
    for (row, line) in instructions.iter().enumerate() {
        painter.text(
            pos2(screen.max.x - 320.0, screen.min.y + 10.0 + row as f32 * 25.0),
            Align2::LEFT_TOP,
            line,
            font.clone(),
            UiColors::TEXT,
        );
    }
}
