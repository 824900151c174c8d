//! Note lifecycle for the DDR-style lanes
//!
//! ```text
//! press ──► Growing ──release──► Releasing ──off-screen──► purged
//! ```
//!
//! Geometry is a pure function of wall-clock time: a growing note's height is
//! `min_height + elapsed_ms * growth_rate / 1000`, anchored at the lane
//! baseline. After release the frozen bar travels upward at `travel_speed`.
//! The engine holds no timers, callers pass `now` on every update.

use crate::controller::mapping::{LogicalButton, LANE_ORDER};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Animation constants in overlay units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteSettings {
    /// Height gained per second while held
    pub growth_rate: f32,
    /// Upward speed per second after release
    pub travel_speed: f32,
    pub min_height: f32,
    /// Gap between the lane bottom and the note anchor
    pub initial_bottom: f32,
    /// Distance above the visible area at which a note is purged
    pub offscreen_margin: f32,
}

impl Default for NoteSettings {
    fn default() -> Self {
        Self {
            growth_rate: 80.0,
            travel_speed: 150.0,
            min_height: 8.0,
            initial_bottom: 5.0,
            offscreen_margin: 100.0,
        }
    }
}

/// Lane geometry derived from the window size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneLayout {
    pub lane_width: f32,
    pub lane_height: f32,
}

impl LaneLayout {
    /// Space kept below the lanes for the button caps
    pub const BUTTON_AREA: f32 = 100.0;

    pub fn for_window(width: f32, height: f32) -> Self {
        Self {
            lane_width: (width / LANE_ORDER.len() as f32).floor(),
            lane_height: (height - Self::BUTTON_AREA).max(0.0),
        }
    }

    pub fn lane_x(&self, lane: usize) -> f32 {
        lane as f32 * self.lane_width
    }
}

impl Default for LaneLayout {
    fn default() -> Self {
        Self::for_window(1200.0, 600.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub button: LogicalButton,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: (u8, u8, u8),
    /// Bottom anchor, fixed at creation
    pub baseline: f32,
    pub created_at: DateTime<Local>,
    pub released_at: Option<DateTime<Local>>,
    pub growing: bool,
}

fn elapsed_ms(from: DateTime<Local>, to: DateTime<Local>) -> f32 {
    let elapsed = to - from;
    let micros = elapsed
        .num_microseconds()
        .unwrap_or_else(|| elapsed.num_milliseconds().saturating_mul(1000));
    (micros.max(0) as f64 / 1000.0) as f32
}

impl Note {
    fn spawn(
        button: LogicalButton,
        lane: usize,
        layout: LaneLayout,
        settings: &NoteSettings,
        now: DateTime<Local>,
    ) -> Self {
        let baseline = layout.lane_height - settings.initial_bottom;
        Self {
            button,
            x: layout.lane_x(lane) + 5.0,
            y: baseline - settings.min_height,
            width: layout.lane_width - 10.0,
            height: settings.min_height,
            color: button.color(),
            baseline,
            created_at: now,
            released_at: None,
            growing: true,
        }
    }

    /// Recomputes height and top edge for `now`
    pub fn update(&mut self, now: DateTime<Local>, settings: &NoteSettings) {
        if self.growing {
            let held = elapsed_ms(self.created_at, now);
            self.height = settings.min_height + held * settings.growth_rate / 1000.0;
            self.y = self.baseline - self.height;
        } else if let Some(released_at) = self.released_at {
            let travelled = elapsed_ms(released_at, now) * settings.travel_speed / 1000.0;
            self.y = self.baseline - self.height - travelled;
        }
    }

    /// Stops growth at the height reached by `now` and starts travelling
    fn release(&mut self, now: DateTime<Local>, settings: &NoteSettings) {
        self.update(now, settings);
        self.growing = false;
        self.released_at = Some(now);
    }

    pub fn is_offscreen(&self, settings: &NoteSettings) -> bool {
        !self.growing && self.y + self.height < -settings.offscreen_margin
    }
}

/// Live note collection
///
/// At most one growing note per logical button; released notes coexist until
/// they leave the screen.
#[derive(Debug, Clone, Default)]
pub struct NoteEngine {
    settings: NoteSettings,
    notes: Vec<Note>,
}

impl NoteEngine {
    pub fn new(settings: NoteSettings) -> Self {
        Self {
            settings,
            notes: Vec::new(),
        }
    }

    pub fn settings(&self) -> &NoteSettings {
        &self.settings
    }

    /// Spawns a growing note for `button`
    ///
    /// Returns false when the button has no lane or already owns a growing note.
    pub fn start(&mut self, button: LogicalButton, layout: LaneLayout, now: DateTime<Local>) -> bool {
        let Some(lane) = button.lane() else {
            debug!("No lane for {}, not spawning a note", button);
            return false;
        };
        if self.active_note(button).is_some() {
            return false;
        }

        self.notes
            .push(Note::spawn(button, lane, layout, &self.settings, now));
        true
    }

    /// Freezes the growing note of `button`; false when there is none
    pub fn finish(&mut self, button: LogicalButton, now: DateTime<Local>) -> bool {
        let settings = self.settings;
        match self
            .notes
            .iter_mut()
            .find(|note| note.growing && note.button == button)
        {
            Some(note) => {
                note.release(now, &settings);
                true
            }
            None => false,
        }
    }

    /// Moves every note to its position at `now` and purges off-screen notes
    ///
    /// Returns the number of purged notes.
    pub fn advance(&mut self, now: DateTime<Local>) -> usize {
        let settings = self.settings;
        for note in &mut self.notes {
            note.update(now, &settings);
        }
        let before = self.notes.len();
        self.notes.retain(|note| !note.is_offscreen(&settings));
        before - self.notes.len()
    }

    pub fn active_note(&self, button: LogicalButton) -> Option<&Note> {
        self.notes
            .iter()
            .find(|note| note.growing && note.button == button)
    }

    pub fn active_count(&self) -> usize {
        self.notes.iter().filter(|note| note.growing).count()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}
