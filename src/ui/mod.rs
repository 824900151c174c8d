//! StreamPad overlay window
//!
//! Every frame the app
//!
//! 1. publishes window focus for the background poller,
//! 2. handles the keyboard shortcuts,
//! 3. pumps foreground input and runs the periodic validation,
//! 4. advances notes and paints lanes, notes and the help overlay.

pub mod common;

use crate::config::DisplayConfig;
use crate::controller::foreground::ForegroundPump;
use crate::controller::session::{lock_session, SharedSession};
use crate::notes::LaneLayout;
use chrono::{DateTime, Local};
use eframe::egui::{self, Context, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use self::common::{draw_help, draw_lanes, draw_notes, OverlayView, UiColors};

pub struct StreamPadApp {
    pump: ForegroundPump,

    session: SharedSession,

    /// Shared with the poller, true while the window has focus
    focus: Arc<AtomicBool>,

    display: DisplayConfig,

    show_help: bool,
}

impl StreamPadApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        pump: ForegroundPump,
        session: SharedSession,
        focus: Arc<AtomicBool>,
        display: DisplayConfig,
    ) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);
        Self {
            pump,
            session,
            focus,
            display,
            show_help: false,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.display.fps.max(1)))
    }

    fn handle_keys(&mut self, ctx: &Context, now: DateTime<Local>) {
        let pressed = |key: Key| ctx.input(|i| i.key_pressed(key));

        if pressed(Key::H) {
            self.show_help = !self.show_help;
        }
        if pressed(Key::Escape) {
            info!("Manual emergency cleanup");
            match lock_session(&self.session) {
                Ok(mut session) => session.emergency_reset("manual cleanup"),
                Err(e) => warn!("Emergency cleanup failed: {}", e),
            }
        }
        if pressed(Key::R) {
            if let Err(e) = self.pump.refresh_devices() {
                warn!("Device refresh failed: {}", e);
            }
        }
        if pressed(Key::Tab) {
            if let Err(e) = self.pump.switch_device() {
                warn!("Device switch failed: {}", e);
            }
        }
        if pressed(Key::C) {
            self.pump.toggle_raw_dump();
        }
        if pressed(Key::V) {
            match self.pump.validate(now) {
                Ok(released) => info!("Manual validation released {:?}", released),
                Err(e) => warn!("Manual validation failed: {}", e),
            }
        }
    }
}

impl eframe::App for StreamPadApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Local::now();
        let focused = ctx.input(|i| i.focused);
        self.focus.store(focused, Ordering::Relaxed);

        self.handle_keys(ctx, now);

        if let Err(e) = self.pump.pump(now, focused) {
            warn!("Foreground pump failed: {}", e);
        }
        if let Err(e) = self.pump.tick_reconcile(now) {
            warn!("State validation failed: {}", e);
        }

        let screen = ctx.screen_rect();
        let view = match lock_session(&self.session) {
            Ok(mut session) => {
                session.set_layout(LaneLayout::for_window(screen.width(), screen.height()));
                session.advance(now);
                Some(OverlayView::capture(&session))
            }
            Err(e) => {
                warn!("Skipping frame: {}", e);
                None
            }
        };

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(UiColors::BACKGROUND))
            .show(ctx, |ui| {
                let Some(view) = view else {
                    return;
                };
                let painter = ui.painter();
                draw_lanes(painter, screen.min, &view, self.display.button_height);
                draw_notes(painter, screen.min, &view.notes);
                if self.show_help {
                    draw_help(painter, screen, &view);
                }
            });

        ctx.request_repaint_after(self.frame_interval());
    }
}
