//! Canonical pressed/released state per logical button
//!
//! The store only changes through [`ButtonStateStore::press`] and
//! [`ButtonStateStore::release`], both idempotent. It reflects the last
//! canonical transition, never raw hardware state.

use crate::controller::mapping::LogicalButton;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ButtonStateStore {
    states: HashMap<LogicalButton, bool>,
    press_counts: HashMap<LogicalButton, u64>,
    total_presses: u64,
}

impl ButtonStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `button` pressed; returns false when it already was
    pub fn press(&mut self, button: LogicalButton) -> bool {
        if self.is_pressed(button) {
            return false;
        }
        self.states.insert(button, true);
        *self.press_counts.entry(button).or_insert(0) += 1;
        self.total_presses += 1;
        true
    }

    /// Marks `button` released; returns false when it was not pressed
    pub fn release(&mut self, button: LogicalButton) -> bool {
        if !self.is_pressed(button) {
            return false;
        }
        self.states.insert(button, false);
        true
    }

    pub fn is_pressed(&self, button: LogicalButton) -> bool {
        self.states.get(&button).copied().unwrap_or(false)
    }

    /// Currently pressed buttons in id order
    pub fn pressed(&self) -> Vec<LogicalButton> {
        let mut pressed: Vec<_> = self
            .states
            .iter()
            .filter(|(_, pressed)| **pressed)
            .map(|(button, _)| *button)
            .collect();
        pressed.sort();
        pressed
    }

    pub fn press_count(&self, button: LogicalButton) -> u64 {
        self.press_counts.get(&button).copied().unwrap_or(0)
    }

    pub fn total_presses(&self) -> u64 {
        self.total_presses
    }

    /// Drops every pressed state; counters survive
    pub fn clear(&mut self) {
        self.states.clear();
    }
}
