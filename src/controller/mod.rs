//! Controller subsystem: from raw device input to canonical button state
//!
//! 1. [`device`] - Device boundary (`DeviceBackend`, raw events, snapshots)
//! 2. [`detector`] / [`mapping`] - Family detection and raw index tables
//! 3. [`normalizer`] - Raw channels to canonical press/release transitions
//! 4. [`session`] - Lock-guarded store, notes and reconciliation
//! 5. [`foreground`] / [`poller`] - The two producers feeding the session
//!
//! # Architecture
//!
//! ```text
//!                 ┌──► ForegroundPump (UI frame, events) ──┐
//! DeviceBackend ──┤                                        ├──► StreamSession
//!                 └──► InputPoller (120 Hz, snapshots) ────┘   (store + notes)
//! ```
//!
//! The poller only reads while the overlay window is unfocused.

pub mod detector;
pub mod device;
pub mod foreground;
pub mod gilrs_backend;
pub mod mapping;
pub mod mock_backend;
pub mod normalizer;
pub mod poller;
pub mod session;
pub mod store;
