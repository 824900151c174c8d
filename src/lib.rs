pub mod config;
pub mod controller;
pub mod notes;
pub mod ui;
