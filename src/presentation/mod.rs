//! Presentation layer handling terminal UI and user input.
//!
//! This module manages the terminal user interface using ratatui,
//! handles keyboard input, and renders the login screen, the two wizard
//! steps and their pop-ups.

pub mod ui;
pub mod input;

pub use ui::*;
pub use input::*;
