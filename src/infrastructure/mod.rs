//! Infrastructure layer providing external service integrations.
//!
//! This module contains the REST client, local persistence of the draft
//! and session, configuration, and clipboard access.

pub mod api;
pub mod clipboard;
pub mod config;
pub mod persistence;

pub use api::*;
pub use clipboard::*;
pub use config::*;
pub use persistence::*;
