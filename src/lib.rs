//! solicita - Service request client library
//!
//! Domain rules, backend access and the terminal wizard for creating
//! logistics service requests.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
pub use application::*;
