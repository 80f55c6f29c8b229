//! Application layer managing state and business workflows.
//!
//! This module coordinates between the domain layer and presentation layer:
//! the request wizard, dependent lookups, submission, the user session,
//! background tasks, and the overall UI state.

pub mod lookups;
pub mod session;
pub mod state;
pub mod submission;
pub mod tasks;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;

pub use lookups::*;
pub use session::*;
pub use state::*;
pub use submission::*;
pub use tasks::*;
pub use wizard::*;
