use chrono::NaiveDate;
use thiserror::Error;

/// Reasons a draft or a step-2 form is rejected before anything is sent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("A client must be selected")]
    ClientRequired,
    #[error("Service date is required")]
    ServiceDateMissing,
    #[error("Invalid service date '{0}' (expected YYYY-MM-DD)")]
    InvalidServiceDate(String),
    #[error("Service date {date} is before today ({today})")]
    ServiceDateInPast { date: NaiveDate, today: NaiveDate },
    #[error("Invalid service time '{0}' (expected HH:MM)")]
    InvalidServiceTime(String),
    #[error("Service time {0} must be on a quarter hour (:00, :15, :30, :45)")]
    ServiceTimeOffGrid(String),
    #[error("Service time {0} must be between 08:00 and 18:00")]
    ServiceTimeOutOfRange(String),
    #[error("An address is required when transport is requested")]
    AddressRequired,
    #[error("A generator must be selected when it differs from the client")]
    GeneratorRequired,
    #[error("At least one complete material line is required")]
    NoResidueLines,
    #[error("Line {} is partially filled; complete it or clear it", .row + 1)]
    IncompleteResidueLine { row: usize },
    #[error("Line {}: invalid {} '{}'", .row + 1, .field, .value)]
    InvalidResidueLine {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("{branch} details: {field} is missing or invalid")]
    IncompleteBranch {
        branch: &'static str,
        field: &'static str,
    },
}

pub type ValidationResult<T> = Result<T, ValidationError>;
