//! Step-2 submission: residue lines one by one, then the service branch.

use crate::domain::{BranchPayload, MaterialResiduo};
use crate::infrastructure::{ApiError, Backend};
use tracing::{error, info};

/// Everything still to be sent for a request, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialPlan {
    pub solicitud_id: u64,
    /// Pending lines with the row they came from, in row order.
    pub lines: Vec<(usize, MaterialResiduo)>,
    /// `None` once the branch has been accepted by the server.
    pub branch: Option<BranchPayload>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionFailure {
    Line { row: usize, error: ApiError },
    Branch(ApiError),
}

/// What the server accepted before the sequence finished or stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionReport {
    pub submitted_rows: Vec<usize>,
    pub branch_submitted: bool,
    pub failure: Option<SubmissionFailure>,
}

impl SubmissionReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Sends the plan sequentially, one create-call per line in row order.
///
/// The first failing call stops the sequence. Calls that already succeeded
/// are not undone; they are listed in the report so a retry can skip them.
pub fn run_plan(backend: &dyn Backend, plan: &MaterialPlan) -> SubmissionReport {
    let mut report = SubmissionReport::default();

    for (row, line) in &plan.lines {
        match backend.create_solicitud_material(line) {
            Ok(()) => report.submitted_rows.push(*row),
            Err(e) => {
                error!(solicitud_id = plan.solicitud_id, row, error = %e, "material line rejected");
                report.failure = Some(SubmissionFailure::Line { row: *row, error: e });
                return report;
            }
        }
    }

    if let Some(branch) = &plan.branch {
        let result = match branch {
            BranchPayload::Servicio(servicio) => backend.create_solicitud_servicio(servicio),
            BranchPayload::Transporte(transporte) => backend.create_solicitud_transporte(transporte),
        };
        match result {
            Ok(()) => report.branch_submitted = true,
            Err(e) => {
                error!(solicitud_id = plan.solicitud_id, error = %e, "service details rejected");
                report.failure = Some(SubmissionFailure::Branch(e));
                return report;
            }
        }
    }

    info!(
        solicitud_id = plan.solicitud_id,
        lines = report.submitted_rows.len(),
        "materials submitted"
    );
    report
}
