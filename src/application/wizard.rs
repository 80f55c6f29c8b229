//! The two-step service request wizard.
//!
//! ```text
//! CollectingRequest --submit--> CompletingMaterials --submit--> Submitted
//!        ^                             |                            |
//!        +------------back-------------+----------start over--------+
//! ```
//!
//! Step 1 edits a [`RequestDraft`] that is persisted after every change and
//! cleared once the server has created the request. Step 2 collects residue
//! lines and the service or transport details for the created request.
//! Going back from step 2 starts a fresh draft; it is not an undo.

use super::submission::{run_plan, MaterialPlan, SubmissionFailure, SubmissionReport};
use crate::domain::{
    parse_client_code, parse_label_id, validate_branch, validate_request, validate_residue_rows, Cliente,
    CatalogEntry, NewSolicitud, RequestDraft, ResidueRow, ServiceBranch, ValidationError,
};
use crate::infrastructure::{ApiError, Backend, DraftStore};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    CollectingRequest,
    CompletingMaterials { solicitud_id: u64 },
    Submitted { solicitud_id: u64 },
}

/// Editable step-1 fields other than the two checkboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Cliente,
    Fecha,
    Hora,
    Descripcion,
    Direccion,
    Contacto,
    Declaracion,
    Generador,
    Material,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    Material,
    Cantidad,
    Unidad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchField {
    Material,
    Cantidad,
    TipoTransporte,
    Capacidad,
    Unidad,
}

/// Result of a step-1 edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    Updated,
    /// The selected client changed; dependent lookups must be refreshed.
    ClientChanged(Option<u64>),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WizardError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Not available in the current step")]
    WrongStep,
    #[error("There is no line {}", .0 + 1)]
    NoSuchRow(usize),
    #[error("Line {} was already sent and cannot be changed", .row + 1)]
    RowLocked { row: usize },
    #[error("Line {} was rejected: {source}", .row + 1)]
    LineFailed { row: usize, source: ApiError },
    #[error("Service details were rejected: {0}")]
    BranchFailed(ApiError),
}

pub struct Wizard {
    step: WizardStep,
    draft: RequestDraft,
    rows: Vec<ResidueRow>,
    branch: ServiceBranch,
    sent_rows: BTreeSet<usize>,
    branch_sent: bool,
    store: Box<dyn DraftStore>,
}

impl Wizard {
    /// Starts in step 1 with whatever draft the store holds.
    ///
    /// Selections that cannot hold for the stored values are dropped: an
    /// address or material without a client, a generator while the
    /// generator is the client.
    pub fn resume(store: Box<dyn DraftStore>) -> Self {
        let mut draft = store.load();
        if draft.codigo_cliente_kunnr.is_none() {
            draft.direccion_id = None;
            draft.codigo_material_matnr = None;
        }
        if draft.generador_igual_cliente {
            draft.generador_id = None;
        }
        Self {
            step: WizardStep::CollectingRequest,
            draft,
            rows: vec![ResidueRow::default()],
            branch: ServiceBranch::for_transport(false),
            sent_rows: BTreeSet::new(),
            branch_sent: false,
            store,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &RequestDraft {
        &self.draft
    }

    pub fn rows(&self) -> &[ResidueRow] {
        &self.rows
    }

    pub fn branch(&self) -> &ServiceBranch {
        &self.branch
    }

    pub fn is_row_sent(&self, row: usize) -> bool {
        self.sent_rows.contains(&row)
    }

    pub fn solicitud_id(&self) -> Option<u64> {
        match self.step {
            WizardStep::CollectingRequest => None,
            WizardStep::CompletingMaterials { solicitud_id } | WizardStep::Submitted { solicitud_id } => {
                Some(solicitud_id)
            }
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.draft) {
            warn!(error = %e, "could not save draft");
        }
    }

    fn discard_stored(&mut self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "could not clear saved draft");
        }
    }

    fn ensure_collecting(&self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::CollectingRequest => Ok(()),
            _ => Err(WizardError::WrongStep),
        }
    }

    fn ensure_completing(&self) -> Result<u64, WizardError> {
        match self.step {
            WizardStep::CompletingMaterials { solicitud_id } => Ok(solicitud_id),
            _ => Err(WizardError::WrongStep),
        }
    }

    // Step 1

    /// Stamps the draft with the signed-in user.
    pub fn set_usuario(&mut self, usuario_id: Option<u64>) {
        if self.draft.usuario_id != usuario_id {
            self.draft.usuario_id = usuario_id;
            self.persist();
        }
    }

    /// Applies one typed value to a step-1 field.
    ///
    /// Id fields accept either a bare number or an option label
    /// (`"12 - Av. Norte 100"`); anything else clears the selection.
    pub fn set_field(&mut self, field: DraftField, value: &str) -> Result<FieldChange, WizardError> {
        self.ensure_collecting()?;
        match field {
            DraftField::Cliente => return Ok(self.set_cliente_text(value)),
            DraftField::Fecha => self.draft.fecha_servicio_solicitada = value.to_string(),
            DraftField::Hora => self.draft.hora_servicio_solicitada = value.to_string(),
            DraftField::Descripcion => self.draft.descripcion = value.to_string(),
            _ => return self.select(field, parse_label_id(value)),
        }
        self.persist();
        Ok(FieldChange::Updated)
    }

    /// Sets an id field directly, as when an option is picked from a list.
    pub fn select(&mut self, field: DraftField, id: Option<u64>) -> Result<FieldChange, WizardError> {
        self.ensure_collecting()?;
        let has_client = self.draft.codigo_cliente_kunnr.is_some();
        match field {
            DraftField::Cliente => return Ok(self.set_cliente_code(id)),
            DraftField::Direccion => self.draft.direccion_id = id.filter(|_| has_client),
            DraftField::Material => self.draft.codigo_material_matnr = id.filter(|_| has_client),
            DraftField::Contacto => self.draft.contacto_cliente_id = id,
            DraftField::Declaracion => self.draft.declaracion_id = id,
            DraftField::Generador => {
                if !self.draft.generador_igual_cliente {
                    self.draft.generador_id = id;
                }
            }
            DraftField::Fecha | DraftField::Hora | DraftField::Descripcion => {}
        }
        self.persist();
        Ok(FieldChange::Updated)
    }

    /// Picks a client from the autocomplete suggestions.
    pub fn choose_cliente(&mut self, cliente: &Cliente) -> Result<FieldChange, WizardError> {
        self.ensure_collecting()?;
        Ok(self.set_cliente_text(&cliente.label()))
    }

    /// Updates the autocomplete text and the client code together.
    fn set_cliente_text(&mut self, text: &str) -> FieldChange {
        self.draft.cliente_display = text.to_string();
        self.set_cliente_code(parse_client_code(text))
    }

    fn set_cliente_code(&mut self, codigo: Option<u64>) -> FieldChange {
        let change = if self.draft.codigo_cliente_kunnr != codigo {
            self.draft.codigo_cliente_kunnr = codigo;
            self.draft.direccion_id = None;
            self.draft.codigo_material_matnr = None;
            FieldChange::ClientChanged(codigo)
        } else {
            FieldChange::Updated
        };
        self.persist();
        change
    }

    pub fn toggle_transporte(&mut self) -> Result<(), WizardError> {
        self.ensure_collecting()?;
        self.draft.requiere_transporte = !self.draft.requiere_transporte;
        self.persist();
        Ok(())
    }

    pub fn toggle_generador_igual_cliente(&mut self) -> Result<(), WizardError> {
        self.ensure_collecting()?;
        self.draft.generador_igual_cliente = !self.draft.generador_igual_cliente;
        if self.draft.generador_igual_cliente {
            self.draft.generador_id = None;
        }
        self.persist();
        Ok(())
    }

    /// Validates step 1 and returns the payload to send. Nothing changes.
    pub fn prepare_request(&self, today: NaiveDate) -> Result<NewSolicitud, WizardError> {
        self.ensure_collecting()?;
        Ok(validate_request(&self.draft, today)?)
    }

    /// Moves to step 2 once the server has created the request.
    pub fn request_created(&mut self, solicitud_id: u64) -> Result<(), WizardError> {
        self.ensure_collecting()?;
        self.discard_stored();
        self.step = WizardStep::CompletingMaterials { solicitud_id };
        self.rows = vec![ResidueRow::default()];
        self.branch = ServiceBranch::for_transport(self.draft.requiere_transporte);
        self.sent_rows.clear();
        self.branch_sent = false;
        info!(solicitud_id, "request created");
        Ok(())
    }

    /// Validates, sends and applies step 1 in one go.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any call is made. A backend
    /// error leaves the draft and step untouched so the user can retry.
    pub fn submit_request(&mut self, backend: &dyn Backend, today: NaiveDate) -> Result<u64, WizardError> {
        let payload = self.prepare_request(today)?;
        let solicitud_id = backend.create_solicitud(&payload)?;
        self.request_created(solicitud_id)?;
        Ok(solicitud_id)
    }

    // Step 2

    pub fn add_row(&mut self) -> Result<usize, WizardError> {
        self.ensure_completing()?;
        self.rows.push(ResidueRow::default());
        Ok(self.rows.len() - 1)
    }

    pub fn remove_row(&mut self, row: usize) -> Result<(), WizardError> {
        self.ensure_completing()?;
        if row >= self.rows.len() {
            return Err(WizardError::NoSuchRow(row));
        }
        if self.is_row_sent(row) {
            return Err(WizardError::RowLocked { row });
        }
        self.rows.remove(row);
        self.sent_rows = self
            .sent_rows
            .iter()
            .map(|&sent| if sent > row { sent - 1 } else { sent })
            .collect();
        if self.rows.is_empty() {
            self.rows.push(ResidueRow::default());
        }
        Ok(())
    }

    pub fn set_row_field(&mut self, row: usize, field: RowField, value: &str) -> Result<(), WizardError> {
        self.ensure_completing()?;
        if self.is_row_sent(row) {
            return Err(WizardError::RowLocked { row });
        }
        let line = self.rows.get_mut(row).ok_or(WizardError::NoSuchRow(row))?;
        let target = match field {
            RowField::Material => &mut line.material,
            RowField::Cantidad => &mut line.cantidad,
            RowField::Unidad => &mut line.unidad,
        };
        *target = value.to_string();
        Ok(())
    }

    /// Replaces the lines with imported ones. Only allowed before any line
    /// has been sent.
    pub fn import_rows(&mut self, rows: Vec<ResidueRow>) -> Result<usize, WizardError> {
        self.ensure_completing()?;
        if let Some(&row) = self.sent_rows.iter().next() {
            return Err(WizardError::RowLocked { row });
        }
        let count = rows.len();
        self.rows = if rows.is_empty() { vec![ResidueRow::default()] } else { rows };
        Ok(count)
    }

    pub fn set_branch_field(&mut self, field: BranchField, value: &str) -> Result<(), WizardError> {
        self.ensure_completing()?;
        let value = value.to_string();
        match (&mut self.branch, field) {
            (ServiceBranch::Servicio(info), BranchField::Material) => info.material = value,
            (ServiceBranch::Servicio(info), BranchField::Cantidad) => info.cantidad = value,
            (ServiceBranch::Servicio(info), BranchField::Unidad) => info.unidad = value,
            (ServiceBranch::Transporte(info), BranchField::TipoTransporte) => info.tipo_transporte = value,
            (ServiceBranch::Transporte(info), BranchField::Capacidad) => info.capacidad = value,
            (ServiceBranch::Transporte(info), BranchField::Unidad) => info.unidad = value,
            _ => {}
        }
        Ok(())
    }

    /// Validates step 2 and returns what still has to be sent.
    pub fn prepare_materials(&self) -> Result<MaterialPlan, WizardError> {
        let solicitud_id = self.ensure_completing()?;
        let lines = validate_residue_rows(&self.rows, solicitud_id)?
            .into_iter()
            .filter(|(row, _)| !self.sent_rows.contains(row))
            .collect();
        let branch = if self.branch_sent {
            None
        } else {
            Some(validate_branch(&self.branch, solicitud_id)?)
        };
        Ok(MaterialPlan {
            solicitud_id,
            lines,
            branch,
        })
    }

    /// Records what the server accepted and finishes the wizard if nothing
    /// failed.
    pub fn apply_report(&mut self, report: SubmissionReport) -> Result<(), WizardError> {
        let solicitud_id = self.ensure_completing()?;
        self.sent_rows.extend(report.submitted_rows.iter().copied());
        self.branch_sent |= report.branch_submitted;

        match report.failure {
            Some(SubmissionFailure::Line { row, error }) => Err(WizardError::LineFailed { row, source: error }),
            Some(SubmissionFailure::Branch(error)) => Err(WizardError::BranchFailed(error)),
            None => {
                self.step = WizardStep::Submitted { solicitud_id };
                info!(solicitud_id, "request completed");
                Ok(())
            }
        }
    }

    /// Validates, sends and applies step 2 in one go.
    pub fn submit_materials(&mut self, backend: &dyn Backend) -> Result<SubmissionReport, WizardError> {
        let plan = self.prepare_materials()?;
        let report = run_plan(backend, &plan);
        self.apply_report(report.clone())?;
        Ok(report)
    }

    /// Leaves step 2 for a brand new draft.
    pub fn back(&mut self) -> Result<(), WizardError> {
        self.ensure_completing()?;
        self.reset();
        Ok(())
    }

    pub fn start_over(&mut self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Submitted { .. } => {
                self.reset();
                Ok(())
            }
            _ => Err(WizardError::WrongStep),
        }
    }

    fn reset(&mut self) {
        // The user id belongs to the session, not to the form.
        let usuario_id = self.draft.usuario_id;
        self.draft = RequestDraft {
            usuario_id,
            ..RequestDraft::default()
        };
        self.discard_stored();
        self.step = WizardStep::CollectingRequest;
        self.rows = vec![ResidueRow::default()];
        self.branch = ServiceBranch::for_transport(false);
        self.sent_rows.clear();
        self.branch_sent = false;
    }
}
