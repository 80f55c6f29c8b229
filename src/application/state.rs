//! Application state management for the terminal client.
//!
//! This module contains the main application state and mode management
//! for the terminal user interface: which screen is shown, which field has
//! focus, the edit buffer, and the glue between key presses, the wizard
//! and the background tasks.

use super::lookups::{DependentLookups, LookupOutcome};
use super::session::SessionContext;
use super::tasks::{ReferenceData, StepCatalogs, Task, TaskOutcome, TaskRunner};
use super::wizard::{BranchField, DraftField, FieldChange, RowField, Wizard, WizardError, WizardStep};
use crate::domain::{
    CatalogEntry, Cliente, Credentials, NewContacto, NewDireccion, Registration, ServiceBranch,
};
use crate::infrastructure::{import_residue_rows, ApiError};
use chrono::{Local, NaiveDate};
use std::path::Path;
use tracing::{info, warn};

/// Minimum typed characters before the client autocomplete queries the server.
pub const MIN_CLIENT_QUERY: usize = 2;

/// Represents the current mode of the application.
///
/// The mode determines how key presses are interpreted and which
/// UI elements are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Sign-in or registration form
    Login,
    /// Navigating the wizard; the step comes from the wizard itself
    Form,
    /// Typing into the focused wizard field
    Editing,
    /// Modal form creating an address or a contact
    SubForm,
    /// Prompt for a CSV file of residue lines
    ImportCsv,
    /// Help screen is displayed
    Help,
}

/// Step-1 fields in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Cliente,
    Fecha,
    Hora,
    Descripcion,
    RequiereTransporte,
    Direccion,
    Contacto,
    Declaracion,
    GeneradorIgual,
    Generador,
    Material,
}

impl FormField {
    pub const ALL: [FormField; 11] = [
        FormField::Cliente,
        FormField::Fecha,
        FormField::Hora,
        FormField::Descripcion,
        FormField::RequiereTransporte,
        FormField::Direccion,
        FormField::Contacto,
        FormField::Declaracion,
        FormField::GeneradorIgual,
        FormField::Generador,
        FormField::Material,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Cliente => "Client",
            FormField::Fecha => "Service date",
            FormField::Hora => "Service time",
            FormField::Descripcion => "Description",
            FormField::RequiereTransporte => "Requires transport",
            FormField::Direccion => "Address",
            FormField::Contacto => "Contact",
            FormField::Declaracion => "Declaration",
            FormField::GeneradorIgual => "Generator is client",
            FormField::Generador => "Generator",
            FormField::Material => "Material",
        }
    }

    /// The wizard field behind this form field; `None` for checkboxes.
    pub fn draft_field(self) -> Option<DraftField> {
        match self {
            FormField::Cliente => Some(DraftField::Cliente),
            FormField::Fecha => Some(DraftField::Fecha),
            FormField::Hora => Some(DraftField::Hora),
            FormField::Descripcion => Some(DraftField::Descripcion),
            FormField::Direccion => Some(DraftField::Direccion),
            FormField::Contacto => Some(DraftField::Contacto),
            FormField::Declaracion => Some(DraftField::Declaracion),
            FormField::Generador => Some(DraftField::Generador),
            FormField::Material => Some(DraftField::Material),
            FormField::RequiereTransporte | FormField::GeneradorIgual => None,
        }
    }
}

/// Focus position in step 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialsFocus {
    Row { row: usize, field: RowField },
    Branch(BranchField),
}

pub const ROW_FIELDS: [RowField; 3] = [RowField::Material, RowField::Cantidad, RowField::Unidad];

pub fn branch_fields(branch: &ServiceBranch) -> [BranchField; 3] {
    match branch {
        ServiceBranch::Servicio(_) => [BranchField::Material, BranchField::Cantidad, BranchField::Unidad],
        ServiceBranch::Transporte(_) => [
            BranchField::TipoTransporte,
            BranchField::Capacidad,
            BranchField::Unidad,
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormKind {
    Login,
    Register,
    NewDireccion,
    NewContacto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextInput {
    pub label: &'static str,
    pub value: String,
    pub secret: bool,
}

/// A small stack of labelled text inputs: the login screen and the
/// address/contact sub-forms.
#[derive(Debug, Clone, PartialEq)]
pub struct TextForm {
    pub kind: TextFormKind,
    pub inputs: Vec<TextInput>,
    pub focus: usize,
}

impl TextForm {
    pub fn new(kind: TextFormKind) -> Self {
        let input = |label, secret| TextInput {
            label,
            value: String::new(),
            secret,
        };
        let inputs = match kind {
            TextFormKind::Login => vec![input("Email", false), input("Password", true)],
            TextFormKind::Register => vec![
                input("Name", false),
                input("Email", false),
                input("Password", true),
            ],
            TextFormKind::NewDireccion => vec![input("Street", false), input("Commune", false)],
            TextFormKind::NewContacto => vec![
                input("Name", false),
                input("Email", false),
                input("Phone", false),
            ],
        };
        Self { kind, inputs, focus: 0 }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            TextFormKind::Login => "Sign in",
            TextFormKind::Register => "Create account",
            TextFormKind::NewDireccion => "New address",
            TextFormKind::NewContacto => "New contact",
        }
    }

    pub fn value(&self, index: usize) -> &str {
        self.inputs.get(index).map(|i| i.value.trim()).unwrap_or_default()
    }

    pub fn focused_mut(&mut self) -> Option<&mut String> {
        self.inputs.get_mut(self.focus).map(|i| &mut i.value)
    }

    pub fn next(&mut self) {
        self.focus = (self.focus + 1) % self.inputs.len();
    }

    pub fn previous(&mut self) {
        self.focus = (self.focus + self.inputs.len() - 1) % self.inputs.len();
    }
}

/// Main application state.
///
/// Holds the wizard, the session, every option list shown in the form,
/// and the UI state needed to render and handle input.
pub struct App {
    /// Current application mode
    pub mode: AppMode,
    /// The request being built
    pub wizard: Wizard,
    /// Signed-in user
    pub session: SessionContext,
    /// Option lists tied to the selected client
    pub lookups: DependentLookups,
    /// Option lists independent of the client
    pub reference: ReferenceData,
    /// Material catalogs of the created request
    pub catalogs: StepCatalogs,
    /// Client autocomplete suggestions
    pub suggestions: Vec<Cliente>,
    /// Focused step-1 field
    pub focus: FormField,
    /// Focused step-2 cell
    pub materials_focus: MaterialsFocus,
    /// Edit buffer of the focused field
    pub input: String,
    /// Cursor position within the edit buffer, in characters
    pub cursor_position: usize,
    /// Option highlighted while cycling with the arrow keys
    pub option_index: Option<usize>,
    /// Login screen or modal sub-form
    pub text_form: Option<TextForm>,
    /// Input buffer for filename entry
    pub filename_input: String,
    /// Scroll position in help text
    pub help_scroll: usize,
    /// Temporary status message to display
    pub status_message: Option<String>,
    /// A submission is in flight; further submits are refused
    pub submitting: bool,
    /// Set when the user asked to leave
    pub should_quit: bool,
    original_input: String,
    client_search_seq: u64,
    return_mode: AppMode,
    tasks: TaskRunner,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn labels<T: CatalogEntry>(entries: &[T]) -> Vec<String> {
    entries.iter().map(CatalogEntry::label).collect()
}

fn label_for<T: CatalogEntry>(entries: &[T], id: Option<u64>) -> String {
    match id {
        Some(id) => entries
            .iter()
            .find(|entry| entry.id() == id)
            .map(CatalogEntry::label)
            .unwrap_or_else(|| id.to_string()),
        None => String::new(),
    }
}

fn byte_index(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(text.len())
}

impl App {
    pub fn new(wizard: Wizard, session: SessionContext, tasks: TaskRunner) -> Self {
        Self {
            mode: AppMode::Login,
            wizard,
            session,
            lookups: DependentLookups::default(),
            reference: ReferenceData::default(),
            catalogs: StepCatalogs::default(),
            suggestions: Vec::new(),
            focus: FormField::Cliente,
            materials_focus: MaterialsFocus::Row { row: 0, field: RowField::Material },
            input: String::new(),
            cursor_position: 0,
            option_index: None,
            text_form: Some(TextForm::new(TextFormKind::Login)),
            filename_input: String::new(),
            help_scroll: 0,
            status_message: None,
            submitting: false,
            should_quit: false,
            original_input: String::new(),
            client_search_seq: 0,
            return_mode: AppMode::Form,
            tasks,
            today: local_today,
        }
    }

    /// Overrides the date used for the "not in the past" rule.
    pub fn set_clock(&mut self, today: fn() -> NaiveDate) {
        self.today = today;
    }

    /// Restores a stored session and, if there is one, opens the wizard.
    pub fn start(&mut self) {
        if self.session.init(self.tasks.backend()).is_some() {
            self.enter_wizard();
        } else {
            self.mode = AppMode::Login;
            self.text_form = Some(TextForm::new(TextFormKind::Login));
        }
    }

    fn enter_wizard(&mut self) {
        self.mode = AppMode::Form;
        self.text_form = None;
        self.wizard.set_usuario(self.session.usuario_id());
        self.tasks.spawn(Task::ReferenceData);
        // A resumed draft may already have a client selected.
        let codigo = self.wizard.draft().codigo_cliente_kunnr;
        self.refresh_lookups(codigo);
        if let Some(solicitud_id) = self.wizard.solicitud_id() {
            self.tasks.spawn(Task::StepCatalogs { solicitud_id });
        }
    }

    fn refresh_lookups(&mut self, codigo: Option<u64>) {
        for request in self.lookups.refresh(codigo) {
            self.tasks.spawn(Task::Lookup(request));
        }
    }

    fn report(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    fn report_wizard_error(&mut self, error: WizardError) {
        if matches!(error, WizardError::Api(ApiError::Unauthorized)) {
            self.report("Session expired; press Ctrl+L to sign in again");
        } else {
            self.report(error.to_string());
        }
    }

    // Login

    pub fn toggle_register(&mut self) {
        let kind = match self.text_form.as_ref().map(|f| f.kind) {
            Some(TextFormKind::Register) => TextFormKind::Login,
            _ => TextFormKind::Register,
        };
        self.text_form = Some(TextForm::new(kind));
        self.status_message = None;
    }

    /// Sends the login or registration form.
    pub fn submit_login(&mut self) {
        if self.submitting {
            return;
        }
        let Some(form) = &self.text_form else { return };
        let task = match form.kind {
            TextFormKind::Login => {
                let credentials = Credentials {
                    email: form.value(0).to_string(),
                    password: form.value(1).to_string(),
                };
                if credentials.email.is_empty() || credentials.password.is_empty() {
                    self.report("Email and password are required");
                    return;
                }
                Task::Login(credentials)
            }
            TextFormKind::Register => {
                let registration = Registration {
                    nombre: form.value(0).to_string(),
                    email: form.value(1).to_string(),
                    password: form.value(2).to_string(),
                };
                if registration.nombre.is_empty()
                    || registration.email.is_empty()
                    || registration.password.is_empty()
                {
                    self.report("Name, email and password are required");
                    return;
                }
                Task::Register(registration)
            }
            _ => return,
        };
        self.submitting = true;
        self.report("Signing in...");
        self.tasks.spawn(task);
    }

    pub fn logout(&mut self) {
        self.session.teardown(self.tasks.backend());
        self.tasks.invalidate();
        self.mode = AppMode::Login;
        self.text_form = Some(TextForm::new(TextFormKind::Login));
        self.suggestions.clear();
        self.submitting = false;
        self.report("Signed out");
    }

    // Step-1 navigation and editing

    fn field_enabled(&self, field: FormField) -> bool {
        match field {
            FormField::Generador => !self.wizard.draft().generador_igual_cliente,
            _ => true,
        }
    }

    pub fn focus_next(&mut self) {
        match self.wizard.step() {
            WizardStep::CollectingRequest => self.move_form_focus(1),
            WizardStep::CompletingMaterials { .. } => self.move_materials_linear(1),
            WizardStep::Submitted { .. } => {}
        }
    }

    pub fn focus_previous(&mut self) {
        match self.wizard.step() {
            WizardStep::CollectingRequest => self.move_form_focus(-1),
            WizardStep::CompletingMaterials { .. } => self.move_materials_linear(-1),
            WizardStep::Submitted { .. } => {}
        }
    }

    fn move_form_focus(&mut self, delta: isize) {
        let len = FormField::ALL.len() as isize;
        let mut index = FormField::ALL.iter().position(|&f| f == self.focus).unwrap_or(0) as isize;
        for _ in 0..len {
            index = (index + delta).rem_euclid(len);
            let candidate = FormField::ALL[index as usize];
            if self.field_enabled(candidate) {
                self.focus = candidate;
                return;
            }
        }
    }

    /// Current display value of a step-1 field.
    pub fn form_value(&self, field: FormField) -> String {
        let draft = self.wizard.draft();
        let yes_no = |flag: bool| if flag { "[x]" } else { "[ ]" }.to_string();
        match field {
            FormField::Cliente => draft.cliente_display.clone(),
            FormField::Fecha => draft.fecha_servicio_solicitada.clone(),
            FormField::Hora => draft.hora_servicio_solicitada.clone(),
            FormField::Descripcion => draft.descripcion.clone(),
            FormField::RequiereTransporte => yes_no(draft.requiere_transporte),
            FormField::GeneradorIgual => yes_no(draft.generador_igual_cliente),
            FormField::Direccion => label_for(&self.lookups.direcciones, draft.direccion_id),
            FormField::Contacto => label_for(&self.lookups.contactos, draft.contacto_cliente_id),
            FormField::Declaracion => label_for(&self.reference.declaraciones, draft.declaracion_id),
            FormField::Generador => label_for(&self.reference.generadores, draft.generador_id),
            FormField::Material => label_for(&self.lookups.materiales, draft.codigo_material_matnr),
        }
    }

    /// Choices offered for the field being edited.
    pub fn current_options(&self) -> Vec<String> {
        match self.wizard.step() {
            WizardStep::CollectingRequest => match self.focus {
                FormField::Cliente => labels(&self.suggestions),
                FormField::Direccion => labels(&self.lookups.direcciones),
                FormField::Contacto => labels(&self.lookups.contactos),
                FormField::Declaracion => labels(&self.reference.declaraciones),
                FormField::Generador => labels(&self.reference.generadores),
                FormField::Material => labels(&self.lookups.materiales),
                _ => Vec::new(),
            },
            WizardStep::CompletingMaterials { .. } => match self.materials_focus {
                MaterialsFocus::Row { field: RowField::Material, .. } => labels(&self.catalogs.residuos),
                MaterialsFocus::Row { field: RowField::Unidad, .. }
                | MaterialsFocus::Branch(BranchField::Unidad) => labels(&self.reference.unidades),
                MaterialsFocus::Branch(BranchField::Material) => labels(&self.catalogs.servicios),
                MaterialsFocus::Branch(BranchField::TipoTransporte) => {
                    labels(&self.reference.tipos_transporte)
                }
                MaterialsFocus::Branch(BranchField::Capacidad) => labels(&self.reference.capacidades),
                _ => Vec::new(),
            },
            WizardStep::Submitted { .. } => Vec::new(),
        }
    }

    /// Enter on the focused field: toggles a checkbox or opens the editor.
    pub fn activate_focused(&mut self) {
        match self.wizard.step() {
            WizardStep::CollectingRequest => match self.focus {
                FormField::RequiereTransporte | FormField::GeneradorIgual => self.toggle_focused(),
                _ => self.start_editing(),
            },
            WizardStep::CompletingMaterials { .. } => self.start_editing(),
            WizardStep::Submitted { .. } => self.start_over(),
        }
    }

    pub fn toggle_focused(&mut self) {
        let result = match self.focus {
            FormField::RequiereTransporte => self.wizard.toggle_transporte(),
            FormField::GeneradorIgual => self.wizard.toggle_generador_igual_cliente(),
            _ => Ok(()),
        };
        if let Err(e) = result {
            self.report_wizard_error(e);
        }
    }

    fn focused_value(&self) -> String {
        match self.wizard.step() {
            WizardStep::CollectingRequest => self.form_value(self.focus),
            WizardStep::CompletingMaterials { .. } => match self.materials_focus {
                MaterialsFocus::Row { row, field } => self
                    .wizard
                    .rows()
                    .get(row)
                    .map(|line| match field {
                        RowField::Material => line.material.clone(),
                        RowField::Cantidad => line.cantidad.clone(),
                        RowField::Unidad => line.unidad.clone(),
                    })
                    .unwrap_or_default(),
                MaterialsFocus::Branch(field) => match (self.wizard.branch(), field) {
                    (ServiceBranch::Servicio(info), BranchField::Material) => info.material.clone(),
                    (ServiceBranch::Servicio(info), BranchField::Cantidad) => info.cantidad.clone(),
                    (ServiceBranch::Servicio(info), BranchField::Unidad) => info.unidad.clone(),
                    (ServiceBranch::Transporte(info), BranchField::TipoTransporte) => {
                        info.tipo_transporte.clone()
                    }
                    (ServiceBranch::Transporte(info), BranchField::Capacidad) => info.capacidad.clone(),
                    (ServiceBranch::Transporte(info), BranchField::Unidad) => info.unidad.clone(),
                    _ => String::new(),
                },
            },
            WizardStep::Submitted { .. } => String::new(),
        }
    }

    /// Switches to editing mode for the focused field.
    ///
    /// Loads the field's current value into the input buffer and positions
    /// the cursor at the end.
    pub fn start_editing(&mut self) {
        if let MaterialsFocus::Row { row, .. } = self.materials_focus {
            if matches!(self.wizard.step(), WizardStep::CompletingMaterials { .. }) && self.wizard.is_row_sent(row) {
                self.report_wizard_error(WizardError::RowLocked { row });
                return;
            }
        }
        self.mode = AppMode::Editing;
        self.input = self.focused_value();
        self.original_input = self.input.clone();
        self.cursor_position = self.input.chars().count();
        self.option_index = None;
        self.status_message = None;
    }

    /// Writes the edit buffer through to the wizard.
    ///
    /// Called after every keystroke, so the draft is saved as the user
    /// types and a client code is resolved as soon as it is parseable.
    pub fn apply_input(&mut self) {
        let value = self.input.clone();
        let result = match self.wizard.step() {
            WizardStep::CollectingRequest => match self.focus.draft_field() {
                Some(field) => self.wizard.set_field(field, &value),
                None => Ok(FieldChange::Updated),
            },
            WizardStep::CompletingMaterials { .. } => {
                let written = match self.materials_focus {
                    MaterialsFocus::Row { row, field } => self.wizard.set_row_field(row, field, &value),
                    MaterialsFocus::Branch(field) => self.wizard.set_branch_field(field, &value),
                };
                written.map(|()| FieldChange::Updated)
            }
            WizardStep::Submitted { .. } => Ok(FieldChange::Updated),
        };

        match result {
            Ok(FieldChange::ClientChanged(codigo)) => {
                self.refresh_lookups(codigo);
                self.maybe_search_clientes();
            }
            Ok(FieldChange::Updated) => {
                if self.focus == FormField::Cliente
                    && matches!(self.wizard.step(), WizardStep::CollectingRequest)
                {
                    self.maybe_search_clientes();
                }
            }
            Err(e) => self.report_wizard_error(e),
        }
    }

    fn maybe_search_clientes(&mut self) {
        if self.wizard.draft().codigo_cliente_kunnr.is_some() || self.option_index.is_some() {
            return;
        }
        let query = self.input.trim().to_string();
        if query.chars().count() < MIN_CLIENT_QUERY {
            self.suggestions.clear();
            return;
        }
        self.client_search_seq += 1;
        self.tasks.spawn(Task::SearchClientes {
            seq: self.client_search_seq,
            query,
        });
    }

    /// Completes editing and moves to the next field.
    pub fn finish_editing(&mut self) {
        self.apply_input();
        self.mode = AppMode::Form;
        self.input.clear();
        self.cursor_position = 0;
        self.option_index = None;
        self.suggestions.clear();
        self.focus_next();
    }

    /// Cancels editing, restoring the value the field had before.
    pub fn cancel_editing(&mut self) {
        self.input = self.original_input.clone();
        self.apply_input();
        self.mode = AppMode::Form;
        self.input.clear();
        self.cursor_position = 0;
        self.option_index = None;
        self.suggestions.clear();
    }

    /// Replaces the edit buffer with the next (or previous) option.
    pub fn cycle_option(&mut self, forward: bool) {
        let options = self.current_options();
        if options.is_empty() {
            return;
        }
        let len = options.len();
        let index = match (self.option_index, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        };
        self.option_index = Some(index);
        self.input = options[index].clone();
        self.cursor_position = self.input.chars().count();
        self.apply_input();
    }

    pub fn insert_char(&mut self, c: char) {
        let at = byte_index(&self.input, self.cursor_position);
        self.input.insert(at, c);
        self.cursor_position += 1;
        self.option_index = None;
        self.apply_input();
    }

    pub fn insert_text(&mut self, text: &str) {
        let at = byte_index(&self.input, self.cursor_position);
        self.input.insert_str(at, text);
        self.cursor_position += text.chars().count();
        self.option_index = None;
        self.apply_input();
    }

    pub fn backspace(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = byte_index(&self.input, self.cursor_position);
            self.input.remove(at);
            self.option_index = None;
            self.apply_input();
        }
    }

    pub fn delete_char(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            let at = byte_index(&self.input, self.cursor_position);
            self.input.remove(at);
            self.option_index = None;
            self.apply_input();
        }
    }

    // Step-2 navigation

    fn materials_targets(&self) -> Vec<MaterialsFocus> {
        let mut targets: Vec<MaterialsFocus> = (0..self.wizard.rows().len())
            .flat_map(|row| ROW_FIELDS.iter().map(move |&field| MaterialsFocus::Row { row, field }))
            .collect();
        targets.extend(branch_fields(self.wizard.branch()).map(MaterialsFocus::Branch));
        targets
    }

    fn move_materials_linear(&mut self, delta: isize) {
        let targets = self.materials_targets();
        let len = targets.len() as isize;
        let index = targets.iter().position(|&t| t == self.materials_focus).unwrap_or(0) as isize;
        self.materials_focus = targets[(index + delta).rem_euclid(len) as usize];
    }

    pub fn move_up(&mut self) {
        match self.wizard.step() {
            WizardStep::CollectingRequest => self.move_form_focus(-1),
            WizardStep::CompletingMaterials { .. } => {
                let rows = self.wizard.rows().len();
                let fields = branch_fields(self.wizard.branch());
                self.materials_focus = match self.materials_focus {
                    MaterialsFocus::Row { row, field } => MaterialsFocus::Row { row: row.saturating_sub(1), field },
                    MaterialsFocus::Branch(field) => match fields.iter().position(|&f| f == field) {
                        Some(0) | None => MaterialsFocus::Row { row: rows.saturating_sub(1), field: RowField::Material },
                        Some(i) => MaterialsFocus::Branch(fields[i - 1]),
                    },
                };
            }
            WizardStep::Submitted { .. } => {}
        }
    }

    pub fn move_down(&mut self) {
        match self.wizard.step() {
            WizardStep::CollectingRequest => self.move_form_focus(1),
            WizardStep::CompletingMaterials { .. } => {
                let rows = self.wizard.rows().len();
                let fields = branch_fields(self.wizard.branch());
                self.materials_focus = match self.materials_focus {
                    MaterialsFocus::Row { row, field } if row + 1 < rows => MaterialsFocus::Row { row: row + 1, field },
                    MaterialsFocus::Row { .. } => MaterialsFocus::Branch(fields[0]),
                    MaterialsFocus::Branch(field) => {
                        let i = fields.iter().position(|&f| f == field).unwrap_or(0);
                        MaterialsFocus::Branch(fields[(i + 1).min(fields.len() - 1)])
                    }
                };
            }
            WizardStep::Submitted { .. } => {}
        }
    }

    pub fn move_column(&mut self, forward: bool) {
        if let MaterialsFocus::Row { row, field } = self.materials_focus {
            let i = ROW_FIELDS.iter().position(|&f| f == field).unwrap_or(0);
            let next = if forward { (i + 1).min(ROW_FIELDS.len() - 1) } else { i.saturating_sub(1) };
            self.materials_focus = MaterialsFocus::Row { row, field: ROW_FIELDS[next] };
        }
    }

    pub fn add_row(&mut self) {
        match self.wizard.add_row() {
            Ok(row) => self.materials_focus = MaterialsFocus::Row { row, field: RowField::Material },
            Err(e) => self.report_wizard_error(e),
        }
    }

    pub fn remove_focused_row(&mut self) {
        let MaterialsFocus::Row { row, field } = self.materials_focus else { return };
        match self.wizard.remove_row(row) {
            Ok(()) => {
                let last = self.wizard.rows().len().saturating_sub(1);
                self.materials_focus = MaterialsFocus::Row { row: row.min(last), field };
            }
            Err(e) => self.report_wizard_error(e),
        }
    }

    // Submission

    /// Sends the current step if it validates.
    ///
    /// Validation errors are reported without any network call. While a
    /// submission is in flight further submits are refused.
    pub fn submit_current_step(&mut self) {
        if self.submitting {
            self.report("Already sending, please wait");
            return;
        }
        match self.wizard.step() {
            WizardStep::CollectingRequest => match self.wizard.prepare_request((self.today)()) {
                Ok(payload) => {
                    self.submitting = true;
                    self.report("Creating request...");
                    self.tasks.spawn(Task::CreateSolicitud(payload));
                }
                Err(e) => self.report_wizard_error(e),
            },
            WizardStep::CompletingMaterials { .. } => match self.wizard.prepare_materials() {
                Ok(plan) => {
                    self.submitting = true;
                    self.report(format!("Sending {} material line(s)...", plan.lines.len()));
                    self.tasks.spawn(Task::SubmitMaterials(plan));
                }
                Err(e) => self.report_wizard_error(e),
            },
            WizardStep::Submitted { .. } => {}
        }
    }

    pub fn go_back(&mut self) {
        if self.submitting {
            return;
        }
        match self.wizard.back() {
            Ok(()) => {
                self.after_reset();
                self.report("Started a new request");
            }
            Err(e) => self.report_wizard_error(e),
        }
    }

    pub fn start_over(&mut self) {
        match self.wizard.start_over() {
            Ok(()) => {
                self.after_reset();
                self.report("Started a new request");
            }
            Err(e) => self.report_wizard_error(e),
        }
    }

    fn after_reset(&mut self) {
        self.focus = FormField::Cliente;
        self.materials_focus = MaterialsFocus::Row { row: 0, field: RowField::Material };
        self.catalogs = StepCatalogs::default();
        self.refresh_lookups(None);
    }

    // Sub-forms

    pub fn open_sub_form(&mut self, kind: TextFormKind) {
        if !matches!(self.wizard.step(), WizardStep::CollectingRequest) {
            return;
        }
        if self.wizard.draft().codigo_cliente_kunnr.is_none() {
            self.report("Select a client first");
            return;
        }
        self.text_form = Some(TextForm::new(kind));
        self.mode = AppMode::SubForm;
        self.status_message = None;
    }

    pub fn close_sub_form(&mut self) {
        self.text_form = None;
        self.mode = AppMode::Form;
    }

    pub fn submit_sub_form(&mut self) {
        if self.submitting {
            return;
        }
        let Some(codigo) = self.wizard.draft().codigo_cliente_kunnr else {
            self.report("Select a client first");
            return;
        };
        let Some(form) = &self.text_form else { return };
        let task = match form.kind {
            TextFormKind::NewDireccion => {
                if form.value(0).is_empty() {
                    self.report("Street is required");
                    return;
                }
                Task::CreateDireccion(NewDireccion {
                    codigo_cliente_kunnr: codigo,
                    calle: form.value(0).to_string(),
                    comuna: form.value(1).to_string(),
                })
            }
            TextFormKind::NewContacto => {
                if form.value(0).is_empty() {
                    self.report("Name is required");
                    return;
                }
                Task::CreateContacto(NewContacto {
                    codigo_cliente_kunnr: codigo,
                    nombre: form.value(0).to_string(),
                    email: form.value(1).to_string(),
                    telefono: form.value(2).to_string(),
                })
            }
            _ => return,
        };
        self.submitting = true;
        self.tasks.spawn(task);
    }

    // CSV import

    pub fn start_csv_import(&mut self) {
        if !matches!(self.wizard.step(), WizardStep::CompletingMaterials { .. }) {
            return;
        }
        self.mode = AppMode::ImportCsv;
        self.filename_input = "lineas.csv".to_string();
        self.cursor_position = self.filename_input.chars().count();
        self.status_message = None;
    }

    pub fn cancel_filename_input(&mut self) {
        self.mode = AppMode::Form;
        self.filename_input.clear();
        self.cursor_position = 0;
    }

    pub fn finish_csv_import(&mut self) {
        let filename = if self.filename_input.trim().is_empty() {
            "lineas.csv".to_string()
        } else {
            self.filename_input.trim().to_string()
        };
        let result = import_residue_rows(Path::new(&filename))
            .map_err(|e| e.to_string())
            .and_then(|rows| self.wizard.import_rows(rows).map_err(|e| e.to_string()));
        match result {
            Ok(count) => {
                self.materials_focus = MaterialsFocus::Row { row: 0, field: RowField::Material };
                self.report(format!("Imported {count} line(s) from {filename}"));
            }
            Err(error) => self.report(format!("Import failed: {error}")),
        }
        self.cancel_filename_input();
    }

    // Help

    pub fn open_help(&mut self) {
        self.return_mode = self.mode;
        self.mode = AppMode::Help;
        self.help_scroll = 0;
    }

    pub fn close_help(&mut self) {
        self.mode = self.return_mode;
    }

    // Background outcomes

    /// Applies every finished background task.
    ///
    /// Outcomes may spawn follow-up tasks; whatever those have already
    /// delivered is applied in the same pass.
    pub fn poll_tasks(&mut self) {
        loop {
            let outcomes = self.tasks.drain();
            if outcomes.is_empty() {
                break;
            }
            for outcome in outcomes {
                self.handle_outcome(outcome);
            }
        }
    }

    pub fn handle_outcome(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Authenticated(result) => {
                self.submitting = false;
                match result {
                    Ok(grant) => {
                        self.session.begin(grant, self.tasks.backend());
                        self.enter_wizard();
                        self.report("Signed in");
                    }
                    Err(ApiError::Unauthorized) => self.report("Wrong email or password"),
                    Err(e) => self.report(format!("Sign in failed: {e}")),
                }
            }
            TaskOutcome::Clientes { seq, result } => {
                if seq != self.client_search_seq || self.mode != AppMode::Editing {
                    return;
                }
                match result {
                    Ok(clientes) => self.suggestions = clientes,
                    Err(e) => self.report(format!("Client search failed: {e}")),
                }
            }
            TaskOutcome::Lookup(response) => {
                if let LookupOutcome::Failed(e) = self.lookups.apply(response) {
                    self.report(format!("Could not load options: {e}"));
                }
            }
            TaskOutcome::ReferenceData(result) => match result {
                Ok(data) => self.reference = data,
                Err(e) => self.report(format!("Could not load reference lists: {e}")),
            },
            TaskOutcome::StepCatalogs(result) => match result {
                Ok(catalogs) => self.catalogs = catalogs,
                Err(e) => self.report(format!("Could not load material catalogs: {e}")),
            },
            TaskOutcome::SolicitudCreated(result) => {
                self.submitting = false;
                let created = result
                    .map_err(WizardError::from)
                    .and_then(|id| self.wizard.request_created(id).map(|()| id));
                match created {
                    Ok(solicitud_id) => {
                        self.materials_focus = MaterialsFocus::Row { row: 0, field: RowField::Material };
                        self.tasks.spawn(Task::StepCatalogs { solicitud_id });
                        self.report(format!("Request #{solicitud_id} created; add its materials"));
                    }
                    Err(e) => {
                        warn!(error = %e, "request not created");
                        self.report_wizard_error(e);
                    }
                }
            }
            TaskOutcome::MaterialsSubmitted(report) => {
                self.submitting = false;
                let sent = report.submitted_rows.len();
                match self.wizard.apply_report(report) {
                    Ok(()) => {
                        let id = self.wizard.solicitud_id().unwrap_or_default();
                        info!(solicitud_id = id, "wizard finished");
                        self.report(format!("Request #{id} submitted with {sent} new line(s)"));
                    }
                    Err(e) => {
                        self.report(format!("{e} ({sent} line(s) were accepted; retry to send the rest)"))
                    }
                }
            }
            TaskOutcome::DireccionCreated(result) => {
                self.submitting = false;
                match result {
                    Ok(direccion) => {
                        self.close_sub_form();
                        let codigo = self.wizard.draft().codigo_cliente_kunnr;
                        self.refresh_lookups(codigo);
                        self.lookups.direcciones.push(direccion.clone());
                        if let Err(e) = self.wizard.select(DraftField::Direccion, Some(direccion.direccion_id)) {
                            self.report_wizard_error(e);
                        } else {
                            self.report(format!("Address {} created", direccion.label()));
                        }
                    }
                    Err(e) => self.report(format!("Could not create address: {e}")),
                }
            }
            TaskOutcome::ContactoCreated(result) => {
                self.submitting = false;
                match result {
                    Ok(contacto) => {
                        self.close_sub_form();
                        let codigo = self.wizard.draft().codigo_cliente_kunnr;
                        self.refresh_lookups(codigo);
                        self.lookups.contactos.push(contacto.clone());
                        if let Err(e) = self.wizard.select(DraftField::Contacto, Some(contacto.contacto_cliente_id)) {
                            self.report_wizard_error(e);
                        } else {
                            self.report(format!("Contact {} created", contacto.label()));
                        }
                    }
                    Err(e) => self.report(format!("Could not create contact: {e}")),
                }
            }
        }
    }
}
