//! Background execution of backend calls.
//!
//! The UI thread never waits on the network. It hands a [`Task`] to the
//! [`TaskRunner`], which runs it on a worker thread and posts the
//! [`TaskOutcome`] back over a channel; the event loop drains outcomes
//! between key presses.

use super::lookups::{fetch, LookupRequest, LookupResponse};
use super::submission::{run_plan, MaterialPlan, SubmissionReport};
use crate::domain::{
    AuthGrant, CapacidadTransporte, Cliente, Contacto, Credentials, Declaracion, Direccion,
    Generador, MaterialCotizado, NewContacto, NewDireccion, NewSolicitud, Registration,
    TipoTransporte, UnidadReferencial,
};
use crate::infrastructure::{ApiResult, Backend, CLIENT_SEARCH_LIMIT};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum Task {
    Login(Credentials),
    Register(Registration),
    SearchClientes { seq: u64, query: String },
    Lookup(LookupRequest),
    ReferenceData,
    StepCatalogs { solicitud_id: u64 },
    CreateSolicitud(NewSolicitud),
    SubmitMaterials(MaterialPlan),
    CreateDireccion(NewDireccion),
    CreateContacto(NewContacto),
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Login(_) => "login",
            Task::Register(_) => "register",
            Task::SearchClientes { .. } => "search_clientes",
            Task::Lookup(_) => "lookup",
            Task::ReferenceData => "reference_data",
            Task::StepCatalogs { .. } => "step_catalogs",
            Task::CreateSolicitud(_) => "create_solicitud",
            Task::SubmitMaterials(_) => "submit_materials",
            Task::CreateDireccion(_) => "create_direccion",
            Task::CreateContacto(_) => "create_contacto",
        }
    }
}

#[derive(Debug)]
pub enum TaskOutcome {
    Authenticated(ApiResult<AuthGrant>),
    Clientes { seq: u64, result: ApiResult<Vec<Cliente>> },
    Lookup(LookupResponse),
    ReferenceData(ApiResult<ReferenceData>),
    StepCatalogs(ApiResult<StepCatalogs>),
    SolicitudCreated(ApiResult<u64>),
    MaterialsSubmitted(SubmissionReport),
    DireccionCreated(ApiResult<Direccion>),
    ContactoCreated(ApiResult<Contacto>),
}

/// Lists that do not depend on the selected client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    pub declaraciones: Vec<Declaracion>,
    pub generadores: Vec<Generador>,
    pub unidades: Vec<UnidadReferencial>,
    pub tipos_transporte: Vec<TipoTransporte>,
    pub capacidades: Vec<CapacidadTransporte>,
}

/// Material catalogs scoped to a created request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepCatalogs {
    pub residuos: Vec<MaterialCotizado>,
    pub servicios: Vec<MaterialCotizado>,
}

/// Runs a task to completion on the current thread.
pub fn execute(backend: &dyn Backend, task: Task) -> TaskOutcome {
    match task {
        Task::Login(credentials) => TaskOutcome::Authenticated(backend.login(&credentials)),
        Task::Register(registration) => TaskOutcome::Authenticated(backend.register(&registration)),
        Task::SearchClientes { seq, query } => TaskOutcome::Clientes {
            seq,
            result: backend.search_clientes(&query, CLIENT_SEARCH_LIMIT, 0),
        },
        Task::Lookup(request) => TaskOutcome::Lookup(fetch(backend, request)),
        Task::ReferenceData => TaskOutcome::ReferenceData(fetch_reference_data(backend)),
        Task::StepCatalogs { solicitud_id } => TaskOutcome::StepCatalogs(
            backend.materiales_residuos(solicitud_id).and_then(|residuos| {
                Ok(StepCatalogs {
                    residuos,
                    servicios: backend.materiales_servicios(solicitud_id)?,
                })
            }),
        ),
        Task::CreateSolicitud(payload) => TaskOutcome::SolicitudCreated(backend.create_solicitud(&payload)),
        Task::SubmitMaterials(plan) => TaskOutcome::MaterialsSubmitted(run_plan(backend, &plan)),
        Task::CreateDireccion(direccion) => TaskOutcome::DireccionCreated(backend.create_direccion(&direccion)),
        Task::CreateContacto(contacto) => TaskOutcome::ContactoCreated(backend.create_contacto(&contacto)),
    }
}

fn fetch_reference_data(backend: &dyn Backend) -> ApiResult<ReferenceData> {
    Ok(ReferenceData {
        declaraciones: backend.declaraciones()?,
        generadores: backend.generadores()?,
        unidades: backend.unidades()?,
        tipos_transporte: backend.tipos_transporte()?,
        capacidades: backend.capacidades_transporte()?,
    })
}

/// How tasks are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One worker thread per task.
    Background,
    /// Run on the caller's thread; outcomes are still delivered through the
    /// channel. Used by tests for deterministic ordering.
    Inline,
}

/// Outcomes are tagged with the generation that dispatched them; anything
/// dispatched before the last [`TaskRunner::invalidate`] is dropped on drain.
pub struct TaskRunner {
    backend: Arc<dyn Backend>,
    mode: RunMode,
    generation: u64,
    sender: Sender<(u64, TaskOutcome)>,
    receiver: Receiver<(u64, TaskOutcome)>,
}

impl TaskRunner {
    pub fn new(backend: Arc<dyn Backend>, mode: RunMode) -> Self {
        let (sender, receiver) = channel();
        Self {
            backend,
            mode,
            generation: 0,
            sender,
            receiver,
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn spawn(&self, task: Task) {
        debug!(task = task.name(), generation = self.generation, "dispatching task");
        let generation = self.generation;
        match self.mode {
            RunMode::Inline => {
                let outcome = execute(self.backend.as_ref(), task);
                let _ = self.sender.send((generation, outcome));
            }
            RunMode::Background => {
                let backend = Arc::clone(&self.backend);
                let sender = self.sender.clone();
                let spawned = thread::Builder::new()
                    .name("solicita-task".to_string())
                    .spawn(move || {
                        let outcome = execute(backend.as_ref(), task);
                        // The receiver only goes away on shutdown.
                        let _ = sender.send((generation, outcome));
                    });
                if let Err(e) = spawned {
                    warn!(error = %e, "could not start worker thread");
                }
            }
        }
    }

    /// Collects every current outcome that has arrived so far without waiting.
    pub fn drain(&self) -> Vec<TaskOutcome> {
        self.receiver
            .try_iter()
            .filter_map(|(generation, outcome)| {
                if generation == self.generation {
                    Some(outcome)
                } else {
                    debug!(generation, current = self.generation, "dropping stale outcome");
                    None
                }
            })
            .collect()
    }

    /// Disowns every task dispatched so far. Used on sign-out so work started
    /// for one user is never applied to the next.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        debug!(generation = self.generation, "task generation advanced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::RecordingBackend;
    use std::time::{Duration, Instant};

    #[test]
    fn test_inline_runner_delivers_in_order() {
        let runner = TaskRunner::new(Arc::new(RecordingBackend::default()), RunMode::Inline);
        runner.spawn(Task::ReferenceData);
        runner.spawn(Task::SearchClientes { seq: 3, query: "acme".to_string() });

        let outcomes = runner.drain();
        assert_eq!(outcomes.len(), 2);
        match &outcomes[0] {
            TaskOutcome::ReferenceData(Ok(data)) => {
                assert_eq!(data.declaraciones.len(), 1);
                assert_eq!(data.capacidades[0].capacidad_transporte_id, 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(outcomes[1], TaskOutcome::Clientes { seq: 3, result: Ok(_) }));
        assert!(runner.drain().is_empty());
    }

    #[test]
    fn test_background_runner() {
        let runner = TaskRunner::new(Arc::new(RecordingBackend::default()), RunMode::Background);
        runner.spawn(Task::StepCatalogs { solicitud_id: 5 });

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut outcomes = Vec::new();
        while outcomes.is_empty() && Instant::now() < deadline {
            outcomes = runner.drain();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(outcomes.as_slice(), [TaskOutcome::StepCatalogs(Ok(_))]));
    }

    #[test]
    fn test_invalidate_drops_pending_outcomes() {
        let mut runner = TaskRunner::new(Arc::new(RecordingBackend::default()), RunMode::Inline);
        runner.spawn(Task::ReferenceData);
        runner.invalidate();
        assert!(runner.drain().is_empty());

        runner.spawn(Task::ReferenceData);
        assert!(matches!(runner.drain().as_slice(), [TaskOutcome::ReferenceData(Ok(_))]));
    }

    #[test]
    fn test_login_outcome() {
        let backend = RecordingBackend::default();
        let outcome = execute(
            &backend,
            Task::Login(Credentials { email: "ana@acme.cl".to_string(), password: "nope".to_string() }),
        );
        assert!(matches!(outcome, TaskOutcome::Authenticated(Err(_))));
    }
}
