//! Option lists that depend on the selected client.
//!
//! Addresses, contacts and client materials are re-fetched every time the
//! client changes. Each issued request carries a sequence number; a
//! response is applied only if it answers the latest request for its list,
//! so a slow answer for a previous client can never overwrite the lists of
//! the current one.

use crate::domain::{Contacto, Direccion, MaterialCotizado};
use crate::infrastructure::{ApiError, Backend};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Direcciones,
    Contactos,
    Materiales,
}

impl LookupKind {
    pub const ALL: [LookupKind; 3] = [
        LookupKind::Direcciones,
        LookupKind::Contactos,
        LookupKind::Materiales,
    ];

    fn slot(self) -> usize {
        match self {
            LookupKind::Direcciones => 0,
            LookupKind::Contactos => 1,
            LookupKind::Materiales => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupRequest {
    pub kind: LookupKind,
    pub seq: u64,
    pub codigo_cliente: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupData {
    Direcciones(Vec<Direccion>),
    Contactos(Vec<Contacto>),
    Materiales(Vec<MaterialCotizado>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupResponse {
    pub request: LookupRequest,
    pub result: Result<LookupData, ApiError>,
}

/// What applying a response did.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Applied,
    /// An answer to an older request; ignored.
    Stale,
    Failed(ApiError),
}

/// Runs one lookup against the backend. Contacts are filtered here since
/// the endpoint returns every contact the user can see.
pub fn fetch(backend: &dyn Backend, request: LookupRequest) -> LookupResponse {
    let codigo = request.codigo_cliente;
    let result = match request.kind {
        LookupKind::Direcciones => backend.direcciones(codigo).map(LookupData::Direcciones),
        LookupKind::Contactos => backend.contactos().map(|contactos| {
            LookupData::Contactos(
                contactos
                    .into_iter()
                    .filter(|c| c.codigo_cliente_kunnr == codigo)
                    .collect(),
            )
        }),
        LookupKind::Materiales => backend.materiales_cliente(codigo).map(LookupData::Materiales),
    };
    LookupResponse { request, result }
}

#[derive(Debug, Default)]
pub struct DependentLookups {
    pub direcciones: Vec<Direccion>,
    pub contactos: Vec<Contacto>,
    pub materiales: Vec<MaterialCotizado>,
    next_seq: u64,
    latest: [u64; 3],
    loading: [bool; 3],
}

impl DependentLookups {
    /// Starts over for a new client code.
    ///
    /// All three lists are emptied right away. With no client nothing is
    /// fetched; otherwise one request per list is returned for the caller
    /// to run, in any order and concurrently.
    pub fn refresh(&mut self, codigo_cliente: Option<u64>) -> Vec<LookupRequest> {
        self.direcciones.clear();
        self.contactos.clear();
        self.materiales.clear();

        // Bumping the fences also invalidates anything still in flight.
        let requests: Vec<LookupRequest> = LookupKind::ALL
            .iter()
            .map(|&kind| {
                self.next_seq += 1;
                self.latest[kind.slot()] = self.next_seq;
                self.loading[kind.slot()] = codigo_cliente.is_some();
                LookupRequest {
                    kind,
                    seq: self.next_seq,
                    codigo_cliente: codigo_cliente.unwrap_or_default(),
                }
            })
            .collect();

        match codigo_cliente {
            Some(codigo) => {
                debug!(codigo, "refreshing dependent lookups");
                requests
            }
            None => Vec::new(),
        }
    }

    pub fn apply(&mut self, response: LookupResponse) -> LookupOutcome {
        let LookupResponse { request, result } = response;
        let slot = request.kind.slot();
        if request.seq != self.latest[slot] {
            debug!(kind = ?request.kind, seq = request.seq, latest = self.latest[slot], "discarding stale lookup");
            return LookupOutcome::Stale;
        }
        self.loading[slot] = false;

        match result {
            Ok(LookupData::Direcciones(list)) => self.direcciones = list,
            Ok(LookupData::Contactos(list)) => self.contactos = list,
            Ok(LookupData::Materiales(list)) => self.materiales = list,
            Err(e) => return LookupOutcome::Failed(e),
        }
        LookupOutcome::Applied
    }

    pub fn is_loading(&self, kind: LookupKind) -> bool {
        self.loading[kind.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::RecordingBackend;

    fn direccion(id: u64, cliente: u64) -> Direccion {
        Direccion {
            direccion_id: id,
            codigo_cliente_kunnr: cliente,
            calle: format!("Calle {id}"),
            comuna: None,
        }
    }

    fn contacto(id: u64, cliente: u64) -> Contacto {
        Contacto {
            contacto_cliente_id: id,
            codigo_cliente_kunnr: cliente,
            nombre: format!("Contacto {id}"),
            email: None,
            telefono: None,
        }
    }

    fn backend() -> RecordingBackend {
        RecordingBackend {
            direcciones: vec![direccion(1, 600141), direccion(2, 600142)],
            contactos: vec![contacto(10, 600141), contacto(11, 600142), contacto(12, 600141)],
            materiales: vec![MaterialCotizado { codigo_material_matnr: 1001, nombre: "Aceite".to_string() }],
            ..RecordingBackend::default()
        }
    }

    #[test]
    fn test_refresh_without_client_clears_and_fetches_nothing() {
        let mut lookups = DependentLookups::default();
        lookups.direcciones.push(direccion(1, 600141));
        assert!(lookups.refresh(None).is_empty());
        assert!(lookups.direcciones.is_empty());
        assert!(!lookups.is_loading(LookupKind::Direcciones));
    }

    #[test]
    fn test_refresh_issues_one_request_per_list() {
        let mut lookups = DependentLookups::default();
        let requests = lookups.refresh(Some(600141));
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.codigo_cliente == 600141));
        assert!(LookupKind::ALL.iter().all(|&k| lookups.is_loading(k)));
    }

    #[test]
    fn test_fetch_and_apply() {
        let backend = backend();
        let mut lookups = DependentLookups::default();
        for request in lookups.refresh(Some(600141)) {
            assert_eq!(lookups.apply(fetch(&backend, request)), LookupOutcome::Applied);
        }
        assert_eq!(lookups.direcciones, vec![direccion(1, 600141)]);
        let ids: Vec<u64> = lookups.contactos.iter().map(|c| c.contacto_cliente_id).collect();
        assert_eq!(ids, vec![10, 12]);
        assert_eq!(lookups.materiales.len(), 1);
        assert!(!lookups.is_loading(LookupKind::Contactos));
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let backend = backend();
        let mut lookups = DependentLookups::default();
        let old = lookups.refresh(Some(600142));
        let new = lookups.refresh(Some(600141));

        // The newer request resolves first, the older one last.
        let newest = new.iter().find(|r| r.kind == LookupKind::Direcciones).copied().unwrap();
        assert_eq!(lookups.apply(fetch(&backend, newest)), LookupOutcome::Applied);
        let oldest = old.iter().find(|r| r.kind == LookupKind::Direcciones).copied().unwrap();
        assert_eq!(lookups.apply(fetch(&backend, oldest)), LookupOutcome::Stale);

        assert_eq!(lookups.direcciones, vec![direccion(1, 600141)]);
    }

    #[test]
    fn test_response_after_clearing_client_is_discarded() {
        let backend = backend();
        let mut lookups = DependentLookups::default();
        let requests = lookups.refresh(Some(600141));
        lookups.refresh(None);
        for request in requests {
            assert_eq!(lookups.apply(fetch(&backend, request)), LookupOutcome::Stale);
        }
        assert!(lookups.direcciones.is_empty());
    }

    #[test]
    fn test_failed_lookup() {
        let mut lookups = DependentLookups::default();
        let request = lookups.refresh(Some(1))[0];
        let outcome = lookups.apply(LookupResponse {
            request,
            result: Err(ApiError::Transport("down".to_string())),
        });
        assert!(matches!(outcome, LookupOutcome::Failed(ApiError::Transport(_))));
        assert!(!lookups.is_loading(request.kind));
    }
}
