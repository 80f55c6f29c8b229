//! REST collaborator for the request wizard.
//!
//! [`Backend`] is the seam the application layer talks to; [`HttpBackend`]
//! is the real implementation over `reqwest`'s blocking client. Every
//! response body is parsed into a typed record at this boundary, and a body
//! that does not match its schema is reported as [`ApiError::Malformed`]
//! rather than being passed on half-filled.

use crate::domain::{
    AuthGrant, CapacidadTransporte, Cliente, Contacto, CreatedSolicitud, Credentials, Declaracion,
    Direccion, Generador, MaterialCotizado, MaterialResiduo, NewContacto, NewDireccion,
    NewSolicitud, NewSolicitudServicio, NewSolicitudTransporte, Registration, TipoTransporte,
    UnidadReferencial,
};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("Could not reach the server: {0}")]
    Transport(String),
    #[error("Session expired or not authorized")]
    Unauthorized,
    #[error("Server answered {status} on {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("Unexpected response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Page size used for client autocomplete searches.
pub const CLIENT_SEARCH_LIMIT: u32 = 20;

/// Everything the client needs from the server.
pub trait Backend: Send + Sync {
    /// Attaches (or with `None`, removes) the bearer token sent on every request.
    fn authorize(&self, token: Option<String>);

    fn login(&self, credentials: &Credentials) -> ApiResult<AuthGrant>;
    fn register(&self, registration: &Registration) -> ApiResult<AuthGrant>;

    fn search_clientes(&self, query: &str, limit: u32, offset: u32) -> ApiResult<Vec<Cliente>>;
    fn direcciones(&self, codigo_cliente: u64) -> ApiResult<Vec<Direccion>>;
    fn contactos(&self) -> ApiResult<Vec<Contacto>>;
    fn materiales_cliente(&self, codigo_cliente: u64) -> ApiResult<Vec<MaterialCotizado>>;

    fn declaraciones(&self) -> ApiResult<Vec<Declaracion>>;
    fn generadores(&self) -> ApiResult<Vec<Generador>>;
    fn unidades(&self) -> ApiResult<Vec<UnidadReferencial>>;
    fn tipos_transporte(&self) -> ApiResult<Vec<TipoTransporte>>;
    fn capacidades_transporte(&self) -> ApiResult<Vec<CapacidadTransporte>>;
    fn materiales_residuos(&self, solicitud_id: u64) -> ApiResult<Vec<MaterialCotizado>>;
    fn materiales_servicios(&self, solicitud_id: u64) -> ApiResult<Vec<MaterialCotizado>>;

    fn create_solicitud(&self, solicitud: &NewSolicitud) -> ApiResult<u64>;
    fn create_solicitud_material(&self, line: &MaterialResiduo) -> ApiResult<()>;
    fn create_solicitud_servicio(&self, servicio: &NewSolicitudServicio) -> ApiResult<()>;
    fn create_solicitud_transporte(&self, transporte: &NewSolicitudTransporte) -> ApiResult<()>;
    fn create_direccion(&self, direccion: &NewDireccion) -> ApiResult<Direccion>;
    fn create_contacto(&self, contacto: &NewContacto) -> ApiResult<Contacto>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().ok().and_then(|token| token.clone());
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<T> {
        debug!(path, "GET");
        let request = self.with_auth(self.client.get(self.url(path)).query(query));
        self.execute(path, request)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        debug!(path, "POST");
        let request = self.with_auth(self.client.post(self.url(path)).json(body));
        self.execute(path, request)
    }

    /// POST where only success matters; the response body is not inspected.
    fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> ApiResult<()> {
        debug!(path, "POST");
        let request = self.with_auth(self.client.post(self.url(path)).json(body));
        self.send(path, request).map(|_| ())
    }

    fn send(&self, endpoint: &str, request: RequestBuilder) -> ApiResult<String> {
        let response = request.send().map_err(|e| {
            error!(endpoint, error = %e, "request failed");
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            error!(endpoint, status = status.as_u16(), "not authorized");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            error!(endpoint, status = status.as_u16(), "server rejected request");
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn execute<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> ApiResult<T> {
        let body = self.send(endpoint, request)?;
        decode(endpoint, &body)
    }
}

/// Parses a response body against its expected schema.
pub fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|e| {
        error!(endpoint, error = %e, "malformed response");
        ApiError::Malformed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    })
}

impl Backend for HttpBackend {
    fn authorize(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    fn login(&self, credentials: &Credentials) -> ApiResult<AuthGrant> {
        self.post("/auth/login", credentials)
    }

    fn register(&self, registration: &Registration) -> ApiResult<AuthGrant> {
        self.post("/auth/register", registration)
    }

    fn search_clientes(&self, query: &str, limit: u32, offset: u32) -> ApiResult<Vec<Cliente>> {
        self.get(
            "/usuarios/clientes/asociados",
            &[
                ("q", query.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
    }

    fn direcciones(&self, codigo_cliente: u64) -> ApiResult<Vec<Direccion>> {
        self.get(&format!("/direcciones_cliente/cliente/{codigo_cliente}"), &[])
    }

    fn contactos(&self) -> ApiResult<Vec<Contacto>> {
        self.get("/contactos_clientes", &[])
    }

    fn materiales_cliente(&self, codigo_cliente: u64) -> ApiResult<Vec<MaterialCotizado>> {
        self.get(&format!("/materiales_cotizados/cliente/{codigo_cliente}"), &[])
    }

    fn declaraciones(&self) -> ApiResult<Vec<Declaracion>> {
        self.get("/declaraciones", &[])
    }

    fn generadores(&self) -> ApiResult<Vec<Generador>> {
        self.get("/generadores", &[])
    }

    fn unidades(&self) -> ApiResult<Vec<UnidadReferencial>> {
        self.get("/unidadesReferenciales", &[])
    }

    fn tipos_transporte(&self) -> ApiResult<Vec<TipoTransporte>> {
        self.get("/tiposTransporte", &[])
    }

    fn capacidades_transporte(&self) -> ApiResult<Vec<CapacidadTransporte>> {
        self.get("/capacidadesTransporte", &[])
    }

    fn materiales_residuos(&self, solicitud_id: u64) -> ApiResult<Vec<MaterialCotizado>> {
        self.get(&format!("/materiales_cotizados/residuos/{solicitud_id}"), &[])
    }

    fn materiales_servicios(&self, solicitud_id: u64) -> ApiResult<Vec<MaterialCotizado>> {
        self.get(&format!("/materiales_cotizados/servicios/{solicitud_id}"), &[])
    }

    fn create_solicitud(&self, solicitud: &NewSolicitud) -> ApiResult<u64> {
        let created: CreatedSolicitud = self.post("/solicitudes", solicitud)?;
        Ok(created.solicitud_id)
    }

    fn create_solicitud_material(&self, line: &MaterialResiduo) -> ApiResult<()> {
        self.post_unit("/solicitud_materiales", line)
    }

    fn create_solicitud_servicio(&self, servicio: &NewSolicitudServicio) -> ApiResult<()> {
        self.post_unit("/solicitud_servicios", servicio)
    }

    fn create_solicitud_transporte(&self, transporte: &NewSolicitudTransporte) -> ApiResult<()> {
        self.post_unit("/solicitud_transportes", transporte)
    }

    fn create_direccion(&self, direccion: &NewDireccion) -> ApiResult<Direccion> {
        self.post("/direcciones_cliente", direccion)
    }

    fn create_contacto(&self, contacto: &NewContacto) -> ApiResult<Contacto> {
        self.post("/contactos_clientes", contacto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_typed_records() {
        let body = r#"[{"direccion_id": 3, "codigo_cliente_kunnr": 600141, "calle": "Av. Norte 100", "extra": true}]"#;
        let direcciones: Vec<Direccion> = decode("/direcciones_cliente/cliente/600141", body).unwrap();
        assert_eq!(direcciones.len(), 1);
        assert_eq!(direcciones[0].direccion_id, 3);
        assert!(direcciones[0].comuna.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let body = r#"{"ok": true}"#;
        let result: ApiResult<CreatedSolicitud> = decode("/solicitudes", body);
        assert!(matches!(
            result,
            Err(ApiError::Malformed { ref endpoint, .. }) if endpoint == "/solicitudes"
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        let body = r#"[{"declaracion_id": "uno", "nombre": "DS 148"}]"#;
        let result: ApiResult<Vec<Declaracion>> = decode("/declaraciones", body);
        assert!(matches!(result, Err(ApiError::Malformed { .. })));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:3000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.url("/solicitudes"), "http://localhost:3000/api/solicitudes");
    }
}
