//! In-memory backend for unit tests.

use crate::domain::*;
use crate::infrastructure::{ApiError, ApiResult, Backend};
use std::sync::Mutex;

/// Records every call and answers from canned data.
#[derive(Default)]
pub struct RecordingBackend {
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) token: Mutex<Option<String>>,
    pub solicitud_id: u64,
    pub direcciones: Vec<Direccion>,
    pub contactos: Vec<Contacto>,
    pub materiales: Vec<MaterialCotizado>,
    pub clientes: Vec<Cliente>,
    /// Material create-calls fail starting with this call number (0-based).
    pub fail_material_from: Option<usize>,
    pub fail_solicitud: Option<ApiError>,
    pub(crate) materials_posted: Mutex<Vec<MaterialResiduo>>,
    pub(crate) material_attempts: Mutex<usize>,
}

impl RecordingBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    pub fn materials_posted(&self) -> Vec<MaterialResiduo> {
        self.materials_posted.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn server_error(endpoint: &str) -> ApiError {
    ApiError::Status {
        endpoint: endpoint.to_string(),
        status: 500,
        body: "boom".to_string(),
    }
}

impl Backend for RecordingBackend {
    fn authorize(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    fn login(&self, credentials: &Credentials) -> ApiResult<AuthGrant> {
        self.record(format!("login {}", credentials.email));
        if credentials.password == "secret" {
            Ok(AuthGrant { token: "tok-1".to_string(), usuario_id: 7 })
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    fn register(&self, registration: &Registration) -> ApiResult<AuthGrant> {
        self.record(format!("register {}", registration.email));
        Ok(AuthGrant { token: "tok-new".to_string(), usuario_id: 8 })
    }

    fn search_clientes(&self, query: &str, _limit: u32, _offset: u32) -> ApiResult<Vec<Cliente>> {
        self.record(format!("search_clientes {query}"));
        Ok(self.clientes.clone())
    }

    fn direcciones(&self, codigo_cliente: u64) -> ApiResult<Vec<Direccion>> {
        self.record(format!("direcciones {codigo_cliente}"));
        Ok(self
            .direcciones
            .iter()
            .filter(|d| d.codigo_cliente_kunnr == codigo_cliente)
            .cloned()
            .collect())
    }

    fn contactos(&self) -> ApiResult<Vec<Contacto>> {
        self.record("contactos".to_string());
        Ok(self.contactos.clone())
    }

    fn materiales_cliente(&self, codigo_cliente: u64) -> ApiResult<Vec<MaterialCotizado>> {
        self.record(format!("materiales_cliente {codigo_cliente}"));
        Ok(self.materiales.clone())
    }

    fn declaraciones(&self) -> ApiResult<Vec<Declaracion>> {
        self.record("declaraciones".to_string());
        Ok(vec![Declaracion { declaracion_id: 1, nombre: "DS 148".to_string() }])
    }

    fn generadores(&self) -> ApiResult<Vec<Generador>> {
        self.record("generadores".to_string());
        Ok(vec![Generador { generador_id: 31, nombre: "Planta Sur".to_string() }])
    }

    fn unidades(&self) -> ApiResult<Vec<UnidadReferencial>> {
        self.record("unidades".to_string());
        Ok(vec![UnidadReferencial { unidad_medida_id: 3, nombre: "kg".to_string() }])
    }

    fn tipos_transporte(&self) -> ApiResult<Vec<TipoTransporte>> {
        self.record("tipos_transporte".to_string());
        Ok(vec![TipoTransporte { tipo_transporte_id: 1, nombre: "Camion".to_string() }])
    }

    fn capacidades_transporte(&self) -> ApiResult<Vec<CapacidadTransporte>> {
        self.record("capacidades_transporte".to_string());
        Ok(vec![CapacidadTransporte { capacidad_transporte_id: 2, nombre: "10 m3".to_string() }])
    }

    fn materiales_residuos(&self, solicitud_id: u64) -> ApiResult<Vec<MaterialCotizado>> {
        self.record(format!("materiales_residuos {solicitud_id}"));
        Ok(self.materiales.clone())
    }

    fn materiales_servicios(&self, solicitud_id: u64) -> ApiResult<Vec<MaterialCotizado>> {
        self.record(format!("materiales_servicios {solicitud_id}"));
        Ok(self.materiales.clone())
    }

    fn create_solicitud(&self, solicitud: &NewSolicitud) -> ApiResult<u64> {
        self.record(format!("create_solicitud {}", solicitud.codigo_cliente_kunnr));
        match &self.fail_solicitud {
            Some(error) => Err(error.clone()),
            None => Ok(self.solicitud_id),
        }
    }

    fn create_solicitud_material(&self, line: &MaterialResiduo) -> ApiResult<()> {
        self.record(format!("create_material {}", line.codigo_material_matnr));
        let mut attempts = self.material_attempts.lock().unwrap();
        let attempt = *attempts;
        *attempts += 1;
        if self.fail_material_from.is_some_and(|from| attempt >= from) {
            return Err(server_error("/solicitud_materiales"));
        }
        self.materials_posted.lock().unwrap().push(line.clone());
        Ok(())
    }

    fn create_solicitud_servicio(&self, servicio: &NewSolicitudServicio) -> ApiResult<()> {
        self.record(format!("create_servicio {}", servicio.codigo_material_matnr));
        Ok(())
    }

    fn create_solicitud_transporte(&self, transporte: &NewSolicitudTransporte) -> ApiResult<()> {
        self.record(format!("create_transporte {}", transporte.tipo_transporte_id));
        Ok(())
    }

    fn create_direccion(&self, direccion: &NewDireccion) -> ApiResult<Direccion> {
        self.record(format!("create_direccion {}", direccion.calle));
        Ok(Direccion {
            direccion_id: 99,
            codigo_cliente_kunnr: direccion.codigo_cliente_kunnr,
            calle: direccion.calle.clone(),
            comuna: Some(direccion.comuna.clone()),
        })
    }

    fn create_contacto(&self, contacto: &NewContacto) -> ApiResult<Contacto> {
        self.record(format!("create_contacto {}", contacto.nombre));
        Ok(Contacto {
            contacto_cliente_id: 77,
            codigo_cliente_kunnr: contacto.codigo_cliente_kunnr,
            nombre: contacto.nombre.clone(),
            email: Some(contacto.email.clone()),
            telefono: Some(contacto.telefono.clone()),
        })
    }
}
