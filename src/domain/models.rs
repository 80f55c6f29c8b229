use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// The in-progress service request, exactly as the form holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDraft {
    pub usuario_id: Option<u64>,
    pub codigo_cliente_kunnr: Option<u64>,
    #[serde(rename = "clienteDisplay")]
    pub cliente_display: String,
    pub fecha_servicio_solicitada: String,
    pub hora_servicio_solicitada: String,
    pub descripcion: String,
    pub requiere_transporte: bool,
    pub direccion_id: Option<u64>,
    pub contacto_cliente_id: Option<u64>,
    pub declaracion_id: Option<u64>,
    pub generador_igual_cliente: bool,
    pub generador_id: Option<u64>,
    pub codigo_material_matnr: Option<u64>,
}

impl Default for RequestDraft {
    fn default() -> Self {
        Self {
            usuario_id: None,
            codigo_cliente_kunnr: None,
            cliente_display: String::new(),
            fecha_servicio_solicitada: String::new(),
            hora_servicio_solicitada: String::new(),
            descripcion: String::new(),
            requiere_transporte: false,
            direccion_id: None,
            contacto_cliente_id: None,
            declaracion_id: None,
            generador_igual_cliente: true,
            generador_id: None,
            codigo_material_matnr: None,
        }
    }
}

/// One step-2 residue line as typed; addressed by its position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidueRow {
    pub material: String,
    pub cantidad: String,
    pub unidad: String,
}

impl ResidueRow {
    pub fn is_blank(&self) -> bool {
        self.material.trim().is_empty()
            && self.cantidad.trim().is_empty()
            && self.unidad.trim().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.material.trim().is_empty()
            && !self.cantidad.trim().is_empty()
            && !self.unidad.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServicioInfo {
    pub material: String,
    pub cantidad: String,
    pub unidad: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransporteInfo {
    pub tipo_transporte: String,
    pub capacidad: String,
    pub unidad: String,
}

/// Step-2 branch chosen by `requiere_transporte`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceBranch {
    Servicio(ServicioInfo),
    Transporte(TransporteInfo),
}

impl ServiceBranch {
    pub fn for_transport(requiere_transporte: bool) -> Self {
        if requiere_transporte {
            ServiceBranch::Transporte(TransporteInfo::default())
        } else {
            ServiceBranch::Servicio(ServicioInfo::default())
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceBranch::Servicio(_) => "Service",
            ServiceBranch::Transporte(_) => "Transport",
        }
    }
}

// Payloads sent to the backend.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSolicitud {
    pub usuario_id: Option<u64>,
    pub codigo_cliente_kunnr: u64,
    pub fecha_servicio_solicitada: NaiveDate,
    #[serde(serialize_with = "serialize_hhmm")]
    pub hora_servicio_solicitada: NaiveTime,
    pub descripcion: String,
    pub requiere_transporte: bool,
    pub direccion_id: Option<u64>,
    pub contacto_cliente_id: Option<u64>,
    pub declaracion_id: Option<u64>,
    pub generador_igual_cliente: bool,
    /// `0` on the wire when the generator is the client itself.
    pub generador_id: u64,
    pub codigo_material_matnr: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialResiduo {
    pub solicitud_id: u64,
    pub codigo_material_matnr: u64,
    pub cantidad_declarada: f64,
    pub unidad_medida_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSolicitudServicio {
    pub solicitud_id: u64,
    pub codigo_material_matnr: u64,
    pub cantidad: f64,
    pub unidad_medida_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSolicitudTransporte {
    pub solicitud_id: u64,
    pub tipo_transporte_id: u64,
    pub capacidad_transporte_id: u64,
    pub unidad_medida_id: u64,
}

/// Validated step-2 branch ready to post.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchPayload {
    Servicio(NewSolicitudServicio),
    Transporte(NewSolicitudTransporte),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDireccion {
    pub codigo_cliente_kunnr: u64,
    pub calle: String,
    pub comuna: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewContacto {
    pub codigo_cliente_kunnr: u64,
    pub nombre: String,
    pub email: String,
    pub telefono: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub nombre: String,
    pub email: String,
    pub password: String,
}

// Records returned by the backend. Unknown fields are ignored, missing
// required fields are a malformed payload.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthGrant {
    pub token: String,
    pub usuario_id: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedSolicitud {
    pub solicitud_id: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cliente {
    pub codigo_cliente_kunnr: u64,
    pub nombre: String,
    #[serde(default)]
    pub sucursal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Direccion {
    pub direccion_id: u64,
    pub codigo_cliente_kunnr: u64,
    pub calle: String,
    #[serde(default)]
    pub comuna: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Contacto {
    pub contacto_cliente_id: u64,
    pub codigo_cliente_kunnr: u64,
    pub nombre: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Declaracion {
    pub declaracion_id: u64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Generador {
    pub generador_id: u64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MaterialCotizado {
    pub codigo_material_matnr: u64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnidadReferencial {
    pub unidad_medida_id: u64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TipoTransporte {
    pub tipo_transporte_id: u64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapacidadTransporte {
    pub capacidad_transporte_id: u64,
    pub nombre: String,
}

/// Anything that can be offered as an option in a select field.
///
/// Labels follow the `"<id> - <name>"` convention, so the numeric prefix
/// of a label always resolves back to the entry's id.
pub trait CatalogEntry {
    fn id(&self) -> u64;
    fn name(&self) -> String;

    fn label(&self) -> String {
        format!("{} - {}", self.id(), self.name())
    }
}

impl CatalogEntry for Cliente {
    fn id(&self) -> u64 {
        self.codigo_cliente_kunnr
    }

    fn name(&self) -> String {
        match &self.sucursal {
            Some(sucursal) if !sucursal.is_empty() => format!("{} - {}", self.nombre, sucursal),
            _ => self.nombre.clone(),
        }
    }
}

impl CatalogEntry for Direccion {
    fn id(&self) -> u64 {
        self.direccion_id
    }

    fn name(&self) -> String {
        match &self.comuna {
            Some(comuna) if !comuna.is_empty() => format!("{}, {}", self.calle, comuna),
            _ => self.calle.clone(),
        }
    }
}

impl CatalogEntry for Contacto {
    fn id(&self) -> u64 {
        self.contacto_cliente_id
    }

    fn name(&self) -> String {
        self.nombre.clone()
    }
}

macro_rules! catalog_entry {
    ($ty:ty, $id:ident) => {
        impl CatalogEntry for $ty {
            fn id(&self) -> u64 {
                self.$id
            }

            fn name(&self) -> String {
                self.nombre.clone()
            }
        }
    };
}

catalog_entry!(Declaracion, declaracion_id);
catalog_entry!(Generador, generador_id);
catalog_entry!(MaterialCotizado, codigo_material_matnr);
catalog_entry!(UnidadReferencial, unidad_medida_id);
catalog_entry!(TipoTransporte, tipo_transporte_id);
catalog_entry!(CapacidadTransporte, capacidad_transporte_id);

fn serialize_hhmm<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_defaults() {
        let draft = RequestDraft::default();
        assert!(draft.codigo_cliente_kunnr.is_none());
        assert!(draft.generador_igual_cliente);
        assert!(!draft.requiere_transporte);
        assert!(draft.direccion_id.is_none());
    }

    #[test]
    fn test_draft_uses_original_field_names() {
        let mut draft = RequestDraft::default();
        draft.cliente_display = "600141 - ACME".to_string();
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["clienteDisplay"], "600141 - ACME");
        assert!(json["direccion_id"].is_null());
    }

    #[test]
    fn test_draft_tolerates_missing_fields() {
        let draft: RequestDraft = serde_json::from_str(r#"{"descripcion":"retiro"}"#).unwrap();
        assert_eq!(draft.descripcion, "retiro");
        assert!(draft.generador_igual_cliente);
    }

    #[test]
    fn test_residue_row_blank_and_complete() {
        let blank = ResidueRow::default();
        assert!(blank.is_blank());
        assert!(!blank.is_complete());

        let partial = ResidueRow {
            material: "1001 - Aceite".to_string(),
            cantidad: " ".to_string(),
            unidad: String::new(),
        };
        assert!(!partial.is_blank());
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_catalog_labels() {
        let cliente = Cliente {
            codigo_cliente_kunnr: 600141,
            nombre: "ACME".to_string(),
            sucursal: Some("Sucursal Norte".to_string()),
        };
        assert_eq!(cliente.label(), "600141 - ACME - Sucursal Norte");

        let unidad = UnidadReferencial { unidad_medida_id: 3, nombre: "kg".to_string() };
        assert_eq!(unidad.label(), "3 - kg");
    }

    #[test]
    fn test_new_solicitud_serializes_time_as_hhmm() {
        let payload = NewSolicitud {
            usuario_id: Some(7),
            codigo_cliente_kunnr: 600141,
            fecha_servicio_solicitada: NaiveDate::from_ymd_opt(2030, 1, 2).unwrap(),
            hora_servicio_solicitada: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            descripcion: String::new(),
            requiere_transporte: false,
            direccion_id: None,
            contacto_cliente_id: None,
            declaracion_id: None,
            generador_igual_cliente: true,
            generador_id: 0,
            codigo_material_matnr: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["hora_servicio_solicitada"], "09:30");
        assert_eq!(json["fecha_servicio_solicitada"], "2030-01-02");
        assert_eq!(json["generador_id"], 0);
    }
}
