//! Client-side validation and input coercion for the request wizard.
//!
//! Everything here is pure: functions take the form values as typed and
//! either produce the payload the backend expects or a [`ValidationError`]
//! explaining why the form cannot be sent yet. No function in this module
//! touches the network or the draft store.

use super::errors::{ValidationError, ValidationResult};
use super::models::{
    BranchPayload, MaterialResiduo, NewSolicitud, NewSolicitudServicio, NewSolicitudTransporte,
    RequestDraft, ResidueRow, ServiceBranch,
};
use chrono::{NaiveDate, NaiveTime, Timelike};

/// Separator between the numeric code and the human label of an option.
pub const LABEL_SEPARATOR: &str = " - ";

/// Minutes a service time must be a multiple of.
pub const SLOT_MINUTES: u32 = 15;

/// Coerces a numeric form field into a foreign key.
///
/// Empty, non-numeric and zero input all mean "nothing selected".
///
/// # Examples
///
/// ```
/// use solicita::domain::parse_id;
///
/// assert_eq!(parse_id("42"), Some(42));
/// assert_eq!(parse_id(""), None);
/// assert_eq!(parse_id("abc"), None);
/// assert_eq!(parse_id("0"), None);
/// ```
pub fn parse_id(input: &str) -> Option<u64> {
    match input.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}

/// Resolves the id of an option label such as `"600141 - ACME - Sucursal Norte"`.
///
/// Only the text before the first separator is considered, so a bare code
/// like `"600141"` resolves as well.
///
/// # Examples
///
/// ```
/// use solicita::domain::parse_label_id;
///
/// assert_eq!(parse_label_id("600141 - ACME - Sucursal Norte"), Some(600141));
/// assert_eq!(parse_label_id("ACME"), None);
/// ```
pub fn parse_label_id(label: &str) -> Option<u64> {
    let prefix = label.split(LABEL_SEPARATOR).next().unwrap_or_default();
    parse_id(prefix)
}

/// Resolves the client code from the autocomplete text.
///
/// Unlike [`parse_label_id`] a bare number is not a code: the user may
/// still be typing a search query. Only a full label resolves.
///
/// # Examples
///
/// ```
/// use solicita::domain::parse_client_code;
///
/// assert_eq!(parse_client_code("600141 - ACME"), Some(600141));
/// assert_eq!(parse_client_code("6001"), None);
/// ```
pub fn parse_client_code(text: &str) -> Option<u64> {
    if text.contains(LABEL_SEPARATOR) {
        parse_label_id(text)
    } else {
        None
    }
}

/// Parses a declared quantity. Accepts a decimal comma and must be positive.
pub fn parse_quantity(input: &str) -> Option<f64> {
    let normalized = input.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => None,
    }
}

/// Parses the requested service date and checks it is not before `today`.
pub fn validate_service_date(input: &str, today: NaiveDate) -> ValidationResult<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::ServiceDateMissing);
    }
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidServiceDate(trimmed.to_string()))?;
    if date < today {
        return Err(ValidationError::ServiceDateInPast { date, today });
    }
    Ok(date)
}

/// Parses the requested service time.
///
/// The time must be on a quarter hour and lie within 08:00 and 18:00,
/// both inclusive.
///
/// # Examples
///
/// ```
/// use solicita::domain::validate_service_time;
///
/// assert!(validate_service_time("08:00").is_ok());
/// assert!(validate_service_time("08:05").is_err());
/// assert!(validate_service_time("18:15").is_err());
/// ```
pub fn validate_service_time(input: &str) -> ValidationResult<NaiveTime> {
    let trimmed = input.trim();
    let time = NaiveTime::parse_from_str(trimmed, "%H:%M")
        .map_err(|_| ValidationError::InvalidServiceTime(trimmed.to_string()))?;

    if time.minute() % SLOT_MINUTES != 0 {
        return Err(ValidationError::ServiceTimeOffGrid(trimmed.to_string()));
    }

    let opens = NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default();
    let closes = NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default();
    if time < opens || time > closes {
        return Err(ValidationError::ServiceTimeOutOfRange(trimmed.to_string()));
    }

    Ok(time)
}

/// Checks a step-1 draft and builds the request payload from it.
///
/// Rules, in the order they are reported:
/// - the service date is today or later (date only)
/// - the service time is on the 15-minute grid within 08:00–18:00
/// - an address is selected when transport is requested
/// - a client is selected
/// - a generator is selected unless it is the client itself
///
/// # Errors
///
/// Returns the first rule the draft violates.
pub fn validate_request(draft: &RequestDraft, today: NaiveDate) -> ValidationResult<NewSolicitud> {
    let fecha = validate_service_date(&draft.fecha_servicio_solicitada, today)?;
    let hora = validate_service_time(&draft.hora_servicio_solicitada)?;

    if draft.requiere_transporte && draft.direccion_id.is_none() {
        return Err(ValidationError::AddressRequired);
    }

    let cliente = draft
        .codigo_cliente_kunnr
        .ok_or(ValidationError::ClientRequired)?;

    let generador_id = if draft.generador_igual_cliente {
        0
    } else {
        draft.generador_id.ok_or(ValidationError::GeneratorRequired)?
    };

    Ok(NewSolicitud {
        usuario_id: draft.usuario_id,
        codigo_cliente_kunnr: cliente,
        fecha_servicio_solicitada: fecha,
        hora_servicio_solicitada: hora,
        descripcion: draft.descripcion.trim().to_string(),
        requiere_transporte: draft.requiere_transporte,
        direccion_id: if draft.requiere_transporte { draft.direccion_id } else { None },
        contacto_cliente_id: draft.contacto_cliente_id,
        declaracion_id: draft.declaracion_id,
        generador_igual_cliente: draft.generador_igual_cliente,
        generador_id,
        codigo_material_matnr: draft.codigo_material_matnr,
    })
}

/// Checks the step-2 residue rows and parses every populated one.
///
/// Blank rows are skipped. The returned lines keep their row index and
/// are ordered as the rows are.
///
/// # Errors
///
/// - [`ValidationError::IncompleteResidueLine`] for a partially filled row
/// - [`ValidationError::InvalidResidueLine`] for a value that does not parse
/// - [`ValidationError::NoResidueLines`] when every row is blank
pub fn validate_residue_rows(
    rows: &[ResidueRow],
    solicitud_id: u64,
) -> ValidationResult<Vec<(usize, MaterialResiduo)>> {
    let mut lines = Vec::new();

    for (row, line) in rows.iter().enumerate() {
        if line.is_blank() {
            continue;
        }
        if !line.is_complete() {
            return Err(ValidationError::IncompleteResidueLine { row });
        }

        let invalid = |field: &'static str, value: &str| ValidationError::InvalidResidueLine {
            row,
            field,
            value: value.trim().to_string(),
        };

        let codigo_material_matnr =
            parse_label_id(&line.material).ok_or_else(|| invalid("material", &line.material))?;
        let cantidad_declarada =
            parse_quantity(&line.cantidad).ok_or_else(|| invalid("quantity", &line.cantidad))?;
        let unidad_medida_id =
            parse_label_id(&line.unidad).ok_or_else(|| invalid("unit", &line.unidad))?;

        lines.push((
            row,
            MaterialResiduo {
                solicitud_id,
                codigo_material_matnr,
                cantidad_declarada,
                unidad_medida_id,
            },
        ));
    }

    if lines.is_empty() {
        return Err(ValidationError::NoResidueLines);
    }
    Ok(lines)
}

/// Checks the active step-2 branch and builds its payload.
pub fn validate_branch(branch: &ServiceBranch, solicitud_id: u64) -> ValidationResult<BranchPayload> {
    let missing = |field: &'static str| ValidationError::IncompleteBranch {
        branch: branch.name(),
        field,
    };

    match branch {
        ServiceBranch::Servicio(info) => Ok(BranchPayload::Servicio(NewSolicitudServicio {
            solicitud_id,
            codigo_material_matnr: parse_label_id(&info.material).ok_or_else(|| missing("material"))?,
            cantidad: parse_quantity(&info.cantidad).ok_or_else(|| missing("quantity"))?,
            unidad_medida_id: parse_label_id(&info.unidad).ok_or_else(|| missing("unit"))?,
        })),
        ServiceBranch::Transporte(info) => Ok(BranchPayload::Transporte(NewSolicitudTransporte {
            solicitud_id,
            tipo_transporte_id: parse_label_id(&info.tipo_transporte)
                .ok_or_else(|| missing("transport type"))?,
            capacidad_transporte_id: parse_label_id(&info.capacidad)
                .ok_or_else(|| missing("capacity"))?,
            unidad_medida_id: parse_label_id(&info.unidad).ok_or_else(|| missing("unit"))?,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ServicioInfo, TransporteInfo};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn valid_draft() -> RequestDraft {
        RequestDraft {
            usuario_id: Some(7),
            codigo_cliente_kunnr: Some(600141),
            cliente_display: "600141 - ACME".to_string(),
            fecha_servicio_solicitada: "2026-10-20".to_string(),
            hora_servicio_solicitada: "09:15".to_string(),
            ..RequestDraft::default()
        }
    }

    fn row(material: &str, cantidad: &str, unidad: &str) -> ResidueRow {
        ResidueRow {
            material: material.to_string(),
            cantidad: cantidad.to_string(),
            unidad: unidad.to_string(),
        }
    }

    #[test]
    fn test_parse_id_coercion() {
        assert_eq!(parse_id(" 17 "), Some(17));
        assert_eq!(parse_id(""), None);
        assert_eq!(parse_id("12a"), None);
        assert_eq!(parse_id("-3"), None);
        assert_eq!(parse_id("0"), None);
    }

    #[test]
    fn test_parse_label_id() {
        assert_eq!(parse_label_id("600141 - ACME - Sucursal Norte"), Some(600141));
        assert_eq!(parse_label_id("600141"), Some(600141));
        assert_eq!(parse_label_id("6001"), Some(6001));
        assert_eq!(parse_label_id("ACME - 600141"), None);
        assert_eq!(parse_label_id(""), None);
    }

    #[test]
    fn test_parse_client_code_needs_full_label() {
        assert_eq!(parse_client_code("600141 - ACME - Sucursal Norte"), Some(600141));
        assert_eq!(parse_client_code("600141 - "), Some(600141));
        assert_eq!(parse_client_code("600141"), None);
        assert_eq!(parse_client_code("600141 -"), None);
        assert_eq!(parse_client_code("ACME - Norte"), None);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("12.5"), Some(12.5));
        assert_eq!(parse_quantity("12,5"), Some(12.5));
        assert_eq!(parse_quantity("0"), None);
        assert_eq!(parse_quantity("-1"), None);
        assert_eq!(parse_quantity("NaN"), None);
        assert_eq!(parse_quantity("inf"), None);
        assert_eq!(parse_quantity("mucho"), None);
    }

    #[test]
    fn test_service_time_grid() {
        for accepted in ["08:00", "08:15", "12:30", "17:45", "18:00"] {
            assert!(validate_service_time(accepted).is_ok(), "{accepted} should be accepted");
        }
        assert_eq!(
            validate_service_time("08:05"),
            Err(ValidationError::ServiceTimeOffGrid("08:05".to_string()))
        );
        assert_eq!(
            validate_service_time("18:15"),
            Err(ValidationError::ServiceTimeOutOfRange("18:15".to_string()))
        );
        assert_eq!(
            validate_service_time("07:45"),
            Err(ValidationError::ServiceTimeOutOfRange("07:45".to_string()))
        );
        assert!(matches!(
            validate_service_time("9am"),
            Err(ValidationError::InvalidServiceTime(_))
        ));
        assert!(matches!(
            validate_service_time(""),
            Err(ValidationError::InvalidServiceTime(_))
        ));
    }

    #[test]
    fn test_service_date_not_in_past() {
        assert!(validate_service_date("2026-10-19", today()).is_ok());
        assert!(validate_service_date("2027-01-01", today()).is_ok());
        assert!(matches!(
            validate_service_date("2026-10-18", today()),
            Err(ValidationError::ServiceDateInPast { .. })
        ));
        assert_eq!(validate_service_date("  ", today()), Err(ValidationError::ServiceDateMissing));
        assert!(matches!(
            validate_service_date("19/10/2026", today()),
            Err(ValidationError::InvalidServiceDate(_))
        ));
    }

    #[test]
    fn test_validate_request_success() {
        let payload = validate_request(&valid_draft(), today()).unwrap();
        assert_eq!(payload.codigo_cliente_kunnr, 600141);
        assert_eq!(payload.generador_id, 0);
        assert_eq!(payload.usuario_id, Some(7));
        assert!(payload.direccion_id.is_none());
    }

    #[test]
    fn test_transport_requires_address() {
        let mut draft = valid_draft();
        draft.requiere_transporte = true;
        assert_eq!(validate_request(&draft, today()), Err(ValidationError::AddressRequired));

        draft.direccion_id = Some(55);
        let payload = validate_request(&draft, today()).unwrap();
        assert_eq!(payload.direccion_id, Some(55));
    }

    #[test]
    fn test_address_not_required_without_transport() {
        let mut draft = valid_draft();
        draft.requiere_transporte = false;
        draft.direccion_id = None;
        assert!(validate_request(&draft, today()).is_ok());
    }

    #[test]
    fn test_client_and_generator_required() {
        let mut draft = valid_draft();
        draft.codigo_cliente_kunnr = None;
        assert_eq!(validate_request(&draft, today()), Err(ValidationError::ClientRequired));

        let mut draft = valid_draft();
        draft.generador_igual_cliente = false;
        assert_eq!(validate_request(&draft, today()), Err(ValidationError::GeneratorRequired));

        draft.generador_id = Some(9);
        assert_eq!(validate_request(&draft, today()).unwrap().generador_id, 9);
    }

    #[test]
    fn test_residue_rows_all_blank_rejected() {
        let rows = vec![ResidueRow::default(), ResidueRow::default()];
        assert_eq!(validate_residue_rows(&rows, 1), Err(ValidationError::NoResidueLines));
        assert_eq!(validate_residue_rows(&[], 1), Err(ValidationError::NoResidueLines));
    }

    #[test]
    fn test_residue_rows_keep_order_and_skip_blanks() {
        let rows = vec![
            row("1001 - Aceite usado", "10", "3 - kg"),
            ResidueRow::default(),
            row("1002 - Baterias", "2,5", "4"),
        ];
        let lines = validate_residue_rows(&rows, 88).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, 0);
        assert_eq!(lines[0].1.codigo_material_matnr, 1001);
        assert_eq!(lines[0].1.unidad_medida_id, 3);
        assert_eq!(lines[1].0, 2);
        assert_eq!(lines[1].1.cantidad_declarada, 2.5);
        assert!(lines.iter().all(|(_, line)| line.solicitud_id == 88));
    }

    #[test]
    fn test_residue_rows_partial_and_invalid() {
        let rows = vec![row("1001 - Aceite", "", "")];
        assert_eq!(
            validate_residue_rows(&rows, 1),
            Err(ValidationError::IncompleteResidueLine { row: 0 })
        );

        let rows = vec![row("Aceite", "1", "3")];
        assert!(matches!(
            validate_residue_rows(&rows, 1),
            Err(ValidationError::InvalidResidueLine { row: 0, field: "material", .. })
        ));

        let rows = vec![ResidueRow::default(), row("1001", "uno", "3")];
        assert!(matches!(
            validate_residue_rows(&rows, 1),
            Err(ValidationError::InvalidResidueLine { row: 1, field: "quantity", .. })
        ));
    }

    #[test]
    fn test_validate_branch() {
        let servicio = ServiceBranch::Servicio(ServicioInfo {
            material: "2001 - Retiro".to_string(),
            cantidad: "1".to_string(),
            unidad: "5 - unidad".to_string(),
        });
        assert!(matches!(
            validate_branch(&servicio, 3),
            Ok(BranchPayload::Servicio(NewSolicitudServicio { codigo_material_matnr: 2001, .. }))
        ));

        let transporte = ServiceBranch::Transporte(TransporteInfo {
            tipo_transporte: "1 - Camion".to_string(),
            capacidad: String::new(),
            unidad: "3".to_string(),
        });
        assert_eq!(
            validate_branch(&transporte, 3),
            Err(ValidationError::IncompleteBranch { branch: "Transport", field: "capacity" })
        );
    }
}
