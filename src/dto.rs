//! Validation of inbound records before they enter the domain model.
//!
//! Payloads from the HTTP API and from local storage are parsed as untyped
//! [`serde_json::Value`]s first and only converted into [`Checklist`] or
//! [`ChecklistItem`] once every field has been checked. Nothing here does
//! I/O.

use serde_json::Value;

use crate::error::MappingError;
use crate::model::{Checklist, ChecklistItem};

const NON_EMPTY_STRING: &str = "a non-empty string";
const BOOLEAN: &str = "a boolean";

/// Map a checklist DTO into a [`Checklist`].
///
/// # Errors
///
/// Returns [`MappingError::Null`] for a JSON `null`, or
/// [`MappingError::InvalidField`] naming the first offending field.
pub fn checklist_from_dto(dto: &Value) -> Result<Checklist, MappingError> {
    if dto.is_null() {
        return Err(MappingError::Null);
    }
    Ok(Checklist {
        id: non_empty_string(dto, "checklist", "id")?,
        title: non_empty_string(dto, "checklist", "title")?,
    })
}

/// Map a checklist item DTO into a [`ChecklistItem`].
///
/// # Errors
///
/// Returns [`MappingError::Null`] for a JSON `null`, or
/// [`MappingError::InvalidField`] naming the first offending field.
pub fn item_from_dto(dto: &Value) -> Result<ChecklistItem, MappingError> {
    if dto.is_null() {
        return Err(MappingError::Null);
    }
    let id = non_empty_string(dto, "checklist item", "id")?;
    let checklist_id = non_empty_string(dto, "checklist item", "checklistId")?;
    let title = non_empty_string(dto, "checklist item", "title")?;
    let checked = dto
        .get("checked")
        .and_then(Value::as_bool)
        .ok_or(MappingError::InvalidField {
            entity: "checklist item",
            field: "checked",
            requirement: BOOLEAN,
        })?;

    Ok(ChecklistItem {
        id,
        checklist_id,
        title,
        checked,
    })
}

/// Map a JSON array of DTOs with `mapper`, failing on the first bad element.
///
/// # Errors
///
/// Returns [`MappingError::NotAnArray`] when `dtos` is not an array, or
/// [`MappingError::Element`] carrying the index of the element that failed.
pub fn map_dto_array<T>(
    dtos: &Value,
    mapper: impl Fn(&Value) -> Result<T, MappingError>,
) -> Result<Vec<T>, MappingError> {
    let elements = dtos.as_array().ok_or_else(|| MappingError::NotAnArray {
        found: json_type_name(dtos),
    })?;

    elements
        .iter()
        .enumerate()
        .map(|(index, dto)| {
            mapper(dto).map_err(|source| MappingError::Element {
                index,
                source: Box::new(source),
            })
        })
        .collect()
}

fn non_empty_string(
    dto: &Value,
    entity: &'static str,
    field: &'static str,
) -> Result<String, MappingError> {
    match dto.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_owned()),
        _ => Err(MappingError::InvalidField {
            entity,
            field,
            requirement: NON_EMPTY_STRING,
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
