//! A JSON-schema-shaped payload validator driven entirely by the model
//! registry, grounded in the reference codebase's `DefaultSchema`: rather
//! than hand-writing a JSON Schema document per action, required/optional
//! property lists are checked against the model's own field descriptors so
//! the two can never drift apart.

use crate::model::{Field, Model};
use crate::patterns::{Collection, FqId};
use crate::value::{FieldValue, Instance};
use crate::Error;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Parses and type-checks one payload object against `model`'s fields.
///
/// `allowed` restricts which field names may appear (an action's declared
/// required + optional properties); `required` must all be present. `id`,
/// when present in `raw`, is extracted separately rather than treated as a
/// model field.
pub fn parse_instance(
    model: &Model,
    raw: &Json,
    allowed: &[&str],
    required: &[&str],
) -> Result<(Option<u64>, Instance), Error> {
    let object = raw
        .as_object()
        .ok_or_else(|| Error::schema("Payload item must be a JSON object".to_string()))?;

    for name in required {
        if !object.contains_key(*name) {
            return Err(Error::schema(format!("Missing required field '{}'", name)));
        }
    }

    let id = match object.get("id") {
        Some(v) => Some(
            v.as_u64()
                .ok_or_else(|| Error::schema("'id' must be a non-negative integer".to_string()))?,
        ),
        None => None,
    };

    let mut instance = Instance::new();
    for (key, value) in object {
        if key == "id" {
            continue;
        }
        if !allowed.is_empty() && !allowed.contains(&key.as_str()) {
            return Err(Error::schema(format!("Field '{}' is not allowed for this action", key)));
        }
        if let Some(field) = model.field(key) {
            instance.insert(key.clone(), json_to_field_value(field, value)?);
            continue;
        }
        if let Some((field, _token)) = model.match_template_field(key) {
            instance.insert(key.clone(), json_to_field_value(field, value)?);
            continue;
        }
        return Err(Error::schema(format!("Unknown field '{}' on {}", key, model.collection)));
    }
    Ok((id, instance))
}

fn json_to_field_value(field: &Field, value: &Json) -> Result<FieldValue, Error> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    match &field.relation {
        None => Ok(FieldValue::Scalar(value.clone())),
        Some(relation) => {
            if relation.generic {
                if relation.relation_type.is_single_valued() {
                    let s = value
                        .as_str()
                        .ok_or_else(|| Error::schema(format!("Field '{}' must be an fqid string", field.name)))?;
                    Ok(FieldValue::Fqid(FqId::from_str(s)?))
                } else {
                    let items = value
                        .as_array()
                        .ok_or_else(|| Error::schema(format!("Field '{}' must be a list of fqid strings", field.name)))?;
                    let fqids = items
                        .iter()
                        .map(|item| {
                            item.as_str()
                                .ok_or_else(|| Error::schema(format!("Field '{}' must contain fqid strings", field.name)))
                                .and_then(|s| FqId::from_str(s))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(FieldValue::FqidList(fqids))
                }
            } else if relation.relation_type.is_single_valued() {
                let id = value
                    .as_u64()
                    .ok_or_else(|| Error::schema(format!("Field '{}' must be an integer id", field.name)))?;
                Ok(FieldValue::Id(id))
            } else {
                let items = value
                    .as_array()
                    .ok_or_else(|| Error::schema(format!("Field '{}' must be a list of integer ids", field.name)))?;
                let ids = items
                    .iter()
                    .map(|item| item.as_u64().ok_or_else(|| Error::schema(format!("Field '{}' must contain integer ids", field.name))))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldValue::IdList(ids))
            }
        }
    }
}

/// Fills in model-declared defaults for fields absent from `instance`.
pub fn apply_defaults(model: &Model, instance: &mut Instance) {
    for field in &model.fields {
        if !instance.contains_key(field.name) {
            if let Some(default) = &field.default {
                instance.insert(field.name.to_string(), default.clone());
            } else if field.relation.as_ref().map_or(false, |r| !r.relation_type.is_single_valued()) {
                instance.insert(field.name.to_string(), empty_list_for(field));
            }
        }
    }
}

fn empty_list_for(field: &Field) -> FieldValue {
    match &field.relation {
        Some(r) if r.generic => FieldValue::FqidList(vec![]),
        _ => FieldValue::IdList(vec![]),
    }
}

/// Converts a parsed instance's fields back into the raw JSON a write event
/// carries on the wire.
pub fn instance_to_json_fields(instance: &Instance) -> BTreeMap<String, Json> {
    instance.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

pub fn require_model(collection: &Collection) -> Result<&'static Model, Error> {
    crate::model::registry::REGISTRY.require(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::registry::REGISTRY;
    use serde_json::json;

    #[test]
    fn rejects_unknown_field() {
        let model = REGISTRY.require(&Collection::new("topic")).unwrap();
        let raw = json!({"title": "hi", "bogus": 1});
        let err = parse_instance(model, &raw, &["title", "meeting_id"], &[]).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn rejects_missing_required_field() {
        let model = REGISTRY.require(&Collection::new("topic")).unwrap();
        let raw = json!({"title": "hi"});
        let err = parse_instance(model, &raw, &["title", "meeting_id"], &["meeting_id"]).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn parses_relation_and_scalar_fields() {
        let model = REGISTRY.require(&Collection::new("topic")).unwrap();
        let raw = json!({"title": "hi", "meeting_id": 7});
        let (id, instance) = parse_instance(model, &raw, &["title", "meeting_id"], &["meeting_id"]).unwrap();
        assert!(id.is_none());
        assert_eq!(instance.get("meeting_id"), Some(&FieldValue::Id(7)));
    }

    #[test]
    fn parses_generic_relation_as_fqid() {
        let model = REGISTRY.require(&Collection::new("agenda_item")).unwrap();
        let raw = json!({"content_object_id": "topic/1312354708"});
        let (_, instance) = parse_instance(model, &raw, &["content_object_id"], &["content_object_id"]).unwrap();
        assert_eq!(
            instance.get("content_object_id"),
            Some(&FieldValue::Fqid(FqId::from_str("topic/1312354708").unwrap()))
        );
    }
}

