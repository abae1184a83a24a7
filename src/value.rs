//! The tagged value type used for in-flight instances.
//!
//! The reference codebase this pipeline is built from passes plain
//! dictionaries between actions, the resolver, and the datastore. A typed
//! reimplementation does not reach for one Rust struct per collection —
//! the collection set is data-driven — so instead an instance is an
//! ordered mapping from field name to a small tagged [`FieldValue`], the
//! same shape the write events and datastore responses use on the wire.

use crate::patterns::FqId;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// One field's worth of data flowing through the pipeline. Scalars pass
/// through as raw JSON; relation fields use the more specific id-shaped
/// variants so the resolver never has to re-parse JSON to find out what it
/// is looking at.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Scalar(Json),
    Id(u64),
    IdList(Vec<u64>),
    Fqid(FqId),
    FqidList(Vec<FqId>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_id(&self) -> Option<u64> {
        match self {
            FieldValue::Id(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_id_list(&self) -> Vec<u64> {
        match self {
            FieldValue::Null => vec![],
            FieldValue::Id(id) => vec![*id],
            FieldValue::IdList(ids) => ids.clone(),
            _ => vec![],
        }
    }

    pub fn as_fqid(&self) -> Option<&FqId> {
        match self {
            FieldValue::Fqid(fqid) => Some(fqid),
            _ => None,
        }
    }

    pub fn as_fqid_list(&self) -> Vec<FqId> {
        match self {
            FieldValue::Null => vec![],
            FieldValue::Fqid(fqid) => vec![fqid.clone()],
            FieldValue::FqidList(fqids) => fqids.clone(),
            _ => vec![],
        }
    }

    /// Converts to the JSON shape that goes out in a write event's `fields`
    /// map.
    pub fn to_json(&self) -> Json {
        match self {
            FieldValue::Null => Json::Null,
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::Id(id) => Json::from(*id),
            FieldValue::IdList(ids) => Json::from(ids.clone()),
            FieldValue::Fqid(fqid) => Json::from(fqid.to_string()),
            FieldValue::FqidList(fqids) => {
                Json::from(fqids.iter().map(|f| f.to_string()).collect::<Vec<_>>())
            }
        }
    }
}

/// An ordered field-name -> value mapping representing one instance, either
/// freshly built from a payload or fetched (partially) from the datastore.
pub type Instance = BTreeMap<String, FieldValue>;
