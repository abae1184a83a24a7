//! Typed keys used throughout the action pipeline: a [`Collection`] name, a
//! [`FqId`] (collection + id), and a [`FqField`] (collection + id + field
//! name). All three round-trip through the `/`-separated wire form used by
//! the datastore protocol (see `SPEC_FULL.md` §6).

use crate::Error;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

const KEYSEPARATOR: char = '/';

/// The first segment of a key, e.g. `meeting` or `agenda_item`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Collection(String);

impl Collection {
    pub fn new(name: impl Into<String>) -> Collection {
        Collection(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Collection {
    fn from(s: &str) -> Collection {
        Collection(s.to_string())
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Collection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Collection, D::Error> {
        String::deserialize(deserializer).map(Collection)
    }
}

/// `collection/id`. The canonical key identifying one persistent object.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FqId {
    pub collection: Collection,
    pub id: u64,
}

impl FqId {
    pub fn new(collection: Collection, id: u64) -> FqId {
        FqId { collection, id }
    }

    pub fn field(&self, name: impl Into<String>) -> FqField {
        FqField::new(self.collection.clone(), self.id, name)
    }
}

impl Display for FqId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.collection, KEYSEPARATOR, self.id)
    }
}

impl FromStr for FqId {
    type Err = Error;

    fn from_str(s: &str) -> Result<FqId, Error> {
        let mut parts = s.splitn(2, KEYSEPARATOR);
        let collection = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::action(format!("{} is not a valid fqid", s)))?;
        let id = parts
            .next()
            .ok_or_else(|| Error::action(format!("{} is not a valid fqid", s)))?;
        let id: u64 = id
            .parse()
            .map_err(|_| Error::action(format!("{} is not a valid fqid", s)))?;
        Ok(FqId::new(Collection::new(collection), id))
    }
}

impl Serialize for FqId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FqId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<FqId, D::Error> {
        let s = String::deserialize(deserializer)?;
        FqId::from_str(&s).map_err(de::Error::custom)
    }
}

/// `collection/id/field`. The key used for locked-fields bookkeeping and for
/// addressing a single property on the other side of a relation.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FqField {
    pub collection: Collection,
    pub id: u64,
    pub field: String,
}

impl FqField {
    pub fn new(collection: Collection, id: u64, field: impl Into<String>) -> FqField {
        FqField { collection, id, field: field.into() }
    }

    pub fn fqid(&self) -> FqId {
        FqId::new(self.collection.clone(), self.id)
    }
}

impl Display for FqField {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}{}{}{}{}", self.collection, KEYSEPARATOR, self.id, KEYSEPARATOR, self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqid_round_trips_through_display_and_from_str() {
        let fqid = FqId::new(Collection::new("meeting"), 42);
        assert_eq!(fqid.to_string(), "meeting/42");
        assert_eq!(FqId::from_str("meeting/42").unwrap(), fqid);
    }

    #[test]
    fn fqfield_formats_three_segments() {
        let field = FqId::new(Collection::new("topic"), 7).field("agenda_item_id");
        assert_eq!(field.to_string(), "topic/7/agenda_item_id");
    }

    #[test]
    fn fqid_from_str_rejects_garbage() {
        assert!(FqId::from_str("not-a-key").is_err());
        assert!(FqId::from_str("meeting/abc").is_err());
    }

    #[test]
    fn fqid_sorts_by_stringified_form() {
        let mut ids = vec![
            FqId::new(Collection::new("topic"), 2),
            FqId::new(Collection::new("agenda_item"), 9),
            FqId::new(Collection::new("topic"), 10),
        ];
        ids.sort_by_key(|id| id.to_string());
        assert_eq!(ids[0].collection.as_str(), "agenda_item");
    }
}
