//! An in-process fake [`Datastore`], grounded in the reference test suite's
//! `DatabaseTestAdapter`: a small in-memory table a test can seed directly,
//! with no real optimistic-concurrency semantics skipped — unlike the
//! reference fake, writes here actually apply and positions actually
//! advance, so the locked-fields protocol can be exercised end to end.

use super::{Datastore, Event, GetManyRequest, PartialModel, WriteRequest};
use crate::filters::Filter;
use crate::patterns::{Collection, FqId};
use crate::value::Instance;
use crate::Error;
use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

struct Stored {
    fields: BTreeMap<String, Json>,
    position: u64,
}

#[derive(Default)]
struct State {
    objects: HashMap<String, HashMap<u64, Stored>>,
    next_id: HashMap<String, u64>,
    position: u64,
}

/// An in-memory [`Datastore`] for tests. Seed it with [`MemoryDatastore::seed`]
/// before exercising an action against it.
pub struct MemoryDatastore {
    state: Mutex<State>,
    locked_fields: super::LockedFields,
}

impl MemoryDatastore {
    pub fn new() -> MemoryDatastore {
        MemoryDatastore { state: Mutex::new(State::default()), locked_fields: super::LockedFields::new() }
    }

    /// Inserts one object directly, bypassing the write protocol. Used to
    /// set up fixtures before running an action under test.
    pub fn seed(&self, fqid: &FqId, fields: BTreeMap<String, Json>) {
        let mut state = self.state.lock().expect("memory datastore mutex poisoned");
        state.position += 1;
        let position = state.position;
        state
            .objects
            .entry(fqid.collection.as_str().to_string())
            .or_default()
            .insert(fqid.id, Stored { fields, position });
        let next = state.next_id.entry(fqid.collection.as_str().to_string()).or_insert(1);
        if fqid.id >= *next {
            *next = fqid.id + 1;
        }
    }

    /// Reads back one object's current fields, for assertions in tests.
    pub fn snapshot(&self, fqid: &FqId) -> Option<BTreeMap<String, Json>> {
        let state = self.state.lock().expect("memory datastore mutex poisoned");
        state
            .objects
            .get(fqid.collection.as_str())
            .and_then(|by_id| by_id.get(&fqid.id))
            .map(|stored| stored.fields.clone())
    }

    fn record_read(&self, fqid: &FqId, position: u64) {
        self.locked_fields.update(fqid, position);
    }

    fn partial_model(stored: &Stored, mapped_fields: Option<&[String]>) -> PartialModel {
        let fields = match mapped_fields {
            None => stored.fields.clone(),
            Some(names) => stored
                .fields
                .iter()
                .filter(|(k, _)| names.iter().any(|n| n == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        PartialModel { fields, meta_position: Some(stored.position) }
    }
}

impl Default for MemoryDatastore {
    fn default() -> MemoryDatastore {
        MemoryDatastore::new()
    }
}

/// Converts raw stored JSON into the shape [`Filter::matches`] expects.
/// Without model context there's no way to know whether a number is a
/// relation id or a plain scalar, so everything round-trips as
/// [`crate::value::FieldValue::Scalar`]; `Filter`'s comparison already
/// treats a `Scalar` integer the same as an `Id` one.
fn as_instance_fields(fields: &BTreeMap<String, Json>) -> Instance {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), crate::value::FieldValue::Scalar(v.clone())))
        .collect()
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get(&self, fqid: &FqId, mapped_fields: Option<&[String]>) -> Result<PartialModel, Error> {
        let state = self.state.lock().expect("memory datastore mutex poisoned");
        let stored = state
            .objects
            .get(fqid.collection.as_str())
            .and_then(|by_id| by_id.get(&fqid.id))
            .ok_or_else(|| Error::action(format!("Model '{}' does not exist.", fqid)))?;
        let model = Self::partial_model(stored, mapped_fields);
        self.record_read(fqid, stored.position);
        Ok(model)
    }

    async fn get_many(
        &self,
        requests: &[GetManyRequest],
    ) -> Result<HashMap<Collection, HashMap<u64, PartialModel>>, Error> {
        let state = self.state.lock().expect("memory datastore mutex poisoned");
        let mut result = HashMap::new();
        for request in requests {
            let mut inner = HashMap::new();
            if let Some(by_id) = state.objects.get(request.collection.as_str()) {
                for id in &request.ids {
                    if let Some(stored) = by_id.get(id) {
                        inner.insert(*id, Self::partial_model(stored, None));
                        self.record_read(&FqId::new(request.collection.clone(), *id), stored.position);
                    }
                }
            }
            result.insert(request.collection.clone(), inner);
        }
        Ok(result)
    }

    async fn get_all(&self, collection: &Collection) -> Result<Vec<(u64, PartialModel)>, Error> {
        let state = self.state.lock().expect("memory datastore mutex poisoned");
        Ok(state
            .objects
            .get(collection.as_str())
            .map(|by_id| {
                by_id.iter().map(|(id, stored)| (*id, Self::partial_model(stored, None))).collect()
            })
            .unwrap_or_default())
    }

    async fn filter(&self, collection: &Collection, filter: &Filter) -> Result<Vec<(u64, PartialModel)>, Error> {
        let state = self.state.lock().expect("memory datastore mutex poisoned");
        let mut out = vec![];
        if let Some(by_id) = state.objects.get(collection.as_str()) {
            for (id, stored) in by_id {
                let instance = as_instance_fields(&stored.fields);
                if filter.matches(&instance) {
                    out.push((*id, Self::partial_model(stored, None)));
                }
            }
        }
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }

    async fn exists(&self, collection: &Collection, filter: &Filter) -> Result<bool, Error> {
        Ok(!self.filter(collection, filter).await?.is_empty())
    }

    async fn count(&self, collection: &Collection, filter: &Filter) -> Result<u64, Error> {
        Ok(self.filter(collection, filter).await?.len() as u64)
    }

    async fn reserve_ids(&self, collection: &Collection, amount: u32) -> Result<Vec<u64>, Error> {
        let mut state = self.state.lock().expect("memory datastore mutex poisoned");
        let next = state.next_id.entry(collection.as_str().to_string()).or_insert(1);
        let start = *next;
        *next += amount as u64;
        Ok((start..start + amount as u64).collect())
    }

    async fn write(&self, request: WriteRequest) -> Result<(), Error> {
        let mut state = self.state.lock().expect("memory datastore mutex poisoned");
        for (key, observed) in &request.locked_fields {
            let fqid_part = key.splitn(3, '/').take(2).collect::<Vec<_>>().join("/");
            let mut parts = fqid_part.splitn(2, '/');
            let collection = parts.next().unwrap_or_default();
            let id: u64 = match parts.next().and_then(|s| s.parse().ok()) {
                Some(id) => id,
                None => continue,
            };
            if let Some(stored) = state.objects.get(collection).and_then(|by_id| by_id.get(&id)) {
                if stored.position > *observed {
                    return Err(Error::datastore_rejected(format!(
                        "Object {} has changed since it was read (expected position {}, now at {}).",
                        key, observed, stored.position
                    )));
                }
            }
        }

        state.position += 1;
        let position = state.position;
        for event in &request.events {
            match event {
                Event::Create { fqid, fields } => {
                    state
                        .objects
                        .entry(fqid.collection.as_str().to_string())
                        .or_default()
                        .insert(fqid.id, Stored { fields: fields.clone(), position });
                    let next = state.next_id.entry(fqid.collection.as_str().to_string()).or_insert(1);
                    if fqid.id >= *next {
                        *next = fqid.id + 1;
                    }
                }
                Event::Update { fqid, fields } => {
                    let by_id = state.objects.entry(fqid.collection.as_str().to_string()).or_default();
                    let stored = by_id.entry(fqid.id).or_insert_with(|| Stored {
                        fields: BTreeMap::new(),
                        position,
                    });
                    for (k, v) in fields {
                        if v.is_null() {
                            stored.fields.remove(k);
                        } else {
                            stored.fields.insert(k.clone(), v.clone());
                        }
                    }
                    stored.position = position;
                }
                Event::Delete { fqid } => {
                    if let Some(by_id) = state.objects.get_mut(fqid.collection.as_str()) {
                        by_id.remove(&fqid.id);
                    }
                }
            }
        }
        Ok(())
    }

    fn locked_fields(&self) -> HashMap<String, u64> {
        self.locked_fields.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::Collection;

    #[tokio::test]
    async fn seeded_object_round_trips_through_get() {
        let store = MemoryDatastore::new();
        let fqid = FqId::new(Collection::new("topic"), 1);
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), Json::from("hello"));
        store.seed(&fqid, fields);

        let model = store.get(&fqid, None).await.unwrap();
        assert_eq!(model.field("title"), Some(&Json::from("hello")));
        assert_eq!(model.meta_position, Some(1));
    }

    #[tokio::test]
    async fn write_rejected_when_locked_position_is_stale() {
        let store = MemoryDatastore::new();
        let fqid = FqId::new(Collection::new("topic"), 1);
        store.seed(&fqid, BTreeMap::new());
        store.get(&fqid, None).await.unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), Json::from("changed elsewhere"));
        store
            .write(WriteRequest {
                events: vec![Event::Update { fqid: fqid.clone(), fields }],
                information: BTreeMap::new(),
                user_id: 1,
                locked_fields: HashMap::new(),
            })
            .await
            .unwrap();

        let mut stale_locks = HashMap::new();
        stale_locks.insert(fqid.to_string(), 1);
        let result = store
            .write(WriteRequest {
                events: vec![Event::Update { fqid: fqid.clone(), fields: BTreeMap::new() }],
                information: BTreeMap::new(),
                user_id: 1,
                locked_fields: stale_locks,
            })
            .await;
        assert!(result.is_err());
    }
}
