//! The [`Datastore`] trait and the request/response shapes every backend
//! speaks. [`memory::MemoryDatastore`] is the in-process fake used by tests;
//! [`http::HttpDatastore`] is the production client described in
//! `SPEC_FULL.md` §6.

pub mod http;
pub mod memory;

use crate::filters::Filter;
use crate::patterns::{Collection, FqId};
use crate::Error;
use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::Mutex;

/// A (possibly partial) set of fields for one object, as returned by a read
/// call. `meta_position` is present whenever the backend reports the
/// write-position the returned data reflects; callers feed it into
/// [`LockedFields::update`] before building a write request.
#[derive(Clone, Debug, Default)]
pub struct PartialModel {
    pub fields: BTreeMap<String, Json>,
    pub meta_position: Option<u64>,
}

impl PartialModel {
    pub fn field(&self, name: &str) -> Option<&Json> {
        self.fields.get(name)
    }
}

/// One collection/ids pair inside a batched [`Datastore::get_many`] call.
#[derive(Clone, Debug)]
pub struct GetManyRequest {
    pub collection: Collection,
    pub ids: Vec<u64>,
}

/// One mutation inside a [`WriteRequest`].
#[derive(Clone, Debug)]
pub enum Event {
    Create { fqid: FqId, fields: BTreeMap<String, Json> },
    Update { fqid: FqId, fields: BTreeMap<String, Json> },
    Delete { fqid: FqId },
}

impl Event {
    pub fn fqid(&self) -> &FqId {
        match self {
            Event::Create { fqid, .. } => fqid,
            Event::Update { fqid, .. } => fqid,
            Event::Delete { fqid } => fqid,
        }
    }
}

/// The single atomic transaction an action batch produces. `locked_fields`
/// carries the minimum observed `meta_position` per read key; the datastore
/// rejects the whole write if any of those positions has since advanced.
#[derive(Clone, Debug)]
pub struct WriteRequest {
    pub events: Vec<Event>,
    pub information: BTreeMap<String, Vec<String>>,
    pub user_id: u64,
    pub locked_fields: HashMap<String, u64>,
}

/// Tracks the minimum `meta_position` observed per read key across a single
/// request, exactly as the reference adapter's `update_locked_fields` does:
/// later reads of the same key only ever lower the recorded position, never
/// raise it.
#[derive(Default)]
pub struct LockedFields(Mutex<HashMap<String, u64>>);

impl LockedFields {
    pub fn new() -> LockedFields {
        LockedFields(Mutex::new(HashMap::new()))
    }

    pub fn update(&self, key: impl Display, position: u64) {
        let mut guard = self.0.lock().expect("locked fields mutex poisoned");
        let entry = guard.entry(key.to_string()).or_insert(position);
        if position < *entry {
            *entry = position;
        }
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.0.lock().expect("locked fields mutex poisoned").clone()
    }
}

/// A readable and writeable backing store for persistent objects.
///
/// Every method that returns data the caller might base a write on records
/// the observed position in `locked_fields()` before returning, so a later
/// `write()` can submit the full set of positions it read under.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get(&self, fqid: &FqId, mapped_fields: Option<&[String]>) -> Result<PartialModel, Error>;

    async fn get_many(
        &self,
        requests: &[GetManyRequest],
    ) -> Result<HashMap<Collection, HashMap<u64, PartialModel>>, Error>;

    async fn get_all(&self, collection: &Collection) -> Result<Vec<(u64, PartialModel)>, Error>;

    async fn filter(&self, collection: &Collection, filter: &Filter) -> Result<Vec<(u64, PartialModel)>, Error>;

    async fn exists(&self, collection: &Collection, filter: &Filter) -> Result<bool, Error>;

    async fn count(&self, collection: &Collection, filter: &Filter) -> Result<u64, Error>;

    async fn reserve_ids(&self, collection: &Collection, amount: u32) -> Result<Vec<u64>, Error>;

    async fn write(&self, request: WriteRequest) -> Result<(), Error>;

    fn locked_fields(&self) -> HashMap<String, u64>;
}
