//! The production [`Datastore`] backend: a thin `reqwest` client speaking
//! the JSON-over-HTTP protocol described in `SPEC_FULL.md` §6, grounded in
//! the reference adapter's `HTTPEngine`-backed `Adapter`.

use super::{Datastore, Event, GetManyRequest, LockedFields, PartialModel, WriteRequest};
use crate::filters::Filter;
use crate::patterns::{Collection, FqId};
use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, HashMap};

/// A `reqwest`-backed client for the external datastore service.
///
/// Connection reuse is left to `reqwest`'s own pooling; the reference
/// engine instead sizes a Neo4j connection pool off `num_cpus::get()`
/// because that driver needs an explicit bound, which an HTTP client over
/// keep-alive connections does not.
pub struct HttpDatastore {
    client: reqwest::Client,
    base_url: String,
    locked_fields: LockedFields,
}

impl HttpDatastore {
    pub fn new(base_url: impl Into<String>) -> HttpDatastore {
        HttpDatastore {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            locked_fields: LockedFields::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: Json) -> Result<Json, Error> {
        let response = self.client.post(self.url(path)).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::datastore_rejected(format!(
                "Datastore returned {}: {}",
                status, text
            )));
        }
        Ok(response.json().await?)
    }

    fn record_position(&self, fqid: &FqId, body: &Json) {
        if let Some(position) = body.get("meta_position").and_then(|v| v.as_u64()) {
            self.locked_fields.update(fqid, position);
        }
    }

    fn partial_model_from(body: &Json) -> PartialModel {
        let meta_position = body.get("meta_position").and_then(|v| v.as_u64());
        let mut fields = BTreeMap::new();
        if let Some(map) = body.as_object() {
            for (k, v) in map {
                if k != "meta_position" {
                    fields.insert(k.clone(), v.clone());
                }
            }
        }
        PartialModel { fields, meta_position }
    }
}

#[async_trait]
impl Datastore for HttpDatastore {
    async fn get(&self, fqid: &FqId, mapped_fields: Option<&[String]>) -> Result<PartialModel, Error> {
        let body = self
            .post(
                "get",
                json!({ "fqid": fqid.to_string(), "mapped_fields": mapped_fields }),
            )
            .await?;
        self.record_position(fqid, &body);
        Ok(Self::partial_model_from(&body))
    }

    async fn get_many(
        &self,
        requests: &[GetManyRequest],
    ) -> Result<HashMap<Collection, HashMap<u64, PartialModel>>, Error> {
        let payload: Vec<Json> = requests
            .iter()
            .map(|r| json!({ "collection": r.collection.as_str(), "ids": r.ids }))
            .collect();
        let body = self.post("get_many", json!({ "requests": payload })).await?;
        let mut result = HashMap::new();
        if let Some(by_collection) = body.as_object() {
            for (collection_str, by_id) in by_collection {
                let collection = Collection::new(collection_str.as_str());
                let mut inner = HashMap::new();
                if let Some(by_id) = by_id.as_object() {
                    for (id_str, value) in by_id {
                        let id: u64 = id_str.parse().map_err(|_| {
                            Error::datastore_transport(format!("Invalid id in response: {}", id_str))
                        })?;
                        self.record_position(&FqId::new(collection.clone(), id), value);
                        inner.insert(id, Self::partial_model_from(value));
                    }
                }
                result.insert(collection, inner);
            }
        }
        Ok(result)
    }

    async fn get_all(&self, collection: &Collection) -> Result<Vec<(u64, PartialModel)>, Error> {
        let body = self.post("get_all", json!({ "collection": collection.as_str() })).await?;
        Ok(parse_id_keyed_list(&body))
    }

    async fn filter(&self, collection: &Collection, filter: &Filter) -> Result<Vec<(u64, PartialModel)>, Error> {
        let body = self
            .post("filter", json!({ "collection": collection.as_str(), "filter": filter }))
            .await?;
        Ok(parse_id_keyed_list(&body))
    }

    async fn exists(&self, collection: &Collection, filter: &Filter) -> Result<bool, Error> {
        let body = self
            .post("exists", json!({ "collection": collection.as_str(), "filter": filter }))
            .await?;
        Ok(body.get("exists").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn count(&self, collection: &Collection, filter: &Filter) -> Result<u64, Error> {
        let body = self
            .post("count", json!({ "collection": collection.as_str(), "filter": filter }))
            .await?;
        Ok(body.get("count").and_then(|v| v.as_u64()).unwrap_or(0))
    }

    async fn reserve_ids(&self, collection: &Collection, amount: u32) -> Result<Vec<u64>, Error> {
        let body = self
            .post("reserve_ids", json!({ "collection": collection.as_str(), "amount": amount }))
            .await?;
        Ok(body
            .get("ids")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_u64()).collect())
            .unwrap_or_default())
    }

    async fn write(&self, request: WriteRequest) -> Result<(), Error> {
        let events: Vec<Json> = request
            .events
            .iter()
            .map(|event| match event {
                Event::Create { fqid, fields } => {
                    json!({ "type": "create", "fqid": fqid.to_string(), "fields": fields })
                }
                Event::Update { fqid, fields } => {
                    json!({ "type": "update", "fqid": fqid.to_string(), "fields": fields })
                }
                Event::Delete { fqid } => json!({ "type": "delete", "fqid": fqid.to_string() }),
            })
            .collect();
        self.post(
            "write",
            json!({
                "events": events,
                "information": request.information,
                "user_id": request.user_id,
                "locked_fields": request.locked_fields,
            }),
        )
        .await?;
        Ok(())
    }

    fn locked_fields(&self) -> HashMap<String, u64> {
        self.locked_fields.snapshot()
    }
}

fn parse_id_keyed_list(body: &Json) -> Vec<(u64, PartialModel)> {
    let mut out = vec![];
    if let Some(map) = body.as_object() {
        for (id_str, value) in map {
            if let Ok(id) = id_str.parse::<u64>() {
                out.push((id, HttpDatastore::partial_model_from(value)));
            }
        }
    }
    out.sort_by_key(|(id, _)| *id);
    out
}
