//! The relation resolver: given one relation field on one instance whose
//! value has changed (or is about to), computes the write events needed on
//! the *other* side of that relation to keep both directions consistent.
//!
//! Ported from the reference `RelationsHandler`, simplified by the fact
//! that this registry names both ends of a relation explicitly (see
//! `src/model/mod.rs`): there is no need to flip a relation's cardinality
//! at runtime to infer the reverse side, because the reverse side's own
//! `Field` descriptor is already sitting in the registry under its own
//! name. `is_reverse` mode and `only_remove` are not implemented; no
//! exercised caller needs them, and the reference code's own handling of
//! them is either dead in the sampled sources or explicitly
//! `NotImplementedError`.

use crate::datastore::{Datastore, GetManyRequest};
use crate::model::registry::REGISTRY;
use crate::model::{Field, Model, OnDelete, RelationField};
use crate::patterns::{Collection, FqField, FqId};
use crate::value::FieldValue;
use crate::Error;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};

/// One write event needed on the other side of a relation.
#[derive(Clone, Debug)]
pub struct RelationEffect {
    pub target: FqField,
    pub new_value: FieldValue,
}

/// Instances created or modified earlier in the same batch, not yet visible
/// in the datastore, but that the relation resolver must be able to see —
/// e.g. `agenda_item.create` referencing a `topic` created moments earlier
/// in the same request.
pub type AdditionalRelationModels = HashMap<FqId, BTreeMap<String, Json>>;

pub struct RelationResolver<'a> {
    pub datastore: &'a dyn Datastore,
    pub additional: &'a AdditionalRelationModels,
}

impl<'a> RelationResolver<'a> {
    /// Computes the effects of setting `field` on `model/id` to `proposed`.
    /// When `only_add` is set, the proposed value is treated as pure
    /// additions with no diff against current state (used by nested-create
    /// flows where there is no "current" value to diff against yet).
    /// `caused_by_delete` enables the protect check on removal.
    pub async fn resolve(
        &self,
        model: &Model,
        id: u64,
        field: &Field,
        proposed: &FieldValue,
        only_add: bool,
        caused_by_delete: bool,
    ) -> Result<Vec<RelationEffect>, Error> {
        let relation = field
            .relation
            .as_ref()
            .ok_or_else(|| Error::action(format!("{} is not a relation field", field.name)))?;
        let related_name = self.resolve_related_name(model, id, relation).await?;

        if relation.generic {
            self.resolve_generic(model, id, field, relation, &related_name, proposed, only_add, caused_by_delete)
                .await
        } else {
            self.resolve_plain(model, id, field, relation, &related_name, proposed, only_add, caused_by_delete)
                .await
        }
    }

    async fn resolve_related_name(
        &self,
        model: &Model,
        id: u64,
        relation: &RelationField,
    ) -> Result<String, Error> {
        let chain = match relation.structured_relation {
            None => return Ok(relation.related_name.to_string()),
            Some(chain) => chain,
        };
        let mut collection = model.collection.clone();
        let mut current_id = id;
        let mut token = String::new();
        for (i, field_name) in chain.iter().enumerate() {
            let fetched = self
                .datastore
                .get(&FqId::new(collection.clone(), current_id), Some(&[field_name.to_string()]))
                .await?;
            let value = fetched.field(field_name).ok_or_else(|| {
                Error::action(format!("The field {} for {} must not be empty in database.", field_name, collection))
            })?;
            if i + 1 < chain.len() {
                let next_id = value
                    .as_u64()
                    .ok_or_else(|| Error::action(format!("The field {} is not a valid id.", field_name)))?;
                let next_field = REGISTRY.field(&collection, field_name).ok_or_else(|| {
                    Error::schema(format!("Unknown field {} on {}", field_name, collection))
                })?;
                collection = next_field
                    .relation
                    .as_ref()
                    .and_then(|r| r.single_target().cloned())
                    .ok_or_else(|| Error::action(format!("{} is not a single-collection relation", field_name)))?;
                current_id = next_id;
            } else {
                token = value.as_u64().map(|n| n.to_string()).unwrap_or_else(|| value.to_string());
            }
        }
        Ok(relation.related_name.replace('$', &token))
    }

    async fn current_plain_ids(&self, model: &Model, id: u64, field: &Field) -> Result<Vec<u64>, Error> {
        let current = self.datastore.get(&FqId::new(model.collection.clone(), id), Some(&[field.name.to_string()])).await?;
        Ok(match current.field(field.name) {
            None => vec![],
            Some(Json::Array(items)) => items.iter().filter_map(|v| v.as_u64()).collect(),
            Some(Json::Number(n)) => n.as_u64().into_iter().collect(),
            _ => vec![],
        })
    }

    async fn current_fqids(&self, model: &Model, id: u64, field: &Field) -> Result<Vec<FqId>, Error> {
        let current = self.datastore.get(&FqId::new(model.collection.clone(), id), Some(&[field.name.to_string()])).await?;
        let parse = |s: &str| s.parse::<FqId>().ok();
        Ok(match current.field(field.name) {
            None => vec![],
            Some(Json::Array(items)) => items.iter().filter_map(|v| v.as_str().and_then(&parse)).collect(),
            Some(Json::String(s)) => parse(s).into_iter().collect(),
            _ => vec![],
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_plain(
        &self,
        model: &Model,
        id: u64,
        field: &Field,
        relation: &RelationField,
        related_name: &str,
        proposed: &FieldValue,
        only_add: bool,
        caused_by_delete: bool,
    ) -> Result<Vec<RelationEffect>, Error> {
        let new_ids = proposed.as_id_list();
        let (add, remove): (Vec<u64>, Vec<u64>) = if only_add {
            (new_ids, vec![])
        } else {
            let current = self.current_plain_ids(model, id, field).await?;
            let add = new_ids.iter().copied().filter(|i| !current.contains(i)).collect();
            let remove = current.into_iter().filter(|i| !new_ids.contains(i)).collect();
            (add, remove)
        };

        let target = relation
            .single_target()
            .cloned()
            .ok_or_else(|| Error::schema(format!("{} has no single target collection", field.name)))?;
        let touched: Vec<u64> = add.iter().chain(remove.iter()).copied().collect();
        let fetched = self.fetch_targets(&target, &touched).await?;

        let reverse_field = REGISTRY.field(&target, related_name);
        let reverse_single = reverse_field.map_or(!relation.relation_type.is_single_valued(), |f| {
            f.relation.as_ref().map_or(!f.list, |r| r.relation_type.is_single_valued())
        });

        let mut effects = vec![];
        for rel_id in add {
            let current_value = fetched.get(&rel_id).and_then(|f| f.get(related_name));
            let new_value = if reverse_single {
                match current_value {
                    None | Some(Json::Null) => FieldValue::Id(id),
                    Some(_) => {
                        return Err(Error::action(format!(
                            "You can not add {} to field {} because related field is not empty.",
                            rel_id, field.name
                        )))
                    }
                }
            } else {
                let mut ids: Vec<u64> = current_value
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_u64()).collect())
                    .unwrap_or_default();
                ids.push(id);
                FieldValue::IdList(ids)
            };
            effects.push(RelationEffect { target: FqId::new(target.clone(), rel_id).field(related_name), new_value });
        }
        for rel_id in remove {
            if caused_by_delete
                && reverse_field.map_or(false, |f| f.relation.as_ref().map_or(false, |r| r.on_delete == OnDelete::Protect))
            {
                return Err(Error::action(format!(
                    "You are not allowed to delete {} {} as long as there are some required related objects (see {}).",
                    model.collection, id, field.name
                )));
            }
            let new_value = if reverse_single {
                FieldValue::Null
            } else {
                let current_value = fetched.get(&rel_id).and_then(|f| f.get(related_name));
                let mut ids: Vec<u64> = current_value
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_u64()).collect())
                    .unwrap_or_default();
                ids.retain(|i| *i != id);
                FieldValue::IdList(ids)
            };
            effects.push(RelationEffect { target: FqId::new(target.clone(), rel_id).field(related_name), new_value });
        }
        Ok(effects)
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_generic(
        &self,
        model: &Model,
        id: u64,
        field: &Field,
        _relation: &RelationField,
        related_name: &str,
        proposed: &FieldValue,
        only_add: bool,
        caused_by_delete: bool,
    ) -> Result<Vec<RelationEffect>, Error> {
        let new_ids = proposed.as_fqid_list();
        let (add, remove): (Vec<FqId>, Vec<FqId>) = if only_add {
            (new_ids, vec![])
        } else {
            let current = self.current_fqids(model, id, field).await?;
            let add = new_ids.iter().cloned().filter(|i| !current.contains(i)).collect();
            let remove = current.into_iter().filter(|i| !new_ids.contains(i)).collect();
            (add, remove)
        };

        let touched: Vec<FqId> = add.iter().chain(remove.iter()).cloned().collect();
        let fetched = self.fetch_targets_generic(&touched).await?;

        let mut effects = vec![];
        for rel_fqid in add {
            let reverse_field = REGISTRY.field(&rel_fqid.collection, related_name);
            let reverse_single = reverse_field.map_or(true, |f| f.relation.as_ref().map_or(!f.list, |r| r.relation_type.is_single_valued()));
            let current_value = fetched.get(&rel_fqid).and_then(|f| f.get(related_name));
            let new_value = if reverse_single {
                match current_value {
                    None | Some(Json::Null) => FieldValue::Id(id),
                    Some(_) => {
                        return Err(Error::action(format!(
                            "You can not add {} to field {} because related field is not empty.",
                            rel_fqid, field.name
                        )))
                    }
                }
            } else {
                let mut ids: Vec<u64> = current_value
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_u64()).collect())
                    .unwrap_or_default();
                ids.push(id);
                FieldValue::IdList(ids)
            };
            effects.push(RelationEffect { target: rel_fqid.field(related_name), new_value });
        }
        for rel_fqid in remove {
            let reverse_field = REGISTRY.field(&rel_fqid.collection, related_name);
            if caused_by_delete
                && reverse_field.map_or(false, |f| f.relation.as_ref().map_or(false, |r| r.on_delete == OnDelete::Protect))
            {
                return Err(Error::action(format!(
                    "You are not allowed to delete {} {} as long as there are some required related objects (see {}).",
                    model.collection, id, field.name
                )));
            }
            let reverse_single = reverse_field.map_or(true, |f| f.relation.as_ref().map_or(!f.list, |r| r.relation_type.is_single_valued()));
            let new_value = if reverse_single {
                FieldValue::Null
            } else {
                let current_value = fetched.get(&rel_fqid).and_then(|f| f.get(related_name));
                let mut ids: Vec<u64> = current_value
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_u64()).collect())
                    .unwrap_or_default();
                ids.retain(|i| *i != id);
                FieldValue::IdList(ids)
            };
            effects.push(RelationEffect { target: rel_fqid.field(related_name), new_value });
        }
        Ok(effects)
    }

    async fn fetch_targets(
        &self,
        target: &Collection,
        ids: &[u64],
    ) -> Result<HashMap<u64, BTreeMap<String, Json>>, Error> {
        let mut result = HashMap::new();
        let mut missing = vec![];
        for id in ids {
            if let Some(found) = self.additional.get(&FqId::new(target.clone(), *id)) {
                result.insert(*id, found.clone());
            } else {
                missing.push(*id);
            }
        }
        if !missing.is_empty() {
            let response = self
                .datastore
                .get_many(&[GetManyRequest { collection: target.clone(), ids: missing.clone() }])
                .await?;
            if let Some(by_id) = response.get(target) {
                for id in &missing {
                    if let Some(model) = by_id.get(id) {
                        result.insert(*id, model.fields.clone());
                    }
                }
            }
        }
        for id in ids {
            if !result.contains_key(id) {
                return Err(Error::action(format!("You try to reference an instance of {} that does not exist.", target)));
            }
        }
        Ok(result)
    }

    async fn fetch_targets_generic(
        &self,
        ids: &[FqId],
    ) -> Result<HashMap<FqId, BTreeMap<String, Json>>, Error> {
        let mut by_collection: HashMap<Collection, Vec<u64>> = HashMap::new();
        for fqid in ids {
            by_collection.entry(fqid.collection.clone()).or_default().push(fqid.id);
        }
        let mut result = HashMap::new();
        for fqid in ids {
            if let Some(found) = self.additional.get(fqid) {
                result.insert(fqid.clone(), found.clone());
            }
        }
        for (collection, collection_ids) in by_collection {
            let response = self
                .datastore
                .get_many(&[GetManyRequest { collection: collection.clone(), ids: collection_ids }])
                .await?;
            if let Some(by_id) = response.get(&collection) {
                for (id, model) in by_id {
                    result.entry(FqId::new(collection.clone(), *id)).or_insert_with(|| model.fields.clone());
                }
            }
        }
        for fqid in ids {
            if !result.contains_key(fqid) {
                return Err(Error::action(format!("You try to reference an instance of {} that does not exist.", fqid.collection)));
            }
        }
        Ok(result)
    }
}
