//! The generic action base and its three specializations. Grounded in the
//! reference codebase's `Action`/`CreateAction`/`UpdateAction`/`DeleteAction`
//! class hierarchy, reshaped as trait composition: a concrete action
//! implements one of [`CreateHooks`], [`UpdateHooks`], or [`DeleteHooks`]
//! for whatever it needs to customize, and the shared driver functions
//! ([`perform_create`], [`perform_update`], [`perform_delete`]) carry out
//! the rest — payload validation, default application, relation
//! resolution, and write-event assembly — the same way the Python base
//! classes do for every subclass that does not override a given step.

pub mod actions;
pub mod permission;
pub mod registry;
pub mod relations;
pub mod schema;

use crate::datastore::{Datastore, Event};
use crate::model::OnDelete;
use crate::patterns::{Collection, FqId};
use crate::value::Instance;
use crate::Error;
use async_trait::async_trait;
use relations::{AdditionalRelationModels, RelationResolver};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Mutable state threaded through one action batch: the datastore handle,
/// the acting user, and the accumulating overlay of instances created
/// earlier in the same batch (visible to the relation resolver before they
/// reach the datastore).
pub struct ActionContext<'a> {
    pub datastore: &'a dyn Datastore,
    pub user_id: u64,
    pub additional_relation_models: AdditionalRelationModels,
}

impl<'a> ActionContext<'a> {
    pub fn new(datastore: &'a dyn Datastore, user_id: u64) -> ActionContext<'a> {
        ActionContext { datastore, user_id, additional_relation_models: AdditionalRelationModels::new() }
    }

    pub async fn reserve_id(&self, collection: &Collection) -> Result<u64, Error> {
        Ok(self.datastore.reserve_ids(collection, 1).await?[0])
    }

    /// Reads one field off an object that may only exist in this batch's
    /// in-flight overlay so far (checked first, same precedence the
    /// relation resolver uses), falling back to the datastore.
    pub async fn fetch_field(&self, fqid: &FqId, field: &str) -> Result<Option<Json>, Error> {
        if let Some(fields) = self.additional_relation_models.get(fqid) {
            if let Some(value) = fields.get(field) {
                return Ok(Some(value.clone()));
            }
        }
        let model = self.datastore.get(fqid, Some(&[field.to_string()])).await?;
        Ok(model.field(field).cloned())
    }

    fn resolver(&self) -> RelationResolver<'_> {
        RelationResolver { datastore: self.datastore, additional: &self.additional_relation_models }
    }
}

/// One write event plus the human-readable log line it should be filed
/// under, mirroring the reference codebase's `information` map.
struct Staged {
    event: Event,
    information: &'static str,
}

/// The events an action produced plus the `information` log lines each
/// touched object should be filed under. A batch of actions merges these
/// together into the single write transaction it submits.
#[derive(Debug)]
pub struct ActionResult {
    pub events: Vec<Event>,
    pub information: BTreeMap<String, Vec<String>>,
}

fn finish(staged: Vec<Staged>) -> ActionResult {
    let mut information: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut events = Vec::with_capacity(staged.len());
    for item in staged {
        information.entry(item.event.fqid().to_string()).or_default().push(item.information.to_string());
        events.push(item.event);
    }
    ActionResult { events, information }
}

/// Hooks a concrete `<collection>.create` action can override.
#[async_trait]
pub trait CreateHooks: Sync + Send {
    fn collection(&self) -> Collection;
    fn required(&self) -> &'static [&'static str] {
        &[]
    }
    fn optional(&self) -> &'static [&'static str] {
        &[]
    }

    /// Called after defaults are applied and before relation resolution.
    /// The default implementation does nothing.
    async fn update_instance(&self, _instance: &mut Instance, _ctx: &mut ActionContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    async fn check_permissions(&self, _instance: &Instance, _ctx: &ActionContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// Dependent objects to create immediately after this one, grounded in
    /// the reference codebase's per-action `Dependencies` list (e.g.
    /// creating a workflow's default state right after the workflow
    /// itself). The default implementation declares no dependents.
    async fn dependents(&self, _new_id: u64, _instance: &Instance, _ctx: &mut ActionContext<'_>) -> Result<Vec<Dependent>, Error> {
        Ok(vec![])
    }
}

/// One dependent object a create action wants made alongside its own,
/// optionally back-referenced from a field on the parent.
pub struct Dependent {
    pub collection: Collection,
    pub fields: BTreeMap<String, Json>,
    pub back_reference: Option<&'static str>,
}

fn allowed_fields(required: &'static [&'static str], optional: &'static [&'static str]) -> Vec<&'static str> {
    required.iter().chain(optional.iter()).copied().collect()
}

pub async fn perform_create(hooks: &dyn CreateHooks, payload: &[Json], ctx: &mut ActionContext<'_>) -> Result<ActionResult, Error> {
    let model = schema::require_model(&hooks.collection())?;
    let allowed = allowed_fields(hooks.required(), hooks.optional());
    let mut staged = vec![];

    for raw in payload {
        let (_, mut instance) = schema::parse_instance(model, raw, &allowed, hooks.required())?;
        schema::apply_defaults(model, &mut instance);
        hooks.check_permissions(&instance, ctx).await?;
        hooks.update_instance(&mut instance, ctx).await?;

        let new_id = ctx.reserve_id(&model.collection).await?;
        let fqid = FqId::new(model.collection.clone(), new_id);

        let mut effects = vec![];
        for (field_name, value) in instance.clone() {
            let field = model
                .field(&field_name)
                .or_else(|| model.match_template_field(&field_name).map(|(f, _)| f));
            let field = match field {
                Some(f) if f.is_relation() && !value.is_null() => f,
                _ => continue,
            };
            let fx = ctx.resolver().resolve(model, new_id, field, &value, true, false).await?;
            effects.extend(fx);
        }

        let mut fields_json = schema::instance_to_json_fields(&instance);
        ctx.additional_relation_models.insert(fqid.clone(), fields_json.clone());

        let dependents = hooks.dependents(new_id, &instance, ctx).await?;
        let mut dependent_staged = vec![];
        for dependent in dependents {
            let dependent_model = schema::require_model(&dependent.collection)?;
            let dependent_id = ctx.reserve_id(&dependent.collection).await?;
            let dependent_fqid = FqId::new(dependent.collection.clone(), dependent_id);

            if let Some(back_field) = dependent.back_reference {
                fields_json.insert(back_field.to_string(), Json::from(dependent_id));
                ctx.additional_relation_models.insert(fqid.clone(), fields_json.clone());
            }
            ctx.additional_relation_models.insert(dependent_fqid.clone(), dependent.fields.clone());

            // The dependent's own relation fields still need the usual reverse-side
            // effects (e.g. a new motion_state's workflow_id adding itself to the
            // parent workflow's state_ids) — except whichever field mirrors the
            // back-reference just written above, since that side is already covered.
            for (field_name, value_json) in &dependent.fields {
                let field = dependent_model
                    .field(field_name)
                    .or_else(|| dependent_model.match_template_field(field_name).map(|(f, _)| f));
                let field = match field {
                    Some(f) if f.is_relation() => f,
                    _ => continue,
                };
                if let Some(back_field) = dependent.back_reference {
                    if field.relation.as_ref().map_or(false, |r| r.related_name == back_field) {
                        continue;
                    }
                }
                let value = json_field_to_value(field, Some(value_json));
                if value.is_null() {
                    continue;
                }
                let fx = ctx.resolver().resolve(dependent_model, dependent_id, field, &value, true, false).await?;
                effects.extend(fx);
            }

            dependent_staged.push(Staged {
                event: Event::Create { fqid: dependent_fqid, fields: dependent.fields },
                information: "Object created",
            });
        }

        staged.push(Staged { event: Event::Create { fqid: fqid.clone(), fields: fields_json }, information: "Object created" });
        staged.extend(dependent_staged);
        for effect in effects {
            apply_effect_to_overlay(ctx, &effect);
            staged.push(Staged {
                event: Event::Update { fqid: effect.target.fqid(), fields: singleton(&effect.target.field, effect.new_value) },
                information: "Object attached to agenda item",
            });
        }
    }

    Ok(finish(staged))
}

fn apply_effect_to_overlay(ctx: &mut ActionContext<'_>, effect: &relations::RelationEffect) {
    let fqid = effect.target.fqid();
    let entry = ctx.additional_relation_models.entry(fqid).or_default();
    entry.insert(effect.target.field.clone(), effect.new_value.to_json());
}

fn singleton(field: &str, value: crate::value::FieldValue) -> BTreeMap<String, Json> {
    let mut map = BTreeMap::new();
    map.insert(field.to_string(), value.to_json());
    map
}

/// Hooks a concrete `<collection>.update` action can override.
#[async_trait]
pub trait UpdateHooks: Sync + Send {
    fn collection(&self) -> Collection;
    fn optional(&self) -> &'static [&'static str] {
        &[]
    }

    /// Replaces the raw payload with the instances that should actually be
    /// written — used by actions like `agenda_item.assign` that compute a
    /// derived set of updates rather than taking the payload verbatim.
    async fn updated_instances(&self, payload: &[Json], _ctx: &mut ActionContext<'_>) -> Result<Vec<Json>, Error> {
        Ok(payload.to_vec())
    }

    async fn check_permissions(&self, _id: u64, _instance: &Instance, _ctx: &ActionContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// Whether a changed relation field should also stage the reverse-side
    /// effect (e.g. `parent_id` also updating the new parent's `child_ids`).
    /// `agenda_item.assign` turns this off: it only ever reports the direct
    /// `parent_id` updates it computed itself.
    fn resolve_relations(&self) -> bool {
        true
    }
}

pub async fn perform_update(hooks: &dyn UpdateHooks, payload: &[Json], ctx: &mut ActionContext<'_>) -> Result<ActionResult, Error> {
    let model = schema::require_model(&hooks.collection())?;
    let optional = hooks.optional();
    let mut allowed: Vec<&str> = optional.to_vec();
    allowed.push("id");

    let instances = hooks.updated_instances(payload, ctx).await?;
    let mut staged = vec![];

    for raw in &instances {
        let (id, instance) = schema::parse_instance(model, raw, &allowed, &["id"])?;
        let id = id.ok_or_else(|| Error::schema("Instance of payload must contain integer id.".to_string()))?;
        hooks.check_permissions(id, &instance, ctx).await?;

        let mut effects = vec![];
        if hooks.resolve_relations() {
            for (field_name, value) in instance.clone() {
                let field = model
                    .field(&field_name)
                    .or_else(|| model.match_template_field(&field_name).map(|(f, _)| f));
                let field = match field {
                    Some(f) if f.is_relation() => f,
                    _ => continue,
                };
                let fx = ctx.resolver().resolve(model, id, field, &value, false, false).await?;
                effects.extend(fx);
            }
        }

        if instance.is_empty() {
            continue;
        }

        let fields_json = schema::instance_to_json_fields(&instance);
        let fqid = FqId::new(model.collection.clone(), id);
        staged.push(Staged { event: Event::Update { fqid, fields: fields_json }, information: "Object updated" });
        for effect in effects {
            apply_effect_to_overlay(ctx, &effect);
            staged.push(Staged {
                event: Event::Update { fqid: effect.target.fqid(), fields: singleton(&effect.target.field, effect.new_value) },
                information: "Object attached to agenda item",
            });
        }
    }

    Ok(finish(staged))
}

/// Hooks a concrete `<collection>.delete` action can override. Delete
/// generally needs no customization; the trait exists for symmetry and for
/// actions that must veto a delete outright.
#[async_trait]
pub trait DeleteHooks: Sync + Send {
    fn collection(&self) -> Collection;

    async fn check_permissions(&self, _id: u64, _ctx: &ActionContext<'_>) -> Result<(), Error> {
        Ok(())
    }
}

pub async fn perform_delete(hooks: &dyn DeleteHooks, payload: &[Json], ctx: &mut ActionContext<'_>) -> Result<ActionResult, Error> {
    let model = schema::require_model(&hooks.collection())?;
    let mut staged = vec![];
    let mut cascaded = vec![];

    for raw in payload {
        let id = raw
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::schema("Instance of payload must contain integer id.".to_string()))?;
        hooks.check_permissions(id, ctx).await?;

        let fqid = FqId::new(model.collection.clone(), id);
        let current = ctx.datastore.get(&fqid, None).await?;

        let mut effects = vec![];
        for field in model.relation_fields() {
            let relation = field.relation.as_ref().unwrap();
            let value_json = current.field(field.name);
            if relation.on_delete != OnDelete::SetNull {
                if relation.on_delete == OnDelete::Protect {
                    let still_present = value_json.map_or(false, |v| !v.is_null() && v != &Json::Array(vec![]));
                    if still_present {
                        return Err(Error::action(format!(
                            "You can not delete {} with id {}, because you have to delete the related {} first.",
                            model.collection, id, relation.to.iter().map(|c| c.as_str()).collect::<Vec<_>>().join("/")
                        )));
                    }
                } else {
                    let nested = cascade_delete(ctx, relation, value_json).await?;
                    cascaded.push(nested);
                }
                continue;
            }
            let current_value = json_field_to_value(field, value_json);
            if current_value.is_null() {
                continue;
            }
            // The proposed value flowing into the resolver is null, not the
            // current value: `resolve`'s add/remove diff is computed against
            // whatever is currently stored, so handing back the same value
            // it would re-read would diff to nothing and clear nothing.
            let fx = ctx
                .resolver()
                .resolve(model, id, field, &crate::value::FieldValue::Null, false, true)
                .await?;
            effects.extend(fx);
        }

        staged.push(Staged { event: Event::Delete { fqid: fqid.clone() }, information: "Object deleted" });
        for effect in effects {
            apply_effect_to_overlay(ctx, &effect);
            staged.push(Staged {
                event: Event::Update { fqid: effect.target.fqid(), fields: singleton(&effect.target.field, effect.new_value) },
                information: "Object updated",
            });
        }
    }

    let own = finish(staged);
    let mut result = ActionResult { events: vec![], information: BTreeMap::new() };
    for nested in cascaded {
        result.events.extend(nested.events);
        for (fqid, lines) in nested.information {
            result.information.entry(fqid).or_default().extend(lines);
        }
    }
    result.events.extend(own.events);
    for (fqid, lines) in own.information {
        result.information.entry(fqid).or_default().extend(lines);
    }

    let deleted: Vec<FqId> = result
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Delete { fqid } => Some(fqid.clone()),
            _ => None,
        })
        .collect();
    result.events.retain(|e| match e {
        Event::Update { fqid, .. } => !deleted.contains(fqid),
        _ => true,
    });
    Ok(result)
}

/// Recursively deletes the objects on the other end of a `Cascade` relation,
/// looking up their own registered `.delete` action so the nested deletion
/// goes through the same hooks (permission checks, further cascades) a
/// top-level call would. The nested transaction's events and information
/// lines are merged into the outer delete's by the caller.
async fn cascade_delete(
    ctx: &mut ActionContext<'_>,
    relation: &crate::model::RelationField,
    value_json: Option<&Json>,
) -> Result<ActionResult, Error> {
    let ids: Vec<u64> = match value_json {
        Some(Json::Array(items)) => items.iter().filter_map(|v| v.as_u64()).collect(),
        Some(Json::Number(n)) => n.as_u64().into_iter().collect(),
        _ => vec![],
    };
    let target = relation
        .single_target()
        .cloned()
        .ok_or_else(|| Error::action("Cannot cascade a generic relation".to_string()))?;
    let registered = registry::lookup(&format!("{}.delete", target));
    let registered = registered.ok_or_else(|| {
        Error::action(format!("Can't cascade the delete action to {} since no delete action was found.", target))
    })?;
    let hooks = registered.as_delete().ok_or_else(|| {
        Error::action(format!("{} does not implement delete", target))
    })?;

    let mut events = vec![];
    let mut information = BTreeMap::new();
    for id in ids {
        let nested_payload = vec![serde_json::json!({ "id": id })];
        let nested = Box::pin(perform_delete(hooks, &nested_payload, ctx)).await?;
        for event in &nested.events {
            ctx.additional_relation_models.insert(event.fqid().clone(), BTreeMap::new());
        }
        events.extend(nested.events);
        for (fqid, lines) in nested.information {
            information.entry(fqid).or_insert_with(Vec::new).extend(lines);
        }
    }
    Ok(ActionResult { events, information })
}

fn json_field_to_value(field: &crate::model::Field, value_json: Option<&Json>) -> crate::value::FieldValue {
    use crate::value::FieldValue;
    let relation = field.relation.as_ref().unwrap();
    match value_json {
        None | Some(Json::Null) => FieldValue::Null,
        Some(json) if relation.generic => {
            if relation.relation_type.is_single_valued() {
                json.as_str().and_then(|s| s.parse().ok()).map(FieldValue::Fqid).unwrap_or(FieldValue::Null)
            } else {
                let items = json
                    .as_array()
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().and_then(|s| s.parse().ok())).collect())
                    .unwrap_or_default();
                FieldValue::FqidList(items)
            }
        }
        Some(json) => {
            if relation.relation_type.is_single_valued() {
                json.as_u64().map(FieldValue::Id).unwrap_or(FieldValue::Null)
            } else {
                let items = json.as_array().map(|arr| arr.iter().filter_map(|v| v.as_u64()).collect()).unwrap_or_default();
                FieldValue::IdList(items)
            }
        }
    }
}
