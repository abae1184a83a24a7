//! The name-keyed dispatch table mapping `"<collection>.<verb>"` strings to
//! concrete action implementations, grounded in the reference codebase's
//! `actions_map` registration decorator. Built once behind a
//! `once_cell::sync::Lazy`, the idiomatic analogue of that module-level
//! dict populated at import time.

use super::actions;
use super::{perform_create, perform_delete, perform_update};
use super::{ActionContext, ActionResult, CreateHooks, DeleteHooks, UpdateHooks};
use crate::Error;
use once_cell::sync::Lazy;
use serde_json::Value as Json;
use std::collections::HashMap;

/// One dispatch-table entry. An action implements exactly one of the three
/// hook traits; `RegisteredAction` lets `lookup` hand back a reference typed
/// for whichever of `perform_create`/`perform_update`/`perform_delete` the
/// caller needs, without forcing every action to implement all three.
pub enum RegisteredAction {
    Create(Box<dyn CreateHooks>),
    Update(Box<dyn UpdateHooks>),
    Delete(Box<dyn DeleteHooks>),
}

impl RegisteredAction {
    pub fn as_create(&self) -> Option<&dyn CreateHooks> {
        match self {
            RegisteredAction::Create(hooks) => Some(hooks.as_ref()),
            _ => None,
        }
    }

    pub fn as_update(&self) -> Option<&dyn UpdateHooks> {
        match self {
            RegisteredAction::Update(hooks) => Some(hooks.as_ref()),
            _ => None,
        }
    }

    pub fn as_delete(&self) -> Option<&dyn DeleteHooks> {
        match self {
            RegisteredAction::Delete(hooks) => Some(hooks.as_ref()),
            _ => None,
        }
    }

    /// Runs this action against its payload, dispatching to whichever of
    /// the three generic drivers matches the registered kind.
    pub async fn perform(&self, payload: &[Json], ctx: &mut ActionContext<'_>) -> Result<ActionResult, Error> {
        match self {
            RegisteredAction::Create(hooks) => perform_create(hooks.as_ref(), payload, ctx).await,
            RegisteredAction::Update(hooks) => perform_update(hooks.as_ref(), payload, ctx).await,
            RegisteredAction::Delete(hooks) => perform_delete(hooks.as_ref(), payload, ctx).await,
        }
    }
}

static REGISTRY: Lazy<HashMap<&'static str, RegisteredAction>> = Lazy::new(build_registry);

fn build_registry() -> HashMap<&'static str, RegisteredAction> {
    let mut map: HashMap<&'static str, RegisteredAction> = HashMap::new();
    map.insert("agenda_item.create", RegisteredAction::Create(Box::new(actions::agenda_item::Create)));
    map.insert("agenda_item.update", RegisteredAction::Update(Box::new(actions::agenda_item::Update)));
    map.insert("agenda_item.delete", RegisteredAction::Delete(Box::new(actions::agenda_item::Delete)));
    map.insert("agenda_item.assign", RegisteredAction::Update(Box::new(actions::agenda_item::Assign)));
    map.insert("agenda_item.numbering", RegisteredAction::Update(Box::new(actions::agenda_item::Numbering)));
    map.insert("topic.create", RegisteredAction::Create(Box::new(actions::topic::Create)));
    map.insert("topic.update", RegisteredAction::Update(Box::new(actions::topic::Update)));
    map.insert("topic.delete", RegisteredAction::Delete(Box::new(actions::topic::Delete)));
    map.insert("motion_workflow.create", RegisteredAction::Create(Box::new(actions::motion_workflow::Create)));
    map.insert("motion_workflow.delete", RegisteredAction::Delete(Box::new(actions::motion_workflow::Delete)));
    map.insert("motion_state.delete", RegisteredAction::Delete(Box::new(actions::motion_workflow::DeleteState)));
    map.insert("committee.update", RegisteredAction::Update(Box::new(actions::committee::Update)));
    map
}

pub fn lookup(name: &str) -> Option<&'static RegisteredAction> {
    REGISTRY.get(name)
}

/// Runs one named action's payload, used by both the HTTP dispatcher and
/// tests that want to exercise an action by its registered name rather than
/// constructing its hooks struct directly.
pub async fn dispatch(name: &str, payload: &[Json], ctx: &mut ActionContext<'_>) -> Result<ActionResult, Error> {
    let action = lookup(name).ok_or_else(|| Error::action(format!("Action '{}' does not exist.", name)))?;
    action.perform(payload, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_entry_resolves_to_one_kind() {
        for name in [
            "agenda_item.create",
            "agenda_item.update",
            "agenda_item.delete",
            "agenda_item.assign",
            "agenda_item.numbering",
            "topic.create",
            "topic.update",
            "topic.delete",
            "motion_workflow.create",
            "motion_workflow.delete",
            "motion_state.delete",
            "committee.update",
        ] {
            assert!(lookup(name).is_some(), "missing action {}", name);
        }
        assert!(lookup("bogus.verb").is_none());
    }
}
