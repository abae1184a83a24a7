//! `motion_workflow.create` (with its dependent default state), plus
//! `motion_workflow.delete` and `motion_state.delete`. Grounded in the
//! reference codebase's `MotionWorkflowCreate`, whose `Dependencies` list
//! names the default-state creation that runs immediately after the
//! workflow itself; the two deletes need no custom logic now that
//! `motion_workflow.state_ids` is `Cascade` and `motion_state.workflow_id`
//! is `SetNull` in the model registry.

use crate::action::{ActionContext, CreateHooks, DeleteHooks, Dependent};
use crate::patterns::Collection;
use crate::value::Instance;
use crate::Error;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;

pub struct Create;

#[async_trait]
impl CreateHooks for Create {
    fn collection(&self) -> Collection {
        Collection::new("motion_workflow")
    }

    fn required(&self) -> &'static [&'static str] {
        &["name", "meeting_id"]
    }

    async fn dependents(&self, new_id: u64, _instance: &Instance, _ctx: &mut ActionContext<'_>) -> Result<Vec<Dependent>, Error> {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), json!("default"));
        fields.insert("workflow_id".to_string(), json!(new_id));
        fields.insert("first_state_of_workflow_id".to_string(), json!(new_id));
        Ok(vec![Dependent {
            collection: Collection::new("motion_state"),
            fields,
            back_reference: Some("first_state_id"),
        }])
    }
}

pub struct Delete;

#[async_trait]
impl DeleteHooks for Delete {
    fn collection(&self) -> Collection {
        Collection::new("motion_workflow")
    }
}

pub struct DeleteState;

#[async_trait]
impl DeleteHooks for DeleteState {
    fn collection(&self) -> Collection {
        Collection::new("motion_state")
    }
}
