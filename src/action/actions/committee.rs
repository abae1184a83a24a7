//! `committee.update`. Grounded in the reference codebase's
//! `CommitteeUpdateAction.check_permissions`: the fields being edited
//! determine which management level the acting user must carry, not the
//! action as a whole — name/description need committee management,
//! user_ids needs organisation management, and a payload touching both
//! needs both.

use crate::action::permission::{has_committee_management_level, has_organisation_management_level, CAN_MANAGE_ORGANISATION, COMMITTEE_CAN_MANAGE};
use crate::action::{ActionContext, UpdateHooks};
use crate::patterns::Collection;
use crate::value::Instance;
use crate::Error;
use async_trait::async_trait;

const COMMITTEE_SCOPED: &[&str] = &["name", "description"];
const ORGANISATION_SCOPED: &[&str] = &["user_ids"];

pub struct Update;

#[async_trait]
impl UpdateHooks for Update {
    fn collection(&self) -> Collection {
        Collection::new("committee")
    }

    fn optional(&self) -> &'static [&'static str] {
        &["name", "description", "user_ids"]
    }

    async fn check_permissions(&self, committee_id: u64, instance: &Instance, ctx: &ActionContext<'_>) -> Result<(), Error> {
        let touches = |fields: &[&str]| fields.iter().any(|f| instance.get(*f).is_some());

        if touches(COMMITTEE_SCOPED) {
            let is_manager = has_committee_management_level(ctx, ctx.user_id, COMMITTEE_CAN_MANAGE, committee_id).await?;
            if !is_manager {
                return Err(Error::permission(COMMITTEE_CAN_MANAGE));
            }
        }
        if touches(ORGANISATION_SCOPED) {
            let can_manage_organisation = has_organisation_management_level(ctx, ctx.user_id, CAN_MANAGE_ORGANISATION).await?;
            if !can_manage_organisation {
                return Err(Error::permission(CAN_MANAGE_ORGANISATION));
            }
        }
        Ok(())
    }
}
