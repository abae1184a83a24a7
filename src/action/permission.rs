//! Organisation-, committee-, and group-scoped permission checks, grounded
//! in the reference codebase's `permission_helper` module. Management
//! levels are plain fields on `user`: `organisation_management_level` is a
//! single scalar, `committee_$_management_level` is a per-committee
//! template field (instantiated the same way `group_$_ids` is), both read
//! straight off the datastore rather than routed through the model
//! registry since no action ever writes them directly.

use crate::action::ActionContext;
use crate::patterns::{Collection, FqId};
use crate::Error;

pub const CAN_MANAGE_ORGANISATION: &str = "can_manage_organisation";
pub const COMMITTEE_CAN_MANAGE: &str = "can_manage";

/// True if `user_id` carries at least `required` at the organisation
/// level. The only level above "no right" that exists in this system is
/// `can_manage_organisation`, so this is an equality check rather than a
/// rank comparison.
pub async fn has_organisation_management_level(
    ctx: &ActionContext<'_>,
    user_id: u64,
    required: &str,
) -> Result<bool, Error> {
    let fqid = FqId::new(Collection::new("user"), user_id);
    let user = ctx.datastore.get(&fqid, Some(&["organisation_management_level".to_string()])).await?;
    Ok(user.field("organisation_management_level").and_then(|v| v.as_str()) == Some(required))
}

/// True if `user_id` carries at least `required` for `committee_id`.
pub async fn has_committee_management_level(
    ctx: &ActionContext<'_>,
    user_id: u64,
    required: &str,
    committee_id: u64,
) -> Result<bool, Error> {
    let field_name = format!("committee_{}_management_level", committee_id);
    let fqid = FqId::new(Collection::new("user"), user_id);
    let user = ctx.datastore.get(&fqid, Some(&[field_name.clone()])).await?;
    Ok(user.field(&field_name).and_then(|v| v.as_str()) == Some(required))
}
