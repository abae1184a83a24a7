//! Concrete actions, one module per collection, each implementing the hook
//! trait that matches its verb (or several verbs where one collection
//! needs more than one: `agenda_item` has create/update/delete plus the two
//! custom actions `assign` and `numbering`).

pub mod agenda_item;
pub mod committee;
pub mod motion_workflow;
pub mod topic;
