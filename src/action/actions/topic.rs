//! `topic.create` / `topic.update` / `topic.delete`. Topics need no custom
//! behavior beyond the generic driver steps, so these hook structs are
//! essentially bare declarations of which fields each verb allows.

use crate::action::{CreateHooks, DeleteHooks, UpdateHooks};
use crate::patterns::Collection;
use async_trait::async_trait;

pub struct Create;

#[async_trait]
impl CreateHooks for Create {
    fn collection(&self) -> Collection {
        Collection::new("topic")
    }
    fn required(&self) -> &'static [&'static str] {
        &["meeting_id", "title"]
    }
}

pub struct Update;

#[async_trait]
impl UpdateHooks for Update {
    fn collection(&self) -> Collection {
        Collection::new("topic")
    }
    fn optional(&self) -> &'static [&'static str] {
        &["title"]
    }
}

pub struct Delete;

#[async_trait]
impl DeleteHooks for Delete {
    fn collection(&self) -> Collection {
        Collection::new("topic")
    }
}
