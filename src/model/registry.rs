//! Builds the process-wide [`ModelRegistry`] singleton.
//!
//! The reference codebase loads its model definitions from a set of Python
//! classes decorated with field descriptors at import time, and the engine
//! this pipeline is adapted from loads a `Configuration` built from a
//! `ModelMap`/`EntityMap` that is parsed once and reused for the lifetime of
//! the process. Both converge on the same shape: parse or build the schema
//! once, then hand out shared references to it. Here that singleton is a
//! `once_cell::sync::Lazy`, since the model set is fixed Rust data rather
//! than something read from a config file.

use super::{Field, Model, OnDelete, RelationField, RelationType, TemplateInfo};
use crate::patterns::Collection;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub struct ModelRegistry {
    models: HashMap<String, Model>,
}

impl ModelRegistry {
    pub fn get(&self, collection: &Collection) -> Option<&Model> {
        self.models.get(collection.as_str())
    }

    pub fn require(&self, collection: &Collection) -> Result<&Model, crate::Error> {
        self.get(collection)
            .ok_or_else(|| crate::Error::schema(format!("Unknown collection: {}", collection)))
    }

    pub fn field(&self, collection: &Collection, name: &str) -> Option<&Field> {
        self.get(collection).and_then(|m| m.field(name))
    }
}

pub static REGISTRY: Lazy<ModelRegistry> = Lazy::new(build_registry);

fn scalar(name: &'static str) -> Field {
    Field { name, list: false, default: None, read_only: false, relation: None }
}

fn scalar_default(name: &'static str, default: crate::value::FieldValue) -> Field {
    Field { name, list: false, default: Some(default), read_only: false, relation: None }
}

fn relation(
    name: &'static str,
    relation_type: RelationType,
    to: &[&str],
    related_name: &'static str,
    on_delete: OnDelete,
) -> Field {
    Field {
        name,
        list: !relation_type.is_single_valued(),
        default: None,
        read_only: false,
        relation: Some(RelationField {
            relation_type,
            to: to.iter().map(|c| Collection::new(*c)).collect(),
            own_field_name: name,
            related_name,
            on_delete,
            equal_fields: &[],
            generic: to.len() > 1,
            structured_relation: None,
            template: None,
        }),
    }
}

fn template_relation(
    name: &'static str,
    relation_type: RelationType,
    to: &[&str],
    related_name: &'static str,
    on_delete: OnDelete,
    template: TemplateInfo,
) -> Field {
    let mut field = relation(name, relation_type, to, related_name, on_delete);
    field.relation.as_mut().unwrap().template = Some(template);
    field
}

fn build_registry() -> ModelRegistry {
    let mut models = HashMap::new();

    models.insert(
        "meeting".to_string(),
        Model {
            collection: Collection::new("meeting"),
            fields: vec![
                scalar("name"),
                relation(
                    "topic_ids",
                    RelationType::OneToMany,
                    &["topic"],
                    "meeting_id",
                    OnDelete::Cascade,
                ),
                relation(
                    "agenda_item_ids",
                    RelationType::OneToMany,
                    &["agenda_item"],
                    "meeting_id",
                    OnDelete::Cascade,
                ),
                relation(
                    "motion_workflow_ids",
                    RelationType::OneToMany,
                    &["motion_workflow"],
                    "meeting_id",
                    OnDelete::Cascade,
                ),
                relation(
                    "group_ids",
                    RelationType::OneToMany,
                    &["group"],
                    "meeting_id",
                    OnDelete::Cascade,
                ),
                relation(
                    "user_ids",
                    RelationType::ManyToMany,
                    &["user"],
                    "meeting_ids",
                    OnDelete::SetNull,
                ),
            ],
        },
    );

    models.insert(
        "topic".to_string(),
        Model {
            collection: Collection::new("topic"),
            fields: vec![
                scalar("title"),
                relation(
                    "meeting_id",
                    RelationType::ManyToOne,
                    &["meeting"],
                    "topic_ids",
                    OnDelete::SetNull,
                ),
                relation(
                    "agenda_item_id",
                    RelationType::OneToOne,
                    &["agenda_item"],
                    "content_object_id",
                    OnDelete::SetNull,
                ),
            ],
        },
    );

    models.insert(
        "agenda_item".to_string(),
        Model {
            collection: Collection::new("agenda_item"),
            fields: vec![
                scalar_default("type", crate::value::FieldValue::Scalar(1.into())),
                scalar_default("weight", crate::value::FieldValue::Scalar(0.into())),
                scalar_default("item_number", crate::value::FieldValue::Scalar("".into())),
                scalar("duration"),
                scalar("comment"),
                relation(
                    "meeting_id",
                    RelationType::ManyToOne,
                    &["meeting"],
                    "agenda_item_ids",
                    OnDelete::SetNull,
                ),
                {
                    let mut field = relation(
                        "content_object_id",
                        RelationType::OneToOne,
                        &["topic"],
                        "agenda_item_id",
                        OnDelete::SetNull,
                    );
                    field.relation.as_mut().unwrap().generic = true;
                    field
                },
                relation(
                    "parent_id",
                    RelationType::ManyToOne,
                    &["agenda_item"],
                    "child_ids",
                    OnDelete::SetNull,
                ),
                relation(
                    "child_ids",
                    RelationType::OneToMany,
                    &["agenda_item"],
                    "parent_id",
                    OnDelete::SetNull,
                ),
            ],
        },
    );

    models.insert(
        "motion_workflow".to_string(),
        Model {
            collection: Collection::new("motion_workflow"),
            fields: vec![
                scalar("name"),
                relation(
                    "meeting_id",
                    RelationType::ManyToOne,
                    &["meeting"],
                    "motion_workflow_ids",
                    OnDelete::SetNull,
                ),
                relation(
                    "first_state_id",
                    RelationType::OneToOne,
                    &["motion_state"],
                    "first_state_of_workflow_id",
                    OnDelete::SetNull,
                ),
                relation(
                    "state_ids",
                    RelationType::OneToMany,
                    &["motion_state"],
                    "workflow_id",
                    OnDelete::Cascade,
                ),
            ],
        },
    );

    models.insert(
        "motion_state".to_string(),
        Model {
            collection: Collection::new("motion_state"),
            fields: vec![
                scalar("name"),
                relation(
                    "workflow_id",
                    RelationType::ManyToOne,
                    &["motion_workflow"],
                    "state_ids",
                    OnDelete::SetNull,
                ),
                relation(
                    "first_state_of_workflow_id",
                    RelationType::OneToOne,
                    &["motion_workflow"],
                    "first_state_id",
                    OnDelete::SetNull,
                ),
            ],
        },
    );

    models.insert(
        "committee".to_string(),
        Model {
            collection: Collection::new("committee"),
            fields: vec![
                scalar("name"),
                scalar("description"),
                relation(
                    "user_ids",
                    RelationType::ManyToMany,
                    &["user"],
                    "committee_ids",
                    OnDelete::SetNull,
                ),
            ],
        },
    );

    models.insert(
        "group".to_string(),
        Model {
            collection: Collection::new("group"),
            fields: vec![
                scalar("name"),
                relation(
                    "meeting_id",
                    RelationType::ManyToOne,
                    &["meeting"],
                    "group_ids",
                    OnDelete::SetNull,
                ),
                relation("user_ids", RelationType::ManyToMany, &["user"], "group_$_ids", OnDelete::SetNull),
            ],
        },
    );

    models.insert(
        "user".to_string(),
        Model {
            collection: Collection::new("user"),
            fields: vec![
                scalar("username"),
                scalar_default("organisation_management_level", crate::value::FieldValue::Scalar("no_right".into())),
                relation(
                    "committee_ids",
                    RelationType::ManyToMany,
                    &["committee"],
                    "user_ids",
                    OnDelete::SetNull,
                ),
                relation(
                    "meeting_ids",
                    RelationType::ManyToMany,
                    &["meeting"],
                    "user_ids",
                    OnDelete::SetNull,
                ),
                template_relation(
                    "group_$_ids",
                    RelationType::ManyToMany,
                    &["group"],
                    "user_ids",
                    OnDelete::SetNull,
                    TemplateInfo { prefix: "group_", suffix: "_ids" },
                ),
            ],
        },
    );

    ModelRegistry { models }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_collections() {
        let meeting = REGISTRY.require(&Collection::new("meeting")).unwrap();
        assert!(meeting.field("topic_ids").is_some());
    }

    #[test]
    fn unknown_collection_is_a_schema_error() {
        let err = REGISTRY.require(&Collection::new("not_a_thing")).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn template_field_matches_concrete_instantiation() {
        let user = REGISTRY.require(&Collection::new("user")).unwrap();
        let (field, token) = user.match_template_field("group_7_ids").unwrap();
        assert_eq!(field.name, "group_$_ids");
        assert_eq!(token, "7");
        assert!(user.match_template_field("group_ids").is_none());
        assert!(user.match_template_field("group_abc_ids").is_none());
    }

    #[test]
    fn content_object_id_is_generic() {
        let agenda_item = REGISTRY.require(&Collection::new("agenda_item")).unwrap();
        let field = agenda_item.field("content_object_id").unwrap();
        assert!(field.relation.as_ref().unwrap().generic);
    }
}
