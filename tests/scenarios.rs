//! Scenario-level integration tests exercising whole actions end to end
//! against the in-memory datastore, one test per testable property this
//! pipeline is built against.

use meeting_actions::action::registry;
use meeting_actions::action::ActionContext;
use meeting_actions::datastore::memory::MemoryDatastore;
use meeting_actions::datastore::{Datastore, Event, WriteRequest};
use meeting_actions::patterns::{Collection, FqId};
use serde_json::json;
use std::collections::BTreeMap;

fn fields(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

async fn apply(store: &MemoryDatastore, result: meeting_actions::action::ActionResult) {
    let locked_fields = store.locked_fields();
    store
        .write(WriteRequest { events: result.events, information: result.information, user_id: 1, locked_fields })
        .await
        .unwrap();
}

#[tokio::test]
async fn s1_agenda_item_create_sets_meeting_id_and_both_reverse_links() {
    let store = MemoryDatastore::new();
    let meeting = FqId::new(Collection::new("meeting"), 7816466305);
    let topic = FqId::new(Collection::new("topic"), 1312354708);
    store.seed(&meeting, BTreeMap::new());
    store.seed(&topic, fields(&[("meeting_id", json!(7816466305i64))]));

    let mut ctx = ActionContext::new(&store, 1);
    let result = registry::dispatch("agenda_item.create", &[json!({"content_object_id": "topic/1312354708"})], &mut ctx)
        .await
        .unwrap();

    let new_id = result
        .events
        .iter()
        .find_map(|e| match e {
            Event::Create { fqid, .. } if fqid.collection.as_str() == "agenda_item" => Some(fqid.id),
            _ => None,
        })
        .expect("agenda_item create event");

    let locked = store.locked_fields();
    assert!(locked.keys().any(|k| k.starts_with("meeting/7816466305")));
    assert!(locked.keys().any(|k| k.starts_with("topic/1312354708")));

    apply(&store, result).await;

    let created = store.snapshot(&FqId::new(Collection::new("agenda_item"), new_id)).unwrap();
    assert_eq!(created.get("meeting_id"), Some(&json!(7816466305i64)));
    assert_eq!(created.get("content_object_id"), Some(&json!("topic/1312354708")));
    assert_eq!(created.get("type"), Some(&json!(1)));
    assert_eq!(created.get("weight"), Some(&json!(0)));

    let topic_after = store.snapshot(&topic).unwrap();
    assert_eq!(topic_after.get("agenda_item_id"), Some(&json!(new_id)));

    let meeting_after = store.snapshot(&meeting).unwrap();
    assert_eq!(meeting_after.get("agenda_item_ids"), Some(&json!([new_id])));
}

#[tokio::test]
async fn s2_agenda_item_update_scalar_only_touches_nothing_else() {
    let store = MemoryDatastore::new();
    let item = FqId::new(Collection::new("agenda_item"), 3393211712);
    store.seed(&item, fields(&[("meeting_id", json!(9079236097i64))]));

    let mut ctx = ActionContext::new(&store, 1);
    let result = registry::dispatch("agenda_item.update", &[json!({"id": 3393211712i64, "duration": 3600})], &mut ctx)
        .await
        .unwrap();

    assert_eq!(result.events.len(), 1);
    match &result.events[0] {
        Event::Update { fqid, fields } => {
            assert_eq!(fqid.id, 3393211712);
            assert_eq!(fields.get("duration"), Some(&json!(3600)));
            assert_eq!(fields.len(), 1);
        }
        other => panic!("expected a single update event, got {:?}", other),
    }
    assert!(store.locked_fields().is_empty());
}

#[tokio::test]
async fn s3_agenda_item_delete_clears_both_set_null_reverses() {
    let store = MemoryDatastore::new();
    let meeting = FqId::new(Collection::new("meeting"), 9079236097);
    let topic = FqId::new(Collection::new("topic"), 5756367535);
    let item = FqId::new(Collection::new("agenda_item"), 3393211712);
    store.seed(&meeting, fields(&[("agenda_item_ids", json!([3393211712i64]))]));
    store.seed(&topic, fields(&[("agenda_item_id", json!(3393211712i64))]));
    store.seed(
        &item,
        fields(&[
            ("meeting_id", json!(9079236097i64)),
            ("content_object_id", json!("topic/5756367535")),
        ]),
    );

    let mut ctx = ActionContext::new(&store, 1);
    let result = registry::dispatch("agenda_item.delete", &[json!({"id": 3393211712i64})], &mut ctx).await.unwrap();
    assert!(result.events.iter().any(|e| matches!(e, Event::Delete { fqid } if fqid.id == 3393211712)));

    apply(&store, result).await;

    assert!(store.snapshot(&item).is_none());
    let topic_after = store.snapshot(&topic).unwrap();
    assert_eq!(topic_after.get("agenda_item_id"), None);
    let meeting_after = store.snapshot(&meeting).unwrap();
    assert_eq!(meeting_after.get("agenda_item_ids"), Some(&json!([])));
}

#[tokio::test]
async fn s4_agenda_item_assign_reparents_and_rejects_cycles() {
    let store = MemoryDatastore::new();
    let one = FqId::new(Collection::new("agenda_item"), 1);
    let two = FqId::new(Collection::new("agenda_item"), 2);
    let three = FqId::new(Collection::new("agenda_item"), 3);
    for fqid in [&one, &two, &three] {
        store.seed(fqid, fields(&[("meeting_id", json!(1))]));
    }

    let mut ctx = ActionContext::new(&store, 1);
    let result = registry::dispatch(
        "agenda_item.assign",
        &[json!({"ids": [2, 3], "parent_id": 1, "meeting_id": 1})],
        &mut ctx,
    )
    .await
    .unwrap();
    assert_eq!(result.events.len(), 2);
    for event in &result.events {
        match event {
            Event::Update { fields, .. } => assert_eq!(fields.get("parent_id"), Some(&json!(1))),
            other => panic!("expected update events, got {:?}", other),
        }
    }
    apply(&store, result).await;

    let mut ctx = ActionContext::new(&store, 1);
    let err = registry::dispatch("agenda_item.assign", &[json!({"ids": [1], "parent_id": 2, "meeting_id": 1})], &mut ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Assigning item 1 to one of its children is not possible."));
}

#[tokio::test]
async fn s5_agenda_item_numbering_walks_the_tree_depth_first() {
    const INTERNAL_ITEM: i64 = 2;
    let store = MemoryDatastore::new();
    store.seed(
        &FqId::new(Collection::new("agenda_item"), 1),
        fields(&[("meeting_id", json!(1)), ("weight", json!(0)), ("type", json!(1))]),
    );
    store.seed(
        &FqId::new(Collection::new("agenda_item"), 2),
        fields(&[("meeting_id", json!(1)), ("parent_id", json!(1)), ("weight", json!(0)), ("type", json!(1))]),
    );
    store.seed(
        &FqId::new(Collection::new("agenda_item"), 3),
        fields(&[("meeting_id", json!(1)), ("parent_id", json!(1)), ("weight", json!(1)), ("type", json!(1))]),
    );

    let mut ctx = ActionContext::new(&store, 1);
    let result = registry::dispatch("agenda_item.numbering", &[json!({"meeting_id": 1})], &mut ctx).await.unwrap();
    let numbers: BTreeMap<u64, String> = result
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Update { fqid, fields } => {
                fields.get("item_number").and_then(|v| v.as_str()).map(|n| (fqid.id, n.to_string()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(numbers.get(&1), Some(&"1".to_string()));
    assert_eq!(numbers.get(&2), Some(&"1.1".to_string()));
    assert_eq!(numbers.get(&3), Some(&"1.2".to_string()));

    let store = MemoryDatastore::new();
    store.seed(
        &FqId::new(Collection::new("agenda_item"), 1),
        fields(&[("meeting_id", json!(1)), ("weight", json!(0)), ("type", json!(1))]),
    );
    store.seed(
        &FqId::new(Collection::new("agenda_item"), 2),
        fields(&[
            ("meeting_id", json!(1)),
            ("parent_id", json!(1)),
            ("weight", json!(0)),
            ("type", json!(INTERNAL_ITEM)),
        ]),
    );
    let mut ctx = ActionContext::new(&store, 1);
    let result = registry::dispatch("agenda_item.numbering", &[json!({"meeting_id": 1})], &mut ctx).await.unwrap();
    let child_number = result.events.iter().find_map(|e| match e {
        Event::Update { fqid, fields } if fqid.id == 2 => fields.get("item_number").and_then(|v| v.as_str()),
        _ => None,
    });
    assert_eq!(child_number, Some(""));
}

#[tokio::test]
async fn s6_motion_workflow_create_also_creates_its_default_state() {
    let store = MemoryDatastore::new();
    let mut ctx = ActionContext::new(&store, 1);
    let result = registry::dispatch("motion_workflow.create", &[json!({"name": "w", "meeting_id": 42})], &mut ctx)
        .await
        .unwrap();

    let created: Vec<_> = result
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Create { fqid, fields } => Some((fqid.clone(), fields.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 2);

    apply(&store, result).await;

    let workflow = store.snapshot(&FqId::new(Collection::new("motion_workflow"), 1)).unwrap();
    assert_eq!(workflow.get("name"), Some(&json!("w")));
    assert_eq!(workflow.get("first_state_id"), Some(&json!(1)));
    assert_eq!(workflow.get("state_ids"), Some(&json!([1])));

    let state = store.snapshot(&FqId::new(Collection::new("motion_state"), 1)).unwrap();
    assert_eq!(state.get("name"), Some(&json!("default")));
    assert_eq!(state.get("workflow_id"), Some(&json!(1)));
    assert_eq!(state.get("first_state_of_workflow_id"), Some(&json!(1)));
}

#[tokio::test]
async fn s7_committee_update_permission_split() {
    let store = MemoryDatastore::new();
    let committee = FqId::new(Collection::new("committee"), 10);
    store.seed(&committee, fields(&[("name", json!("old name"))]));

    let manager = FqId::new(Collection::new("user"), 1);
    store.seed(&manager, fields(&[("committee_10_management_level", json!("can_manage"))]));
    let org_admin = FqId::new(Collection::new("user"), 2);
    store.seed(&org_admin, fields(&[("organisation_management_level", json!("can_manage_organisation"))]));
    let nobody = FqId::new(Collection::new("user"), 3);
    store.seed(&nobody, BTreeMap::new());

    let mut ctx = ActionContext::new(&store, 1);
    registry::dispatch("committee.update", &[json!({"id": 10, "name": "new name"})], &mut ctx).await.unwrap();

    let mut ctx = ActionContext::new(&store, 2);
    registry::dispatch("committee.update", &[json!({"id": 10, "user_ids": [2]})], &mut ctx).await.unwrap();

    let mut ctx = ActionContext::new(&store, 3);
    let err = registry::dispatch("committee.update", &[json!({"id": 10, "name": "nope"})], &mut ctx).await.unwrap_err();
    assert_eq!(err.status_code(), 403);

    let mut ctx = ActionContext::new(&store, 1);
    let err = registry::dispatch("committee.update", &[json!({"id": 10, "user_ids": [1]})], &mut ctx).await.unwrap_err();
    assert_eq!(err.status_code(), 403);
}
