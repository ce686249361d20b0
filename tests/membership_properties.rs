//! Property tests for membership transitions.

use oneway::{
    membership_diff, Action, Binding, BindingEngine, ChannelLayer, DataSerializer, Delivery,
    GroupSet, LayerMessage, Model, PrimaryKey, RecordKind, Result, SerdeSerializer, Table,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Clone, Debug, Serialize)]
struct Doc {
    id: Option<i64>,
    groups: BTreeSet<String>,
}

impl Model for Doc {
    fn kind() -> RecordKind {
        RecordKind::new("docs", "Doc")
    }

    fn pk(&self) -> Option<PrimaryKey> {
        self.id.map(PrimaryKey::Int)
    }

    fn set_pk(&mut self, pk: PrimaryKey) {
        if let PrimaryKey::Int(v) = pk {
            self.id = Some(v);
        }
    }
}

struct DocBinding;

impl Binding for DocBinding {
    type Model = Doc;

    fn stream(&self) -> &str {
        "docs"
    }

    fn group_names(&self, doc: &Doc) -> Vec<String> {
        doc.groups.iter().cloned().collect()
    }

    fn serializer(&self) -> Option<&dyn DataSerializer<Doc>> {
        Some(&SerdeSerializer)
    }
}

#[derive(Default)]
struct GroupLog {
    sent: Mutex<Vec<(String, String)>>,
}

impl ChannelLayer for GroupLog {
    fn group_send(&self, group: &str, message: LayerMessage) -> Result<()> {
        let frame: serde_json::Value = serde_json::from_str(&message.content)?;
        let action = frame["payload"]["action"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.sent.lock().push((group.to_string(), action));
        Ok(())
    }
}

impl GroupLog {
    fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

fn group_set() -> impl Strategy<Value = GroupSet> {
    prop::collection::btree_set(prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]), 0..6)
        .prop_map(|set| set.into_iter().map(String::from).collect())
}

/// Messages per group, in send order.
fn by_group(sent: &[(String, String)]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (group, action) in sent {
        map.entry(group.clone()).or_default().push(action.clone());
    }
    map
}

fn rank(action: &str) -> u8 {
    match action {
        "delete" => 0,
        "update" => 1,
        _ => 2,
    }
}

proptest! {
    #[test]
    fn diff_partitions_union(old in group_set(), new in group_set()) {
        let [(_, deleted), (_, updated), (_, created)] = membership_diff(&old, &new);

        prop_assert!(deleted.is_disjoint(&updated));
        prop_assert!(updated.is_disjoint(&created));
        prop_assert!(deleted.is_disjoint(&created));

        let union: GroupSet = old.union(&new).cloned().collect();
        let covered: GroupSet = deleted
            .iter()
            .chain(&updated)
            .chain(&created)
            .cloned()
            .collect();
        prop_assert_eq!(union, covered);
    }

    #[test]
    fn create_reaches_each_initial_group_once(groups in group_set()) {
        let layer = Arc::new(GroupLog::default());
        let engine = BindingEngine::new(Delivery::new(layer.clone()));
        let table = Table::new();
        engine.register(&table, DocBinding).unwrap();

        let mut doc = Doc { id: None, groups: groups.clone() };
        table.save(&mut doc).unwrap();

        let sent = layer.take();
        prop_assert_eq!(sent.len(), groups.len());
        for (group, action) in &sent {
            prop_assert!(groups.contains(group));
            prop_assert_eq!(action.as_str(), "create");
        }
    }

    #[test]
    fn update_sends_exactly_the_transition(old in group_set(), new in group_set()) {
        let layer = Arc::new(GroupLog::default());
        let engine = BindingEngine::new(Delivery::new(layer.clone()));
        let table = Table::new();
        engine.register(&table, DocBinding).unwrap();

        let mut doc = Doc { id: None, groups: old.clone() };
        table.save(&mut doc).unwrap();
        layer.take();

        doc.groups = new.clone();
        table.save(&mut doc).unwrap();
        let sent = layer.take();

        let per_group = by_group(&sent);
        let union: GroupSet = old.union(&new).cloned().collect();
        prop_assert_eq!(per_group.len(), union.len());
        for group in &union {
            let expected = match (old.contains(group), new.contains(group)) {
                (true, false) => "delete",
                (true, true) => "update",
                _ => "create",
            };
            prop_assert_eq!(&per_group[group], &vec![expected.to_string()]);
        }

        // All deletes precede all updates, which precede all creates.
        let ranks: Vec<u8> = sent.iter().map(|(_, a)| rank(a)).collect();
        prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn delete_reaches_each_final_group_once(groups in group_set()) {
        let layer = Arc::new(GroupLog::default());
        let engine = BindingEngine::new(Delivery::new(layer.clone()));
        let table = Table::new();
        engine.register(&table, DocBinding).unwrap();

        let mut doc = Doc { id: None, groups: groups.clone() };
        table.save(&mut doc).unwrap();
        layer.take();

        table.delete(&doc).unwrap();
        let sent = layer.take();

        prop_assert_eq!(sent.len(), groups.len());
        prop_assert!(sent.iter().all(|(g, a)| groups.contains(g) && a == "delete"));
    }
}

#[test]
fn test_diff_actions_are_in_dispatch_order() {
    let empty = GroupSet::new();
    let actions: Vec<Action> = membership_diff(&empty, &empty)
        .into_iter()
        .map(|(action, _)| action)
        .collect();
    assert_eq!(actions, vec![Action::Delete, Action::Update, Action::Create]);
}
