use proptest::prelude::*;
use seg_core::{labels, ItemId, ItemKind};
use seg_graph::{GraphError, RelationshipGraph};

fn kind_strategy() -> impl Strategy<Value = ItemKind> {
    prop_oneof![
        Just(ItemKind::Sample),
        Just(ItemKind::Channel),
        Just(ItemKind::Filter),
        Just(ItemKind::Segmentation),
    ]
}

fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(labels::CREATE_LINK.to_string()),
        Just(labels::VOLUME.to_string()),
        Just(labels::STAIN.to_string()),
        Just("0".to_string()),
        Just("1".to_string()),
    ]
}

proptest! {
    #[test]
    fn prop_dependency_subgraph_stays_acyclic(
        kinds in proptest::collection::vec(kind_strategy(), 1..16),
        edges in proptest::collection::vec((0..16u32, 0..16u32, label_strategy()), 0..60)
    ) {
        let mut graph = RelationshipGraph::new();
        for (raw, kind) in kinds.iter().enumerate() {
            graph.add_item(ItemId::new(u32::try_from(raw).unwrap()), *kind).unwrap();
        }

        for (from, to, label) in edges {
            let result = graph.add_relation(ItemId::new(from), ItemId::new(to), label);
            if let Err(err) = result {
                prop_assert!(matches!(
                    err,
                    GraphError::UnknownItem(_)
                        | GraphError::SelfLoop(_)
                        | GraphError::DuplicateRelation(_)
                        | GraphError::SecondAncestor { .. }
                        | GraphError::CycleDetected(_)
                ), "unexpected error variant: {:?}", err);
            }
            // Invariant: every accepted edge keeps the dependency DAG acyclic.
            prop_assert!(graph.is_dependency_acyclic());
        }

        for id in graph.items().collect::<Vec<_>>() {
            prop_assert!(graph.ancestors(id, Some(labels::CREATE_LINK)).len() <= 1);
            prop_assert!(graph.ancestors(id, Some(labels::VOLUME)).len() <= 1);
        }

        let order = graph.dependency_order().unwrap();
        prop_assert_eq!(order.len(), graph.item_count());
    }

    #[test]
    fn prop_relations_keep_insertion_order(
        labels in proptest::collection::vec("[a-z]{1,4}", 1..20)
    ) {
        let mut graph = RelationshipGraph::new();
        graph.add_item(ItemId::new(0), ItemKind::Sample).unwrap();
        graph.add_item(ItemId::new(1), ItemKind::Segmentation).unwrap();

        let mut accepted = Vec::new();
        for label in labels {
            if graph.add_relation(ItemId::new(0), ItemId::new(1), label.clone()).is_ok() {
                accepted.push(label);
            }
        }
        let stored: Vec<String> = graph.relations().into_iter().map(|r| r.label).collect();
        prop_assert_eq!(stored, accepted);
    }
}

#[test]
fn test_rejects_volume_cycle_through_filters() {
    let mut graph = RelationshipGraph::new();
    let reader = ItemId::new(1);
    let channel = ItemId::new(2);
    let seg_filter = ItemId::new(3);
    graph.add_item(reader, ItemKind::Filter).unwrap();
    graph.add_item(channel, ItemKind::Channel).unwrap();
    graph.add_item(seg_filter, ItemKind::Filter).unwrap();

    graph.add_relation(reader, channel, labels::VOLUME).unwrap();
    graph.add_relation(reader, seg_filter, labels::input_slot(0, 0)).unwrap();

    // Cycle: seg_filter -> reader through an input slot
    assert!(matches!(
        graph.add_relation(seg_filter, reader, labels::input_slot(0, 0)),
        Err(GraphError::CycleDetected(_))
    ));
    // Stain edges never count as dependencies
    assert!(graph.add_relation(channel, reader, labels::STAIN).is_ok());
}

#[test]
fn test_removed_items_leave_no_edges() {
    let mut graph = RelationshipGraph::new();
    let sample = ItemId::new(1);
    let channel = ItemId::new(2);
    graph.add_item(sample, ItemKind::Sample).unwrap();
    graph.add_item(channel, ItemKind::Channel).unwrap();
    graph.add_relation(sample, channel, labels::STAIN).unwrap();

    graph.remove_relations_of(channel).unwrap();
    graph.remove_item(channel).unwrap();

    assert_eq!(graph.relation_count(), 0);
    assert!(graph.successors(sample, None).is_empty());
    assert_eq!(graph.items().collect::<Vec<_>>(), vec![sample]);
}
