#![forbid(unsafe_code)]

//! Property tests for the structural invariants of the projection:
//! index completeness, pre-order/level consistency, expand idempotence,
//! and expand/collapse round-trips, over randomly generated trees and
//! operation sequences.

use proptest::prelude::*;
use proptest::sample::Index;
use treerow::{ExpandState, MemoryTree, TreeDataSource, TreeProjector};

/// Node i's spec: (parent among nodes 0..i, container flag).
type TreeSpec = Vec<(Index, bool)>;

/// (operation selector, node selector).
type OpSpec = Vec<(u8, Index)>;

fn tree_spec() -> impl Strategy<Value = TreeSpec> {
    prop::collection::vec((any::<Index>(), any::<bool>()), 0..32)
}

fn op_spec() -> impl Strategy<Value = OpSpec> {
    prop::collection::vec((0..4u8, any::<Index>()), 0..24)
}

fn build_tree(spec: &TreeSpec) -> (MemoryTree, usize) {
    let tree = MemoryTree::new();
    tree.insert(None, "n0", true);
    for (i, (parent, container)) in spec.iter().enumerate() {
        let parent = format!("n{}", parent.index(i + 1));
        let id = format!("n{}", i + 1);
        assert!(tree.insert(Some(&parent), &id, *container));
    }
    (tree, spec.len() + 1)
}

fn pick_node(index: &Index, node_count: usize) -> String {
    format!("n{}", index.index(node_count))
}

fn run_local<F: Future>(fut: F) -> F::Output {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, fut)
}

fn rows_of(source: &TreeDataSource<String>) -> Vec<String> {
    (0..source.size().rows)
        .map(|i| source.model_for_position(i).unwrap())
        .collect()
}

/// Index completeness, O(1) position consistency, pre-order levels,
/// and the out-of-range boundary.
fn check_invariants(source: &TreeDataSource<String>) {
    let size = source.size();
    assert_eq!(size.cols, 1);
    assert_eq!(source.model_for_position(size.rows), None);

    let mut prev_level: Option<usize> = None;
    for i in 0..size.rows {
        let node = source.model_for_position(i).expect("visible row populated");
        assert_eq!(source.position_of_model(&node), Some(i));
        let state = source
            .node_state_for(&node)
            .expect("visible node has a state");
        match prev_level {
            None => assert_eq!(state.level, 0, "first row must be level 0"),
            Some(prev) => assert!(
                state.level <= prev + 1,
                "level may only deepen by 1 per row"
            ),
        }
        prev_level = Some(state.level);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_operations_preserve_invariants(spec in tree_spec(), ops in op_spec()) {
        run_local(async {
            let (tree, node_count) = build_tree(&spec);
            let source = TreeDataSource::new(TreeProjector::with_inspector(tree));
            source.set_root(Some("n0".to_string())).await.unwrap();
            check_invariants(&source);

            for (op, which) in &ops {
                let node = pick_node(which, node_count);
                // Unmaterialized targets legitimately fail; the
                // invariants must hold either way.
                let _ = match *op {
                    0 => source.expand_node(&node).await,
                    1 => source.collapse_node(&node).await,
                    2 => source.refresh_node(&node).await,
                    _ => source.reveal_node(&node).await,
                };
                check_invariants(&source);
            }
        });
    }

    #[test]
    fn expand_is_idempotent_everywhere(spec in tree_spec(), which in any::<Index>()) {
        run_local(async {
            let (tree, node_count) = build_tree(&spec);
            let source = TreeDataSource::new(TreeProjector::with_inspector(tree));
            source.set_root(Some("n0".to_string())).await.unwrap();

            let node = pick_node(&which, node_count);
            source.reveal_node(&node).await.ok();
            let first = source.expand_node(&node).await;
            let after_once = rows_of(&source);
            let second = source.expand_node(&node).await;
            prop_assert_eq!(first.is_ok(), second.is_ok());
            prop_assert_eq!(rows_of(&source), after_once);
            check_invariants(&source);
            Ok(())
        })?;
    }

    #[test]
    fn expand_collapse_round_trips(spec in tree_spec(), which in any::<Index>()) {
        run_local(async {
            let (tree, node_count) = build_tree(&spec);
            let source = TreeDataSource::new(TreeProjector::with_inspector(tree));
            source.set_root(Some("n0".to_string())).await.unwrap();

            let node = pick_node(&which, node_count);
            source.reveal_node(&node).await.ok();
            let collapsed_before = source
                .node_state_for(&node)
                .is_some_and(|s| s.state == ExpandState::Closed);
            if collapsed_before {
                let before = rows_of(&source);
                source.expand_node(&node).await.unwrap();
                source.collapse_node(&node).await.unwrap();
                prop_assert_eq!(rows_of(&source), before);
                check_invariants(&source);
            }
            Ok(())
        })?;
    }
}
