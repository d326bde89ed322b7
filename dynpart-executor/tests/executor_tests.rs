use std::sync::Arc;

use dynpart_executor::{
    BoxedNode, ExecutorConfig, NestedLoopJoinExec, PartitionSelectorSpec, PlanNode, QueryExecution,
    SequenceExec, ValuesExec, explain_plan,
};
use dynpart_expr::{CompareOp, Expr};
use dynpart_partition::{
    PartitionBound, PartitionHierarchy, PartitionKey, PartitionLevel, PartitionRule,
    SelectedPartition, SelectionPredicates, StaticPartitionCatalog,
};
use dynpart_result::Error;
use dynpart_scan::{DynamicScanSpec, SeqAccess};
use dynpart_storage::{MemStorage, StorageKind};
use dynpart_test_utils::init_tracing_for_tests;
use dynpart_types::{
    ColumnDef, DataType, RelationId, RelationSchema, Row, ScanSlotId, SelectorId, Value, row,
};

const ROOT: RelationId = RelationId::new(1);
const EAST: RelationId = RelationId::new(101);
const WEST: RelationId = RelationId::new(102);
const OTHER: RelationId = RelationId::new(103);
const SLOT: ScanSlotId = ScanSlotId::new(1);
const SELECTOR: SelectorId = SelectorId::new(1);

struct Fixture {
    storage: Arc<MemStorage>,
    catalog: Arc<StaticPartitionCatalog>,
}

impl Fixture {
    fn query(&self) -> QueryExecution {
        QueryExecution::new(
            self.storage.clone(),
            self.catalog.clone(),
            ExecutorConfig::default().with_log_selected_partitions(true),
        )
    }
}

/// `orders` list-partitioned on region. The default partition predates a
/// dropped column and has a hole in its layout.
fn fixture() -> Fixture {
    init_tracing_for_tests();
    let layout = || {
        RelationSchema::new(vec![
            ColumnDef::new("region", DataType::Text),
            ColumnDef::new("amount", DataType::Int),
        ])
    };
    let holed = RelationSchema::new(vec![
        ColumnDef::new("region", DataType::Text),
        ColumnDef::dropped(DataType::Int),
        ColumnDef::new("amount", DataType::Int),
    ]);
    let storage = Arc::new(MemStorage::new());
    storage.create_relation(ROOT, "orders", layout(), StorageKind::Heap).unwrap();
    storage.create_relation(EAST, "orders_east", layout(), StorageKind::Heap).unwrap();
    storage.create_relation(WEST, "orders_west", layout(), StorageKind::Heap).unwrap();
    storage.create_relation(OTHER, "orders_other", holed, StorageKind::AppendOptimized).unwrap();
    storage.insert_rows(EAST, vec![row!["east", 10], row!["east", 11]]).unwrap();
    storage.insert_rows(WEST, vec![row!["west", 20]]).unwrap();
    storage.insert_rows(OTHER, vec![row!["north", Value::Null, 30]]).unwrap();

    let hierarchy = PartitionHierarchy::new(
        ROOT,
        PartitionLevel::new(
            PartitionKey::column(1, DataType::Text),
            vec![
                PartitionRule::leaf("east", EAST, PartitionBound::list(["east"])),
                PartitionRule::leaf("west", WEST, PartitionBound::list(["west"])),
                PartitionRule::leaf("other", OTHER, PartitionBound::Default),
            ],
        ),
    )
    .unwrap();
    let catalog = Arc::new(StaticPartitionCatalog::new());
    catalog.register(hierarchy).unwrap();
    Fixture { storage, catalog }
}

fn region_equality() -> SelectionPredicates {
    SelectionPredicates::new(1).with_equality(0, Expr::col(1, 1))
}

fn static_scan_plan(query: &QueryExecution, spec: PartitionSelectorSpec) -> SequenceExec {
    let selector = query.partition_selector(spec, None).unwrap();
    let scan = query
        .dynamic_scan(DynamicScanSpec::partitions(ROOT, SLOT), SeqAccess::new())
        .unwrap();
    SequenceExec::new(vec![Box::new(selector), Box::new(scan)]).unwrap()
}

#[test]
fn dynamic_selection_accumulates_across_outer_rows() {
    let fx = fixture();
    let query = fx.query();
    let outer = vec![row!["east"], row!["west"], row!["east"], row!["west"], row!["west"]];
    let spec = PartitionSelectorSpec::dynamic_selection(SELECTOR, SLOT, ROOT, region_equality());
    let mut selector = query
        .partition_selector(spec, Some(Box::new(ValuesExec::new(outer.clone()))))
        .unwrap();

    // rows pass through unchanged
    assert_eq!(query.run(&mut selector).unwrap(), outer);
    assert_eq!(selector.stats().invocations, 5);
    assert_eq!(selector.stats().new_partitions, 2);

    let report = query.finish().unwrap();
    let slot = report.slot(SLOT).unwrap();
    let relations: Vec<_> = slot.partitions.iter().map(|e| e.relation).collect();
    assert_eq!(relations, vec![EAST, WEST]);
    assert!(slot.partitions.iter().all(|e| e.selectors == vec![SELECTOR]));
}

#[test]
fn accumulated_set_does_not_depend_on_row_order() {
    let fx = fixture();
    let rows = [row!["west"], row!["east"], row!["west"], row!["west"], row!["east"]];
    let mut sets = Vec::new();
    for ordering in [rows.to_vec(), rows.iter().rev().cloned().collect()] {
        let query = fx.query();
        let spec = PartitionSelectorSpec::dynamic_selection(SELECTOR, SLOT, ROOT, region_equality());
        let mut selector = query
            .partition_selector(spec, Some(Box::new(ValuesExec::new(ordering))))
            .unwrap();
        query.run(&mut selector).unwrap();
        let registry = query.registry().read().unwrap();
        let mut set: Vec<_> = registry.slot(SLOT).unwrap().relations().collect();
        set.sort();
        sets.push(set);
    }
    assert_eq!(sets[0], vec![EAST, WEST]);
    assert_eq!(sets[0], sets[1]);
}

#[test]
fn static_selector_feeds_scan_through_sequence() {
    let fx = fixture();
    let query = fx.query();
    let preds = SelectionPredicates::new(1).with_general(0, Expr::part_contains(Expr::lit("west")));
    let mut plan = static_scan_plan(
        &query,
        PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, preds),
    );
    let explain = explain_plan(&plan);
    assert!(explain.starts_with("Sequence\n"));
    assert!(explain.contains("-> Partition Selector 1 for orders (scan slot 1, static)"));
    assert!(explain.contains("-> Dynamic Seq Scan on orders (scan slot 1)"));

    assert_eq!(query.run(&mut plan).unwrap(), vec![row!["west", 20]]);
    assert_eq!(fx.storage.open_handle_count(), 0);
}

#[test]
fn unrestricted_static_selection_scans_every_leaf() {
    let fx = fixture();
    let query = fx.query();
    let mut plan = static_scan_plan(
        &query,
        PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, SelectionPredicates::new(1)),
    );
    assert_eq!(
        query.run(&mut plan).unwrap(),
        vec![row!["east", 10], row!["east", 11], row!["west", 20], row!["north", 30]]
    );
}

#[test]
fn static_equality_reads_query_parameters() {
    let fx = fixture();
    let query = fx.query().with_params(vec![Value::from("south")]);
    let preds = SelectionPredicates::new(1).with_equality(0, Expr::param(0));
    let mut plan = static_scan_plan(
        &query,
        PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, preds),
    );
    // no explicit rule holds "south": the default partition does
    assert_eq!(query.run(&mut plan).unwrap(), vec![row!["north", 30]]);
}

#[test]
fn empty_static_selection_yields_no_rows() {
    let fx = fixture();
    let query = fx.query();
    let preds = SelectionPredicates::new(1).with_general(0, Expr::lit(false));
    let mut plan = static_scan_plan(
        &query,
        PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, preds),
    );
    assert!(query.run(&mut plan).unwrap().is_empty());
    let report = query.finish().unwrap();
    assert!(report.slot(SLOT).unwrap().partitions.is_empty());
    assert_eq!(fx.storage.total_opens(), 0);
}

#[test]
fn precomputed_selection_skips_the_engine() {
    let fx = fixture();
    let query = fx.query();
    let spec = PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, region_equality())
        .with_precomputed(vec![SelectedPartition {
            relation: WEST,
            scan_slot: SLOT,
        }]);
    let mut plan = static_scan_plan(&query, spec);
    assert!(explain_plan(&plan).contains("static, 1 precomputed"));
    assert_eq!(query.run(&mut plan).unwrap(), vec![row!["west", 20]]);
}

#[test]
fn failed_scan_releases_partitions() {
    let fx = fixture();
    let query = fx.query();
    let spec = PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, SelectionPredicates::new(1))
        .with_precomputed(vec![
            SelectedPartition {
                relation: EAST,
                scan_slot: SLOT,
            },
            SelectedPartition {
                relation: RelationId::new(999),
                scan_slot: SLOT,
            },
        ]);
    let mut plan = static_scan_plan(&query, spec);
    assert!(matches!(query.run(&mut plan), Err(Error::RelationNotFound(999))));
    assert_eq!(fx.storage.open_handle_count(), 0);
}

#[test]
fn cancelled_query_unwinds() {
    let fx = fixture();
    let query = fx.query();
    let mut plan = static_scan_plan(
        &query,
        PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, SelectionPredicates::new(1)),
    );
    query.interrupt().raise();
    assert!(matches!(query.run(&mut plan), Err(Error::Cancelled)));
    assert_eq!(fx.storage.open_handle_count(), 0);
}

#[test]
fn nested_loop_rescans_join_driven_scan_per_outer_row() {
    let fx = fixture();
    let query = fx.query();
    let outer: BoxedNode = Box::new(ValuesExec::new(vec![row!["west"], row!["east"]]));
    let selector = query
        .partition_selector(
            PartitionSelectorSpec::dynamic_selection(SELECTOR, SLOT, ROOT, region_equality()),
            Some(outer),
        )
        .unwrap();
    let scan = query
        .dynamic_scan(
            DynamicScanSpec::partitions(ROOT, SLOT)
                .join_driven(true)
                .with_qual(Expr::eq(Expr::col(1, 1), Expr::outer(1))),
            SeqAccess::new(),
        )
        .unwrap();
    let mut join = NestedLoopJoinExec::new(Box::new(selector), Box::new(scan), None, query.context().clone());

    let rows = query.run(&mut join).unwrap();
    assert_eq!(
        rows,
        vec![
            row!["west", "west", 20],
            row!["east", "east", 10],
            row!["east", "east", 11],
        ]
    );
    // second outer row sees both accumulated partitions
    assert_eq!(fx.storage.total_opens(), 3);
}

#[test]
fn published_current_relation_couples_selector_and_scan() {
    let fx = fixture();
    let query = fx.query();
    let outer: BoxedNode = Box::new(ValuesExec::new(vec![
        row![7, "west"],
        row![8, "north"],
        row![9, "east"],
    ]));
    let spec = PartitionSelectorSpec::dynamic_selection(SELECTOR, SLOT, ROOT, region_equality())
        .with_projection(vec![Expr::outer(2)])
        .publish_current(true);
    let selector = query.partition_selector(spec, Some(outer)).unwrap();
    let scan = query
        .dynamic_scan(
            DynamicScanSpec::current_partition(ROOT, SLOT)
                .join_driven(true)
                .with_targetlist(vec![Expr::col(1, 2)]),
            SeqAccess::new(),
        )
        .unwrap();
    let qual = Expr::compare(CompareOp::Gt, Expr::col(1, 1), Expr::lit(10));
    let mut join = NestedLoopJoinExec::new(
        Box::new(selector),
        Box::new(scan),
        Some(qual),
        query.context().clone(),
    );
    assert!(explain_plan(&join).contains("current partition"));

    let rows: Vec<Row> = query.run(&mut join).unwrap();
    assert_eq!(
        rows,
        vec![row![7, "west", 20], row![8, "north", 30], row![9, "east", 11]]
    );
    assert_eq!(fx.storage.total_opens(), 3);
    let registry = query.registry().read().unwrap();
    assert_eq!(registry.current_relation_for(SLOT).unwrap(), EAST);
}

#[test]
fn propagation_routes_leaves_to_another_slot() {
    let fx = fixture();
    let query = fx.query();
    let preds = SelectionPredicates::new(1).with_propagation(Expr::lit(2));
    let mut selector = query
        .partition_selector(
            PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, preds),
            None,
        )
        .unwrap();
    assert!(query.run(&mut selector).unwrap().is_empty());
    let report = query.selection_report().unwrap();
    assert!(report.slot(SLOT).unwrap().partitions.is_empty());
    assert_eq!(report.slot(ScanSlotId::new(2)).unwrap().partitions.len(), 3);
}

#[test]
fn routed_slot_with_no_leaves_scans_empty() {
    let fx = fixture();
    let query = fx.query();
    let routed = ScanSlotId::new(2);
    let preds = SelectionPredicates::new(1)
        .with_residual(Expr::lit(false))
        .with_propagation(Expr::lit(2));
    let spec = PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, preds)
        .with_target_slots([routed]);
    let selector = query.partition_selector(spec, None).unwrap();
    let scan = query
        .dynamic_scan(DynamicScanSpec::partitions(ROOT, routed), SeqAccess::new())
        .unwrap();
    let mut plan = SequenceExec::new(vec![Box::new(selector), Box::new(scan)]).unwrap();

    assert!(query.run(&mut plan).unwrap().is_empty());
    assert_eq!(fx.storage.total_opens(), 0);
    let report = query.selection_report().unwrap();
    assert!(report.slot(routed).unwrap().partitions.is_empty());
}

#[test]
fn hierarchies_are_loaded_once_per_query() {
    let fx = fixture();
    let query = fx.query();
    for id in 1..=3 {
        query
            .partition_selector(
                PartitionSelectorSpec::static_selection(
                    SelectorId::new(id),
                    SLOT,
                    ROOT,
                    SelectionPredicates::new(1),
                ),
                None,
            )
            .unwrap();
    }
    assert_eq!(query.hierarchy_cache().load_count(), 1);
}

#[test]
fn selector_construction_errors() {
    let fx = fixture();
    let query = fx.query();
    let unknown = PartitionSelectorSpec::static_selection(
        SELECTOR,
        SLOT,
        RelationId::new(77),
        SelectionPredicates::new(1),
    );
    assert!(matches!(
        query.partition_selector(unknown, None),
        Err(Error::CatalogError(_))
    ));

    let with_child = PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, SelectionPredicates::new(1));
    let child: BoxedNode = Box::new(ValuesExec::new(Vec::new()));
    assert!(matches!(
        query.partition_selector(with_child, Some(child)),
        Err(Error::InvalidArgumentError(_))
    ));

    let reads_rows = PartitionSelectorSpec::static_selection(SELECTOR, SLOT, ROOT, region_equality());
    assert!(matches!(
        query.partition_selector(reads_rows, None),
        Err(Error::InvalidArgumentError(_))
    ));
}

#[test]
fn selector_without_rows_still_creates_its_slot() {
    let fx = fixture();
    let query = fx.query();
    let spec = PartitionSelectorSpec::dynamic_selection(SELECTOR, SLOT, ROOT, region_equality());
    let mut selector = query
        .partition_selector(spec, Some(Box::new(ValuesExec::new(Vec::new()))))
        .unwrap();
    assert!(selector.next().unwrap().is_none());
    let registry = query.registry().read().unwrap();
    assert!(registry.slot(SLOT).unwrap().is_empty());
}
