use std::sync::Arc;

use dynpart_expr::{CompareOp, Expr};
use dynpart_result::Error;
use dynpart_scan::{
    BitmapHeapAccess, BitmapIndexAccess, DynamicScan, DynamicScanSpec, ExecContext, IndexAccess,
    IndexQual, ScanOptions, ScanRegistry, ScanState, SeqAccess, SharedScanRegistry, TableAccess,
};
use dynpart_storage::{LogicalIndexInfo, MemStorage, StorageKind};
use dynpart_test_utils::init_tracing_for_tests;
use dynpart_types::{
    ColumnDef, DataType, InterruptFlag, RelationId, RelationSchema, Row, ScanSlotId, SelectorId,
    TABLE_OID_ATTNO, Value, row,
};

const SLOT: ScanSlotId = ScanSlotId::new(1);
const SELECTOR: SelectorId = SelectorId::new(1);
const ROOT: RelationId = RelationId::new(1);
const P1: RelationId = RelationId::new(11);
const P2: RelationId = RelationId::new(12);
const P3: RelationId = RelationId::new(13);

/// `a`, a dropped column, then `c`: the layout of relations created before
/// the drop.
fn with_hole() -> RelationSchema {
    RelationSchema::new(vec![
        ColumnDef::new("a", DataType::Int),
        ColumnDef::dropped(DataType::Text),
        ColumnDef::new("c", DataType::Int),
    ])
}

fn compact() -> RelationSchema {
    RelationSchema::new(vec![
        ColumnDef::new("a", DataType::Int),
        ColumnDef::new("c", DataType::Int),
    ])
}

struct Fixture {
    storage: Arc<MemStorage>,
    registry: SharedScanRegistry,
    ctx: ExecContext,
}

impl Fixture {
    fn select(&self, relations: &[RelationId]) {
        let mut registry = self.registry.write().unwrap();
        registry.ensure_slot(SLOT);
        for &rel in relations {
            registry.record_selection(SLOT, rel, SELECTOR);
        }
    }

    fn seq(&self, spec: DynamicScanSpec) -> DynamicScan<SeqAccess> {
        DynamicScan::new(spec, SeqAccess::new(), self.ctx.clone()).unwrap()
    }
}

/// Root and first/third partitions share the holed layout; the second
/// partition was created after the drop and is compact.
fn fixture() -> Fixture {
    init_tracing_for_tests();
    let storage = Arc::new(MemStorage::new());
    storage.create_relation(ROOT, "sales", with_hole(), StorageKind::Heap).unwrap();
    storage.create_relation(P1, "sales_p1", with_hole(), StorageKind::Heap).unwrap();
    storage.create_relation(P2, "sales_p2", compact(), StorageKind::Heap).unwrap();
    storage.create_relation(P3, "sales_p3", with_hole(), StorageKind::Heap).unwrap();
    storage
        .insert_rows(P1, vec![row![1, Value::Null, 10], row![2, Value::Null, 20]])
        .unwrap();
    storage.insert_rows(P2, vec![row![3, 30], row![4, 40]]).unwrap();
    storage.insert_rows(P3, vec![row![5, Value::Null, 50]]).unwrap();
    storage.create_index(P1, LogicalIndexInfo::on_columns(vec![3])).unwrap();
    storage.create_index(P2, LogicalIndexInfo::on_columns(vec![2])).unwrap();
    storage.create_index(P3, LogicalIndexInfo::on_columns(vec![3])).unwrap();

    let registry = ScanRegistry::shared();
    let ctx = ExecContext::new(storage.clone(), registry.clone());
    Fixture {
        storage,
        registry,
        ctx,
    }
}

fn drain(scan: &mut DynamicScan<impl dynpart_scan::AccessMethod<Output = Row>>) -> Vec<Row> {
    let mut out = Vec::new();
    while let Some(row) = scan.next().unwrap() {
        out.push(row);
    }
    out
}

fn all_rows() -> Vec<Row> {
    vec![row![1, 10], row![2, 20], row![3, 30], row![4, 40], row![5, 50]]
}

#[test]
fn layouts_are_remapped_against_the_previous_partition() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));

    assert_eq!(drain(&mut scan), all_rows());
    let stats = scan.stats();
    assert_eq!(stats.partitions_scanned, 3);
    // root -> p1 is a no-op, p1 -> p2 and p2 -> p3 are not
    assert_eq!(stats.remaps, 2);
    assert_eq!(stats.last_remap, Some((P2, P3)));
    assert_eq!(scan.layout_relation(), Some(P3));
    assert_eq!(scan.exprs().targetlist, Some(vec![Expr::col(1, 1), Expr::col(1, 3)]));
}

#[test]
fn qual_follows_the_partition_layout() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    let qual = Expr::compare(CompareOp::GtEq, Expr::col(1, 3), Expr::lit(30));
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT).with_qual(qual));
    assert_eq!(drain(&mut scan), vec![row![3, 30], row![4, 40], row![5, 50]]);
}

#[test]
fn exhausted_scan_stays_done_and_rescan_repeats() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    for join_driven in [false, true] {
        let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT).join_driven(join_driven));
        let first = drain(&mut scan);
        assert_eq!(first.len(), 5);
        assert_eq!(scan.state(), ScanState::Done);
        assert!(scan.next().unwrap().is_none());

        scan.rescan(None).unwrap();
        let expected = if join_driven { ScanState::Init } else { ScanState::First };
        assert_eq!(scan.state(), expected);
        assert_eq!(drain(&mut scan), first);
        scan.end().unwrap();
    }
}

#[test]
fn plain_rescan_reuses_the_open_partition() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));
    assert_eq!(scan.next().unwrap(), Some(row![1, 10]));
    assert_eq!(fx.storage.total_opens(), 1);

    scan.rescan(None).unwrap();
    assert_eq!(drain(&mut scan), all_rows());
    assert_eq!(fx.storage.total_opens(), 3);
}

#[test]
fn join_rescan_reopens_everything() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT).join_driven(true));
    assert_eq!(scan.next().unwrap(), Some(row![1, 10]));
    assert_eq!(fx.storage.open_handle_count(), 1);

    scan.rescan(None).unwrap();
    assert_eq!(fx.storage.open_handle_count(), 0);
    assert_eq!(drain(&mut scan), all_rows());
    assert_eq!(fx.storage.total_opens(), 4);
}

#[test]
fn join_rescan_picks_up_new_selections() {
    let fx = fixture();
    fx.select(&[P2]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT).join_driven(true));
    assert_eq!(drain(&mut scan), vec![row![3, 30], row![4, 40]]);

    fx.select(&[P3]);
    scan.rescan(None).unwrap();
    assert_eq!(drain(&mut scan), vec![row![3, 30], row![4, 40], row![5, 50]]);
}

#[test]
fn missing_slot_is_reported_but_empty_slot_is_not() {
    let fx = fixture();
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));
    assert!(matches!(scan.next(), Err(Error::MissingScanSlot(1))));

    fx.select(&[]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));
    assert!(scan.next().unwrap().is_none());
    assert_eq!(scan.stats().partitions_scanned, 0);
    assert_eq!(fx.storage.total_opens(), 0);
}

#[test]
fn next_after_end_is_an_invalid_transition() {
    let fx = fixture();
    fx.select(&[P1, P2]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));
    scan.next().unwrap();
    assert_eq!(fx.storage.open_handle_count(), 1);

    scan.end().unwrap();
    scan.end().unwrap();
    assert_eq!(fx.storage.open_handle_count(), 0);
    assert_eq!(scan.state(), ScanState::End);
    assert!(matches!(
        scan.next(),
        Err(Error::InvalidStateTransition { from: "SCAN_END", .. })
    ));
    assert!(scan.rescan(None).is_err());
}

#[test]
fn missing_partition_fails_and_releases_handles() {
    let fx = fixture();
    fx.select(&[P1, RelationId::new(99)]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));
    assert_eq!(scan.next().unwrap(), Some(row![1, 10]));
    assert_eq!(scan.next().unwrap(), Some(row![2, 20]));
    assert!(matches!(scan.next(), Err(Error::RelationNotFound(99))));
    scan.end().unwrap();
    assert_eq!(fx.storage.open_handle_count(), 0);
}

#[test]
fn dropping_a_scan_releases_its_partition() {
    let fx = fixture();
    fx.select(&[P1]);
    {
        let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));
        scan.next().unwrap();
        assert_eq!(fx.storage.open_handle_count(), 1);
    }
    assert_eq!(fx.storage.open_handle_count(), 0);
}

#[test]
fn seq_scan_marks_and_restores_within_a_partition() {
    let fx = fixture();
    fx.select(&[P1]);
    let mut scan = fx.seq(DynamicScanSpec::partitions(ROOT, SLOT));
    assert!(matches!(
        scan.mark_pos(),
        Err(Error::InvalidStateTransition { from: "SCAN_INIT", .. })
    ));
    assert_eq!(scan.next().unwrap(), Some(row![1, 10]));
    scan.mark_pos().unwrap();
    assert_eq!(scan.next().unwrap(), Some(row![2, 20]));
    scan.restore_pos().unwrap();
    assert_eq!(scan.next().unwrap(), Some(row![2, 20]));
}

#[test]
fn table_scan_rejects_mark_restore() {
    let fx = fixture();
    fx.select(&[P1]);
    let mut scan =
        DynamicScan::new(DynamicScanSpec::partitions(ROOT, SLOT), TableAccess::new(), fx.ctx.clone()).unwrap();
    scan.next().unwrap();
    let err = scan.mark_pos().unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert!(err.is_contract_violation());
    assert!(scan.restore_pos().is_err());
}

#[test]
fn interrupt_stops_scan_between_and_within_partitions() {
    let fx = fixture();
    fx.select(&[P1, P2]);
    let flag = InterruptFlag::default();
    let ctx = fx
        .ctx
        .clone()
        .with_interrupt(flag.clone())
        .with_options(ScanOptions::default().with_interrupt_check_interval(1));
    let mut scan = DynamicScan::new(DynamicScanSpec::partitions(ROOT, SLOT), SeqAccess::new(), ctx).unwrap();
    assert_eq!(scan.next().unwrap(), Some(row![1, 10]));
    flag.raise();
    assert!(matches!(scan.next(), Err(Error::Cancelled)));
    scan.end().unwrap();
    assert_eq!(fx.storage.open_handle_count(), 0);
}

#[test]
fn index_scan_resolves_physical_index_per_layout() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    let ctx = fx.ctx.clone().with_params(vec![Value::Int(20)]);
    let access = IndexAccess::new(
        LogicalIndexInfo::on_columns(vec![3]),
        vec![IndexQual::new(1, CompareOp::GtEq, Expr::param(0))],
    );
    let mut scan = DynamicScan::new(DynamicScanSpec::partitions(ROOT, SLOT), access, ctx).unwrap();
    assert_eq!(
        drain(&mut scan),
        vec![row![2, 20], row![3, 30], row![4, 40], row![5, 50]]
    );
    assert_eq!(scan.access().logical_index(), &LogicalIndexInfo::on_columns(vec![3]));
    assert_eq!(fx.registry.read().unwrap().current_relation_for(SLOT).unwrap(), P3);
    assert!(scan.explain().starts_with("Dynamic Index Scan on sales (scan slot 1)"));
}

#[test]
fn index_scan_rekeys_on_rescan_with_outer_row() {
    let fx = fixture();
    fx.select(&[P1, P2]);
    let access = IndexAccess::new(
        LogicalIndexInfo::on_columns(vec![3]),
        vec![IndexQual::new(1, CompareOp::Eq, Expr::outer(1))],
    );
    let mut scan = DynamicScan::new(
        DynamicScanSpec::partitions(ROOT, SLOT).join_driven(true),
        access,
        fx.ctx.clone(),
    )
    .unwrap();
    scan.rescan(Some(&row![40])).unwrap();
    assert_eq!(drain(&mut scan), vec![row![4, 40]]);
    scan.rescan(Some(&row![10])).unwrap();
    assert_eq!(drain(&mut scan), vec![row![1, 10]]);
}

#[test]
fn index_scan_without_partition_index_fails() {
    let fx = fixture();
    fx.select(&[P1]);
    let access = IndexAccess::new(LogicalIndexInfo::on_columns(vec![1]), Vec::new());
    let mut scan = DynamicScan::new(DynamicScanSpec::partitions(ROOT, SLOT), access, fx.ctx.clone()).unwrap();
    assert!(matches!(scan.next(), Err(Error::IndexNotFound { relation: 11, .. })));
}

#[test]
fn btree_index_scan_rejects_array_keys() {
    let fx = fixture();
    fx.select(&[P1]);
    let access = IndexAccess::new(
        LogicalIndexInfo::on_columns(vec![3]),
        vec![IndexQual::any(1, CompareOp::Eq, vec![Expr::lit(10), Expr::lit(20)])],
    );
    let mut scan = DynamicScan::new(DynamicScanSpec::partitions(ROOT, SLOT), access, fx.ctx.clone()).unwrap();
    assert!(matches!(scan.next(), Err(Error::Internal(_))));
}

fn bitmap_child(fx: &Fixture) -> DynamicScan<BitmapIndexAccess> {
    let access = BitmapIndexAccess::new(
        LogicalIndexInfo::on_columns(vec![3]),
        vec![IndexQual::any(
            1,
            CompareOp::Eq,
            vec![Expr::lit(10), Expr::lit(40), Expr::lit(50)],
        )],
    );
    DynamicScan::new(DynamicScanSpec::partitions(ROOT, SLOT), access, fx.ctx.clone()).unwrap()
}

#[test]
fn bitmap_index_scan_yields_one_bitmap_per_partition() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    let mut scan = bitmap_child(&fx);
    let mut sizes = Vec::new();
    while let Some(bitmap) = scan.next().unwrap() {
        sizes.push((scan.current_relation(), bitmap.cardinality()));
    }
    assert_eq!(sizes, vec![(Some(P1), 1), (Some(P2), 1), (Some(P3), 1)]);
}

#[test]
fn bitmap_heap_scan_follows_the_index_side() {
    let fx = fixture();
    fx.select(&[P1, P2, P3]);
    let heap = BitmapHeapAccess::new(bitmap_child(&fx));
    let mut scan = DynamicScan::new(DynamicScanSpec::partitions(ROOT, SLOT), heap, fx.ctx.clone()).unwrap();
    assert_eq!(drain(&mut scan), vec![row![1, 10], row![4, 40], row![5, 50]]);
    assert_eq!(scan.stats().remaps, 2);
    assert_eq!(scan.access().child().stats().partitions_scanned, 3);

    scan.rescan(None).unwrap();
    assert_eq!(drain(&mut scan), vec![row![1, 10], row![4, 40], row![5, 50]]);
    scan.end().unwrap();
    assert_eq!(scan.access().child().state(), ScanState::End);
    assert_eq!(fx.storage.open_handle_count(), 0);
}

#[test]
fn columnar_table_scan_requests_only_needed_columns() {
    init_tracing_for_tests();
    let storage = Arc::new(MemStorage::new());
    let wide = RelationSchema::new(vec![
        ColumnDef::new("a", DataType::Int),
        ColumnDef::new("b", DataType::Text),
        ColumnDef::new("c", DataType::Int),
    ]);
    storage.create_relation(ROOT, "events", wide.clone(), StorageKind::Heap).unwrap();
    storage.create_relation(P1, "events_p1", wide, StorageKind::Columnar).unwrap();
    storage
        .insert_rows(P1, vec![row![1, "x", 10], row![2, "y", 20]])
        .unwrap();
    let registry = ScanRegistry::shared();
    registry.write().unwrap().record_selection(SLOT, P1, SELECTOR);
    let ctx = ExecContext::new(storage.clone(), registry);

    let spec = DynamicScanSpec::partitions(ROOT, SLOT)
        .with_qual(Expr::compare(CompareOp::Gt, Expr::col(1, 1), Expr::lit(1)))
        .with_targetlist(vec![Expr::col(1, 3)]);
    let mut scan = DynamicScan::new(spec, TableAccess::new(), ctx).unwrap();
    assert_eq!(drain(&mut scan), vec![row![20]]);
    assert_eq!(storage.requested_projections().unwrap(), vec![(P1, vec![1, 3])]);
}

#[test]
fn single_relation_target_needs_no_registry_slot() {
    let fx = fixture();
    let mut scan = fx.seq(DynamicScanSpec::relation(P2));
    assert_eq!(drain(&mut scan), vec![row![3, 30], row![4, 40]]);
    assert_eq!(scan.stats().remaps, 0);
    assert!(fx.registry.read().unwrap().slot(SLOT).is_none());
}

#[test]
fn current_partition_source_reads_only_the_published_relation() {
    let fx = fixture();
    fx.registry.write().unwrap().set_current_relation(SLOT, P2);
    let spec = DynamicScanSpec::current_partition(ROOT, SLOT)
        .with_targetlist(vec![Expr::col(1, TABLE_OID_ATTNO), Expr::col(1, 3)]);
    let mut scan = fx.seq(spec);
    assert_eq!(drain(&mut scan), vec![row![12, 30], row![12, 40]]);
    assert_eq!(scan.stats().last_remap, Some((ROOT, P2)));
}

#[test]
fn current_partition_source_requires_a_published_relation() {
    let fx = fixture();
    fx.select(&[P1]);
    let mut scan = fx.seq(DynamicScanSpec::current_partition(ROOT, SLOT));
    assert!(matches!(scan.next(), Err(Error::NoCurrentRelation(1))));
}
