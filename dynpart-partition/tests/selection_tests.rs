use dynpart_expr::{CompareOp, Expr, Interpreter};
use dynpart_partition::{
    PartitionBound, PartitionHierarchy, PartitionKey, PartitionLevel, PartitionRule,
    PartitionSelection, RangeBound, SelectedPartition, SelectionInput, SelectionPredicates,
    select_partitions,
};
use dynpart_result::Error;
use dynpart_test_utils::init_tracing_for_tests;
use dynpart_types::{DataType, InterruptFlag, RelationId, Row, ScanSlotId, TABLE_OID_ATTNO, Value, row};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SLOT: ScanSlotId = ScanSlotId::new(1);

fn rel(id: u32) -> RelationId {
    RelationId::new(id)
}

/// region (list, attno 1) -> quarter (list, attno 2).
fn region_quarter() -> PartitionHierarchy {
    let quarters = |base: u32| {
        PartitionLevel::new(
            PartitionKey::column(2, DataType::Text),
            (1..=4)
                .map(|q| {
                    PartitionRule::leaf(
                        format!("q{q}"),
                        rel(base + q),
                        PartitionBound::list([format!("Q{q}")]),
                    )
                })
                .collect(),
        )
    };
    let top = PartitionLevel::new(
        PartitionKey::column(1, DataType::Text),
        vec![
            PartitionRule::node("east", rel(10), PartitionBound::list(["east"]), quarters(100)),
            PartitionRule::node("west", rel(20), PartitionBound::list(["west"]), quarters(200)),
            PartitionRule::node("other", rel(30), PartitionBound::Default, quarters(300)),
        ],
    );
    PartitionHierarchy::new(rel(1), top).unwrap()
}

fn relations(selected: &[SelectedPartition]) -> Vec<RelationId> {
    selected.iter().map(|s| s.relation).collect()
}

#[test]
fn equality_on_both_levels_selects_one_leaf() {
    init_tracing_for_tests();
    let h = region_quarter();
    let preds = SelectionPredicates::new(2)
        .with_equality(0, Expr::col(1, 1))
        .with_equality(1, Expr::col(1, 2));
    let row = row!["east", "Q1"];
    let selected = select_partitions(&h, &preds, &Interpreter, SLOT, Some(&row)).unwrap();
    assert_eq!(
        selected,
        vec![SelectedPartition {
            relation: rel(101),
            scan_slot: SLOT
        }]
    );
}

#[test]
fn equality_miss_routes_to_default_branch() {
    let h = region_quarter();
    let preds = SelectionPredicates::new(2)
        .with_equality(0, Expr::col(1, 1))
        .with_equality(1, Expr::col(1, 2));
    let row = row!["north", "Q3"];
    let selected = select_partitions(&h, &preds, &Interpreter, SLOT, Some(&row)).unwrap();
    assert_eq!(relations(&selected), vec![rel(303)]);

    // no default at the quarter level: nothing matches
    let row = row!["east", "Q9"];
    assert!(select_partitions(&h, &preds, &Interpreter, SLOT, Some(&row)).unwrap().is_empty());
}

#[test]
fn general_predicate_true_selects_every_rule_once() {
    let level = PartitionLevel::new(
        PartitionKey::column(1, DataType::Int),
        vec![
            PartitionRule::leaf("a", rel(2), PartitionBound::list([1, 2])),
            PartitionRule::leaf("b", rel(3), PartitionBound::list([3])),
            PartitionRule::leaf("c", rel(4), PartitionBound::list([4, 5])),
            PartitionRule::leaf("rest", rel(5), PartitionBound::Default),
        ],
    );
    let h = PartitionHierarchy::new(rel(1), level).unwrap();
    let preds = SelectionPredicates::new(1).with_general(0, Expr::lit(true));
    let selected = select_partitions(&h, &preds, &Interpreter, SLOT, None).unwrap();
    assert_eq!(relations(&selected), vec![rel(2), rel(3), rel(4), rel(5)]);
}

#[test]
fn no_predicate_returns_every_leaf_including_defaults() {
    let h = region_quarter();
    let selected =
        select_partitions(&h, &SelectionPredicates::new(2), &Interpreter, SLOT, None).unwrap();
    assert_eq!(relations(&selected), h.leaves());
    assert_eq!(selected.len(), 12);
}

#[test]
fn general_predicate_prunes_with_rule_bounds() {
    let level = PartitionLevel::new(
        PartitionKey::column(1, DataType::Int),
        vec![
            PartitionRule::leaf("y2000", rel(2), PartitionBound::range(2000, 2010)),
            PartitionRule::leaf("y2010", rel(3), PartitionBound::range(2010, 2020)),
            PartitionRule::leaf("y2020", rel(4), PartitionBound::range(2020, 2030)),
            PartitionRule::leaf("other", rel(5), PartitionBound::Default),
        ],
    );
    let h = PartitionHierarchy::new(rel(1), level).unwrap();

    // key < outer.1
    let preds = SelectionPredicates::new(1)
        .with_general(0, Expr::part_may_satisfy(CompareOp::Lt, Expr::outer(1)));
    let outer = row![2010];
    let input = SelectionInput {
        row: None,
        outer: Some(&outer),
        params: &[],
    };
    let selected = PartitionSelection::new(&h, &preds, &Interpreter, SLOT)
        .select(&input)
        .unwrap();
    assert_eq!(relations(&selected), vec![rel(2), rel(5)]);

    // key = 1999 through containment: only the default holds it
    let preds = SelectionPredicates::new(1).with_general(0, Expr::part_contains(Expr::lit(1999)));
    let selected = select_partitions(&h, &preds, &Interpreter, SLOT, None).unwrap();
    assert_eq!(relations(&selected), vec![rel(5)]);

    // bound introspection: rules whose lower bound is at least 2010
    let preds = SelectionPredicates::new(1).with_general(
        0,
        Expr::and(vec![
            Expr::not(Expr::PartDefault),
            Expr::compare(
                CompareOp::GtEq,
                Expr::PartBound(dynpart_expr::BoundSide::Lower),
                Expr::lit(2010),
            ),
        ]),
    );
    let selected = select_partitions(&h, &preds, &Interpreter, SLOT, None).unwrap();
    assert_eq!(relations(&selected), vec![rel(3), rel(4)]);
}

#[test]
fn residual_and_propagation_apply_per_leaf() {
    let h = region_quarter();
    let preds = SelectionPredicates::new(2)
        .with_equality(0, Expr::lit("west"))
        .with_residual(Expr::compare(
            CompareOp::NotEq,
            Expr::col(1, TABLE_OID_ATTNO),
            Expr::lit(202),
        ))
        .with_propagation(Expr::Case {
            branches: vec![(
                Expr::compare(CompareOp::Lt, Expr::col(1, TABLE_OID_ATTNO), Expr::lit(203)),
                Expr::lit(7),
            )],
            else_expr: Some(Box::new(Expr::lit(8))),
        });
    let selected = select_partitions(&h, &preds, &Interpreter, SLOT, None).unwrap();
    let slots: Vec<(u32, u32)> = selected
        .iter()
        .map(|s| (s.relation.get(), s.scan_slot.get()))
        .collect();
    assert_eq!(slots, vec![(201, 7), (203, 8), (204, 8)]);
}

#[test]
fn date_level_with_integer_bounds_routes_keys() {
    let top = PartitionLevel::new(
        PartitionKey::column(1, DataType::Date),
        vec![
            PartitionRule::leaf("early", rel(10), PartitionBound::range(0, 100)),
            PartitionRule::leaf("late", rel(11), PartitionBound::range(100, 200)),
        ],
    );
    let h = PartitionHierarchy::new(rel(1), top).unwrap();
    let preds = SelectionPredicates::new(1).with_equality(0, Expr::col(1, 1));
    for row in [row![Value::Date(50)], row![50]] {
        let selected = select_partitions(&h, &preds, &Interpreter, SLOT, Some(&row)).unwrap();
        assert_eq!(relations(&selected), vec![rel(10)]);
    }
    let row = row![Value::Date(150)];
    let selected = select_partitions(&h, &preds, &Interpreter, SLOT, Some(&row)).unwrap();
    assert_eq!(relations(&selected), vec![rel(11)]);
}

#[test]
fn null_propagation_is_an_error() {
    let h = region_quarter();
    let preds = SelectionPredicates::new(2).with_propagation(Expr::lit(Value::Null));
    let err = select_partitions(&h, &preds, &Interpreter, SLOT, None).unwrap_err();
    assert!(matches!(err, Error::ExprEval(_)));
}

#[test]
fn unvalidated_non_leaf_without_children_is_fatal() {
    let top = PartitionLevel::new(
        PartitionKey::column(1, DataType::Int),
        vec![PartitionRule::leaf("stub", rel(2), PartitionBound::Default)],
    );
    let h = PartitionHierarchy::from_parts_unchecked(rel(1), 2, top);
    let err = select_partitions(&h, &SelectionPredicates::new(2), &Interpreter, SLOT, None)
        .unwrap_err();
    assert!(matches!(err, Error::MalformedHierarchy(_)));
}

#[test]
fn unvalidated_multi_column_key_is_fatal() {
    let top = PartitionLevel::new(
        PartitionKey {
            columns: vec![1, 2],
            data_type: DataType::Int,
        },
        vec![PartitionRule::leaf("stub", rel(2), PartitionBound::Default)],
    );
    let h = PartitionHierarchy::from_parts_unchecked(rel(1), 1, top);
    let err = select_partitions(&h, &SelectionPredicates::new(1), &Interpreter, SLOT, None)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedPartitionKey { level: 0, columns: 2 }));
}

#[test]
fn raised_interrupt_cancels_the_walk() {
    let h = region_quarter();
    let preds = SelectionPredicates::new(2);
    let flag = InterruptFlag::new();
    flag.raise();
    let err = PartitionSelection::new(&h, &preds, &Interpreter, SLOT)
        .with_interrupt(&flag)
        .select(&SelectionInput::constant(&[]))
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

/// Random adjacent ranges over sorted distinct cut points, optionally with
/// a default rule, never route a key to more than one rule.
#[test]
fn random_range_bounds_route_to_at_most_one_rule() {
    init_tracing_for_tests();
    let mut rng = StdRng::seed_from_u64(42);
    for round in 0..200 {
        let mut cuts: Vec<i64> = (0..rng.random_range(2..12))
            .map(|_| rng.random_range(-500..500))
            .collect();
        cuts.sort_unstable();
        cuts.dedup();
        if cuts.len() < 2 {
            continue;
        }
        let mut rules: Vec<PartitionRule> = cuts
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let bound = if rng.random_bool(0.5) {
                    PartitionBound::range(w[0], w[1])
                } else {
                    PartitionBound::Range {
                        lower: RangeBound::Exclusive(Value::Int(w[0] - 1)),
                        upper: RangeBound::Inclusive(Value::Int(w[1] - 1)),
                    }
                };
                PartitionRule::leaf(format!("r{i}"), rel(100 + i as u32), bound)
            })
            .collect();
        let has_default = rng.random_bool(0.5);
        if has_default {
            rules.push(PartitionRule::leaf("default", rel(99), PartitionBound::Default));
        }
        let level = PartitionLevel::new(PartitionKey::column(1, DataType::Int), rules);
        let h = PartitionHierarchy::new(rel(1), level).unwrap();
        let preds = SelectionPredicates::new(1).with_equality(0, Expr::col(1, 1));

        let lo = cuts[0];
        let hi = cuts[cuts.len() - 1];
        for _ in 0..50 {
            let key = rng.random_range(lo - 50..hi + 50);
            let row = Row::new(vec![Value::Int(key)]);
            let matching = h
                .top_level()
                .rules
                .iter()
                .filter(|r| !r.is_default() && r.bound.contains(&Value::Int(key)).unwrap())
                .count();
            assert!(matching <= 1, "round {round}: key {key} in {matching} rules");

            let selected = select_partitions(&h, &preds, &Interpreter, SLOT, Some(&row)).unwrap();
            assert!(selected.len() <= 1);
            let in_range = key >= lo && key < hi;
            let expected = usize::from(in_range || has_default);
            assert_eq!(selected.len(), expected, "round {round}: key {key}");
        }
    }
}
