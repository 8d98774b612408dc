//! Shipping-strategy selection for joins, explicit partitioning, sorting and
//! parallelism changes.

use shipplan_core::config::OptimizerConfig;
use shipplan_core::dag::{JoinHint, PartitionMethod};
use shipplan_core::fields::{FieldList, FieldSet};
use shipplan_core::properties::{Direction, GlobalProperties, Ordering, Partitioning};
use shipplan_planner::{
    compile, Channel, LocalStrategy, LogicalPlanBuilder, OptimizedPlan, Optimizer, ShipStrategy,
};

fn input_of<'a>(plan: &'a OptimizedPlan, name: &str) -> &'a Channel {
    plan.input_channel(plan.node_by_name(name).unwrap()).unwrap()
}

fn join_inputs<'a>(plan: &'a OptimizedPlan, name: &str) -> (&'a Channel, &'a Channel) {
    let join = plan.node_by_name(name).unwrap().as_dual_input().unwrap();
    (
        plan.channel(join.input1()).unwrap(),
        plan.channel(join.input2()).unwrap(),
    )
}

fn sized_join(hint: JoinHint, left_bytes: u64, right_bytes: u64) -> shipplan_core::dag::LogicalPlan {
    let mut b = LogicalPlanBuilder::new();
    let l = b.source("left");
    let r = b.source("right");
    let j = b.join("j", l, r, FieldList::single(0), FieldList::single(1), hint);
    b.sink("k", j);
    b.with_estimated_bytes(l, left_bytes)
        .with_estimated_bytes(r, right_bytes);
    b.build()
}

#[test]
fn small_right_side_is_broadcast() {
    let plan = compile(&sized_join(JoinHint::Optimizer, 1_000_000, 10)).unwrap();
    let (left, right) = join_inputs(&plan, "j");
    assert_eq!(left.ship_strategy, ShipStrategy::Forward);
    assert_eq!(right.ship_strategy, ShipStrategy::Broadcast);
}

#[test]
fn comparable_sides_are_repartitioned() {
    let plan = compile(&sized_join(JoinHint::Optimizer, 1_000, 1_000)).unwrap();
    let (left, right) = join_inputs(&plan, "j");
    assert_eq!(left.ship_strategy, ShipStrategy::PartitionHash(FieldList::single(0)));
    assert_eq!(right.ship_strategy, ShipStrategy::PartitionHash(FieldList::single(1)));
    assert_eq!(
        plan.node_by_name("j").unwrap().properties().partitioning,
        Partitioning::Hash(FieldList::single(0))
    );
}

#[test]
fn join_hints_are_obeyed() {
    let plan = compile(&sized_join(JoinHint::BroadcastLeft, 1_000_000, 10)).unwrap();
    let (left, right) = join_inputs(&plan, "j");
    assert_eq!(left.ship_strategy, ShipStrategy::Broadcast);
    assert_eq!(right.ship_strategy, ShipStrategy::Forward);

    let plan = compile(&sized_join(JoinHint::Repartition, 1_000_000, 10)).unwrap();
    let (left, right) = join_inputs(&plan, "j");
    assert!(matches!(left.ship_strategy, ShipStrategy::PartitionHash(_)));
    assert!(matches!(right.ship_strategy, ShipStrategy::PartitionHash(_)));
}

#[test]
fn grouping_on_join_key_reuses_join_partitioning() {
    let mut b = LogicalPlanBuilder::new();
    let l = b.source("left");
    let r = b.source("right");
    let j = b.join("j", l, r, FieldList::single(0), FieldList::single(0), JoinHint::Optimizer);
    let g = b.group_reduce("g", j, FieldList::single(0));
    b.sink("k", g);
    b.with_estimated_bytes(l, 1_000).with_estimated_bytes(r, 1_000);
    let plan = compile(&b.build()).unwrap();

    let (left, _) = join_inputs(&plan, "j");
    assert_eq!(left.ship_strategy, ShipStrategy::PartitionHash(FieldList::single(0)));
    let g_in = input_of(&plan, "g");
    assert_eq!(g_in.ship_strategy, ShipStrategy::Forward);
    assert_eq!(
        g_in.local_strategy,
        LocalStrategy::Sort(Ordering::ascending(&FieldList::single(0)))
    );
}

#[test]
fn explicit_partition_feeds_grouping_by_forward() {
    let mut b = LogicalPlanBuilder::new();
    let s = b.source("s");
    let p = b.partition("p", s, PartitionMethod::Hash(FieldList::single(1)));
    let g = b.group_reduce("g", p, FieldList::single(1));
    b.sink("k", g);
    let plan = compile(&b.build()).unwrap();

    assert_eq!(
        input_of(&plan, "p").ship_strategy,
        ShipStrategy::PartitionHash(FieldList::single(1))
    );
    assert_eq!(input_of(&plan, "g").ship_strategy, ShipStrategy::Forward);
}

#[test]
fn random_partition_uses_random_shipping() {
    let mut b = LogicalPlanBuilder::new();
    let s = b.source("s");
    let p = b.partition("p", s, PartitionMethod::Random);
    b.sink("k", p);
    let plan = compile(&b.build()).unwrap();
    assert_eq!(input_of(&plan, "p").ship_strategy, ShipStrategy::PartitionRandom);
    assert_eq!(input_of(&plan, "k").ship_strategy, ShipStrategy::Forward);
}

#[test]
fn parallelism_change_rebalances() {
    let mut b = LogicalPlanBuilder::new();
    let s = b.source("s");
    let f = b.filter("f", s);
    b.sink("k", f);
    b.with_parallelism(s, 4).with_parallelism(f, 2);
    let plan = compile(&b.build()).unwrap();
    assert_eq!(input_of(&plan, "f").ship_strategy, ShipStrategy::Rebalance);
}

#[test]
fn matching_partitioning_is_repartitioned_on_parallelism_change() {
    let mut b = LogicalPlanBuilder::new();
    let s = b.source_with_properties("s", GlobalProperties::hash(FieldList::single(0)));
    let g = b.group_reduce("g", s, FieldList::single(0));
    b.sink("k", g);
    b.with_parallelism(s, 8).with_parallelism(g, 4);
    let plan = compile(&b.build()).unwrap();
    assert_eq!(
        input_of(&plan, "g").ship_strategy,
        ShipStrategy::PartitionHash(FieldList::single(0))
    );
}

#[test]
fn pre_partitioned_source_is_forwarded() {
    let mut b = LogicalPlanBuilder::new();
    let s = b.source_with_properties("s", GlobalProperties::hash(FieldList::single(0)));
    let g = b.group_reduce("g", s, FieldList::single(0));
    b.sink("k", g);
    let plan = compile(&b.build()).unwrap();
    assert_eq!(input_of(&plan, "g").ship_strategy, ShipStrategy::Forward);
    assert_eq!(plan.total_costs().network_bytes, 0);
}

#[test]
fn hash_on_permuted_fields_is_not_reused() {
    let mut b = LogicalPlanBuilder::new();
    let s = b.source_with_properties("s", GlobalProperties::hash(FieldList::new([1, 0])));
    let g = b.group_reduce("g", s, FieldList::new([0, 1]));
    b.sink("k", g);
    let plan = compile(&b.build()).unwrap();
    assert_eq!(
        input_of(&plan, "g").ship_strategy,
        ShipStrategy::PartitionHash(FieldList::new([0, 1]))
    );
}

#[test]
fn sort_range_partitions_and_sorts_locally() {
    let order = Ordering::ascending(&FieldList::single(0));
    let mut b = LogicalPlanBuilder::new();
    let s = b.source("s");
    let o = b.sort("o", s, order.clone());
    b.sorted_sink("k", o, order.clone());
    let plan = compile(&b.build()).unwrap();

    let sort_in = input_of(&plan, "o");
    assert_eq!(sort_in.ship_strategy, ShipStrategy::PartitionRange(FieldList::single(0)));
    assert_eq!(sort_in.local_strategy, LocalStrategy::Sort(order.clone()));

    // already ordered: nothing left to do for the sink
    let sink_in = input_of(&plan, "k");
    assert_eq!(sink_in.ship_strategy, ShipStrategy::Forward);
    assert_eq!(sink_in.local_strategy, LocalStrategy::None);
}

#[test]
fn sorted_sink_gets_range_partitioning() {
    let order = Ordering::default().append(2, Direction::Descending);
    let mut b = LogicalPlanBuilder::new();
    let s = b.source("s");
    b.sorted_sink("k", s, order.clone());
    let plan = compile(&b.build()).unwrap();
    let sink_in = input_of(&plan, "k");
    assert_eq!(sink_in.ship_strategy, ShipStrategy::PartitionRange(FieldList::single(2)));
    assert_eq!(sink_in.local_strategy, LocalStrategy::Sort(order));
}

#[test]
fn map_keeps_partitioning_only_on_forwarded_fields() {
    let build = |forwarded: FieldSet| {
        let mut b = LogicalPlanBuilder::new();
        let s = b.source("s");
        let g1 = b.group_reduce("g1", s, FieldList::single(0));
        let m = b.map("m", g1, forwarded);
        let g2 = b.group_reduce("g2", m, FieldList::single(0));
        b.sink("k", g2);
        compile(&b.build()).unwrap()
    };

    let plan = build(FieldSet::new([0]));
    assert_eq!(input_of(&plan, "g2").ship_strategy, ShipStrategy::Forward);

    let plan = build(FieldSet::new([1]));
    assert_eq!(
        input_of(&plan, "g2").ship_strategy,
        ShipStrategy::PartitionHash(FieldList::single(0))
    );
}

#[test]
fn shared_producer_serves_two_different_requests() {
    let mut b = LogicalPlanBuilder::new();
    let s = b.source("s");
    let g0 = b.group_reduce("g0", s, FieldList::single(0));
    let g1 = b.group_reduce("g1", s, FieldList::single(1));
    b.sink("k0", g0);
    b.sink("k1", g1);
    let plan = compile(&b.build()).unwrap();

    assert_eq!(plan.nodes_by_name("s").len(), 1);
    assert_eq!(
        input_of(&plan, "g0").ship_strategy,
        ShipStrategy::PartitionHash(FieldList::single(0))
    );
    assert_eq!(
        input_of(&plan, "g1").ship_strategy,
        ShipStrategy::PartitionHash(FieldList::single(1))
    );
}

#[test]
fn long_filter_chain_compiles_without_recursion() {
    let mut b = LogicalPlanBuilder::new();
    let mut cur = b.source("s");
    for i in 0..50_000 {
        cur = b.filter(format!("f{i}"), cur);
    }
    b.sink("k", cur);
    let plan = compile(&b.build()).unwrap();
    assert_eq!(plan.nodes().len(), 50_002);
    assert!(plan
        .channels()
        .iter()
        .all(|c| c.ship_strategy == ShipStrategy::Forward));
}

#[test]
fn long_union_chain_flattens_into_one_replica() {
    let mut b = LogicalPlanBuilder::new();
    let mut cur = b.source("s0");
    for i in 1..=20_000 {
        let s = b.source(format!("s{i}"));
        cur = b.union(format!("u{i}"), cur, s);
    }
    let g = b.group_reduce("g", cur, FieldList::single(0));
    b.sink("k", g);
    let plan = compile(&b.build()).unwrap();

    // 20_001 sources, one replica, the grouping and the sink
    assert_eq!(plan.nodes().len(), 20_004);
    let unions: Vec<_> = plan.union_nodes().collect();
    assert_eq!(unions.len(), 1);
    assert_eq!(unions[0].list_of_inputs().len(), 20_001);
    assert_eq!(input_of(&plan, "g").ship_strategy, ShipStrategy::Forward);
}

#[test]
fn ignoring_size_estimates_changes_join_choice() {
    let logical = sized_join(JoinHint::Optimizer, 1_000_000, 10);
    let cfg = OptimizerConfig::default().without_size_estimates();
    let plan = Optimizer::new(cfg).unwrap().compile(&logical).unwrap();
    // equal default sizes: repartitioning both sides is cheapest
    let (left, right) = join_inputs(&plan, "j");
    assert!(matches!(left.ship_strategy, ShipStrategy::PartitionHash(_)));
    assert!(matches!(right.ship_strategy, ShipStrategy::PartitionHash(_)));
}
