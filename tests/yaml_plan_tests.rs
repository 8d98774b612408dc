//! YAML plan parsing and compilation.

use shipplan_core::error::Error;
use shipplan_core::fields::FieldList;
use shipplan_planner::{parse_yaml_plan, DslError, Optimizer, ShipStrategy};

const UNION_WITH_TWO_OUTPUTS: &str = r#"
nodes:
  - { name: s1, op: source }
  - { name: s2, op: source }
  - { name: s3, op: source }
  - { name: s4, op: source }
  - { name: u23, op: union, inputs: [s2, s3] }
  - { name: u123, op: union, inputs: [s1, u23] }
  - { name: u234, op: union, inputs: [s4, u23] }
  - { name: "1", op: group_reduce, keys: [0], inputs: [u123] }
  - { name: "2", op: group_reduce, keys: [1], inputs: [u234] }
  - { name: out1, op: sink, inputs: ["1"] }
  - { name: out2, op: sink, inputs: ["2"] }
"#;

#[test]
fn yaml_plan_compiles_like_the_builder_version() {
    let parsed = parse_yaml_plan(UNION_WITH_TWO_OUTPUTS).unwrap();
    let plan = Optimizer::new(parsed.config)
        .unwrap()
        .compile(&parsed.plan)
        .unwrap();

    let reduce = plan.node_by_name("2").unwrap();
    let input = plan.input_channel(reduce).unwrap();
    assert_eq!(input.ship_strategy, ShipStrategy::Forward);
    let union = plan.source_of(input).unwrap().as_union().unwrap();
    assert_eq!(union.list_of_inputs().len(), 3);
    for c in union.list_of_inputs() {
        assert_eq!(
            plan.channel(*c).unwrap().ship_strategy,
            ShipStrategy::PartitionHash(FieldList::single(1))
        );
    }
}

#[test]
fn config_section_overrides_defaults() {
    let src = r#"
config:
  default_parallelism: 3
  local_sort_penalty: 7
nodes:
  - { name: s, op: source, estimated_bytes: 100 }
  - { name: o, op: sort, order_by: [{ field: 0 }], inputs: [s] }
  - { name: k, op: sink, inputs: [o] }
"#;
    let parsed = parse_yaml_plan(src).unwrap();
    assert_eq!(parsed.config.default_parallelism, 3);
    let plan = Optimizer::new(parsed.config)
        .unwrap()
        .compile(&parsed.plan)
        .unwrap();
    assert!(plan.nodes().iter().all(|n| n.info().parallelism == 3));
    // range partitioning of 100 bytes plus one local sort
    assert_eq!(plan.total_costs().total(), 107);
}

#[test]
fn forward_references_can_form_cycles() {
    let src = r#"
nodes:
  - { name: s, op: source }
  - { name: a, op: union, inputs: [s, b] }
  - { name: b, op: filter, inputs: [a] }
  - { name: k, op: sink, inputs: [b] }
"#;
    let parsed = parse_yaml_plan(src).unwrap();
    let err = Optimizer::default().compile(&parsed.plan).unwrap_err();
    assert!(matches!(err, Error::CyclicPlan { .. }));
}

#[test]
fn sort_without_keys_is_invalid() {
    let src = r#"
nodes:
  - { name: s, op: source }
  - { name: o, op: sort, order_by: [], inputs: [s] }
"#;
    assert!(matches!(
        parse_yaml_plan(src),
        Err(DslError::Invalid { node, .. }) if node == "o"
    ));
}
