#![forbid(unsafe_code)]
//! shipplan-planner: logical dataflow DAG → physical plan with a shipping
//! strategy on every channel.
//!
//! Pipeline:
//! - `branches`: consumer index and branch points of the logical DAG
//! - `union`: binary union trees → one n-ary union replica per consumer
//! - `propagate`: interesting-property push-down, candidate enumeration and
//!   memoization, shipping-strategy selection (`parameterize`)
//! - `lower`: chosen candidates → `OptimizedPlan`
//! - `verify`: structural checks on the assembled plan
//!
//! `Optimizer::compile` runs all of them in order. A YAML front end lives in
//! `dsl`.

pub mod branches;
pub mod cost;
pub mod dsl;
pub mod logical;
pub mod lower;
pub mod optimizer;
pub mod physical;
pub mod propagate;
pub mod rules;
pub mod union;
pub mod verify;

pub use cost::{CostModel, Costs};
pub use dsl::yaml::{parse_yaml_plan, ParsedPlan};
pub use dsl::DslError;
pub use logical::{LogicalPlan, LogicalPlanBuilder};
pub use optimizer::{compile, Optimizer};
pub use physical::{
    Channel, DualInputPlanNode, LocalStrategy, NAryUnionPlanNode, NodeInfo, OptimizedPlan,
    PlanNode, ShipStrategy, SingleInputPlanNode, SinkPlanNode, SourcePlanNode,
};
pub use propagate::parameterize;
pub use verify::verify_plan;
