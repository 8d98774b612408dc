//! Logical plan surface re-exported from core.

pub use shipplan_core::dag::{
    JoinHint, LogicalNode, LogicalPlan, LogicalPlanBuilder, Operator, PartitionMethod,
};
pub use shipplan_core::fields::{FieldList, FieldSet};
pub use shipplan_core::properties::{
    Direction, GlobalProperties, Ordering, Partitioning, RequestedGlobalProperties, SortKey,
};
