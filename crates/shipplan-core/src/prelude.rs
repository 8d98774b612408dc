//! Convenient re-exports for downstream crates.

pub use crate::config::OptimizerConfig;
pub use crate::dag::{JoinHint, LogicalNode, LogicalPlan, LogicalPlanBuilder, Operator, PartitionMethod};
pub use crate::error::{Error, Result};
pub use crate::fields::{FieldList, FieldSet};
pub use crate::hash::Hash256;
pub use crate::id::{CandidateId, ChannelId, FlatNodeId, NodeId, PlanNodeId};
pub use crate::properties::{
    Direction, GlobalProperties, Ordering, Partitioning, RequestedGlobalProperties, SortKey,
};
