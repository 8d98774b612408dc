//! Physical plan: plan nodes, channels and the frozen `OptimizedPlan`.
//!
//! The job-graph generator and inspection tooling consume `OptimizedPlan`
//! read-only. It is immutable once `lower::assemble` returns it, so it can be
//! shared between threads freely.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

use shipplan_core::dag::Operator;
use shipplan_core::error::{Error, Result};
use shipplan_core::fields::FieldList;
use shipplan_core::hash::{hash_serde, Hash256};
use shipplan_core::id::{ChannelId, NodeId, PlanNodeId};
use shipplan_core::properties::{GlobalProperties, Ordering, RequestedGlobalProperties};

use crate::cost::Costs;

/// How data crosses from producer to consumer instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipStrategy {
    Forward,
    PartitionHash(FieldList),
    PartitionRange(FieldList),
    PartitionRandom,
    Broadcast,
    Rebalance,
}

impl ShipStrategy {
    /// Partitioning keys; present exactly for hash and range partitioning.
    pub fn keys(&self) -> Option<&FieldList> {
        match self {
            ShipStrategy::PartitionHash(k) | ShipStrategy::PartitionRange(k) => Some(k),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        !matches!(self, ShipStrategy::Forward)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShipStrategy::Forward => "FORWARD",
            ShipStrategy::PartitionHash(_) => "PARTITION_HASH",
            ShipStrategy::PartitionRange(_) => "PARTITION_RANGE",
            ShipStrategy::PartitionRandom => "PARTITION_RANDOM",
            ShipStrategy::Broadcast => "BROADCAST",
            ShipStrategy::Rebalance => "REBALANCE",
        }
    }
}

impl fmt::Display for ShipStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.keys() {
            Some(keys) => write!(f, "{}{}", self.name(), keys),
            None => f.write_str(self.name()),
        }
    }
}

/// Work done on the receiving side before the operator sees the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalStrategy {
    #[default]
    None,
    Sort(Ordering),
}

impl fmt::Display for LocalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalStrategy::None => f.write_str("none"),
            LocalStrategy::Sort(o) => write!(f, "sort({o})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub source: PlanNodeId,
    pub target: PlanNodeId,
    /// Input position on the target.
    pub target_slot: usize,
    pub ship_strategy: ShipStrategy,
    pub local_strategy: LocalStrategy,
    /// What the target asked for on this input.
    pub requested: RequestedGlobalProperties,
    /// Properties of the data as it arrives at the target.
    pub properties: GlobalProperties,
    pub estimated_bytes: u64,
    pub costs: Costs,
}

impl Channel {
    pub fn ship_strategy_keys(&self) -> Option<&FieldList> {
        self.ship_strategy.keys()
    }
}

/// Fields every plan node carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: PlanNodeId,
    /// Logical node this plan node was derived from (the root union for
    /// n-ary unions).
    pub logical: NodeId,
    pub name: String,
    pub parallelism: u32,
    pub properties: GlobalProperties,
    pub outgoing: Vec<ChannelId>,
    /// Cumulative cost of the subplan rooted here.
    pub costs: Costs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePlanNode {
    pub info: NodeInfo,
    pub operator: Operator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleInputPlanNode {
    pub info: NodeInfo,
    pub operator: Operator,
    pub input: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualInputPlanNode {
    pub info: NodeInfo,
    pub operator: Operator,
    pub inputs: [ChannelId; 2],
}

impl DualInputPlanNode {
    pub fn input1(&self) -> ChannelId {
        self.inputs[0]
    }

    pub fn input2(&self) -> ChannelId {
        self.inputs[1]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NAryUnionPlanNode {
    pub info: NodeInfo,
    pub inputs: Vec<ChannelId>,
}

impl NAryUnionPlanNode {
    pub fn list_of_inputs(&self) -> &[ChannelId] {
        &self.inputs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkPlanNode {
    pub info: NodeInfo,
    pub operator: Operator,
    pub input: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanNode {
    Source(SourcePlanNode),
    SingleInput(SingleInputPlanNode),
    DualInput(DualInputPlanNode),
    NAryUnion(NAryUnionPlanNode),
    Sink(SinkPlanNode),
}

impl PlanNode {
    pub fn info(&self) -> &NodeInfo {
        match self {
            PlanNode::Source(n) => &n.info,
            PlanNode::SingleInput(n) => &n.info,
            PlanNode::DualInput(n) => &n.info,
            PlanNode::NAryUnion(n) => &n.info,
            PlanNode::Sink(n) => &n.info,
        }
    }

    pub fn id(&self) -> PlanNodeId {
        self.info().id
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn properties(&self) -> &GlobalProperties {
        &self.info().properties
    }

    pub fn outgoing_channels(&self) -> &[ChannelId] {
        &self.info().outgoing
    }

    /// Input channels in slot order.
    pub fn inputs(&self) -> &[ChannelId] {
        match self {
            PlanNode::Source(_) => &[],
            PlanNode::SingleInput(n) => std::slice::from_ref(&n.input),
            PlanNode::DualInput(n) => &n.inputs,
            PlanNode::NAryUnion(n) => &n.inputs,
            PlanNode::Sink(n) => std::slice::from_ref(&n.input),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PlanNode::Source(_) => "Source",
            PlanNode::SingleInput(_) => "SingleInput",
            PlanNode::DualInput(_) => "DualInput",
            PlanNode::NAryUnion(_) => "NAryUnion",
            PlanNode::Sink(_) => "Sink",
        }
    }

    /// Operator label for display; unions have no logical operator.
    pub fn operator_name(&self) -> &'static str {
        match self {
            PlanNode::Source(n) => n.operator.name(),
            PlanNode::SingleInput(n) => n.operator.name(),
            PlanNode::DualInput(n) => n.operator.name(),
            PlanNode::NAryUnion(_) => "Union",
            PlanNode::Sink(n) => n.operator.name(),
        }
    }

    pub fn as_union(&self) -> Option<&NAryUnionPlanNode> {
        match self {
            PlanNode::NAryUnion(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_single_input(&self) -> Option<&SingleInputPlanNode> {
        match self {
            PlanNode::SingleInput(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_dual_input(&self) -> Option<&DualInputPlanNode> {
        match self {
            PlanNode::DualInput(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_union(&self) -> bool {
        matches!(self, PlanNode::NAryUnion(_))
    }
}

/// The optimizer's sole output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedPlan {
    nodes: Vec<PlanNode>,
    channels: Vec<Channel>,
    sinks: Vec<PlanNodeId>,
    optimizer_version: String,
}

impl OptimizedPlan {
    pub(crate) fn new(nodes: Vec<PlanNode>, channels: Vec<Channel>, sinks: Vec<PlanNodeId>) -> Self {
        Self {
            nodes,
            channels,
            sinks,
            optimizer_version: shipplan_core::VERSION.to_string(),
        }
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn node(&self, id: PlanNodeId) -> Option<&PlanNode> {
        self.nodes.get(id.index())
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.index())
    }

    pub fn sink_ids(&self) -> &[PlanNodeId] {
        &self.sinks
    }

    pub fn sinks(&self) -> impl Iterator<Item = &PlanNode> + '_ {
        self.sinks.iter().filter_map(|id| self.node(*id))
    }

    pub fn union_nodes(&self) -> impl Iterator<Item = &NAryUnionPlanNode> + '_ {
        self.nodes.iter().filter_map(PlanNode::as_union)
    }

    /// Every plan node carrying `name` (replicated unions share a name).
    pub fn nodes_by_name(&self, name: &str) -> Vec<&PlanNode> {
        self.nodes.iter().filter(|n| n.name() == name).collect()
    }

    /// The unique plan node carrying `name`.
    pub fn node_by_name(&self, name: &str) -> Result<&PlanNode> {
        match self.nodes_by_name(name).as_slice() {
            [node] => Ok(node),
            [] => Err(Error::Lookup(format!("no plan node named '{name}'"))),
            many => Err(Error::Lookup(format!(
                "{} plan nodes are named '{name}'",
                many.len()
            ))),
        }
    }

    pub fn input_channels(&self, node: &PlanNode) -> Vec<&Channel> {
        node.inputs()
            .iter()
            .filter_map(|c| self.channel(*c))
            .collect()
    }

    /// The single input channel of a single-input or sink node.
    pub fn input_channel(&self, node: &PlanNode) -> Result<&Channel> {
        match node {
            PlanNode::SingleInput(_) | PlanNode::Sink(_) => node
                .inputs()
                .first()
                .and_then(|c| self.channel(*c))
                .ok_or_else(|| Error::Lookup(format!("'{}' has no input channel", node.name()))),
            other => Err(Error::Lookup(format!(
                "'{}' is a {} node, not a single-input node",
                other.name(),
                other.kind_name()
            ))),
        }
    }

    pub fn source_of(&self, channel: &Channel) -> Option<&PlanNode> {
        self.node(channel.source)
    }

    pub fn target_of(&self, channel: &Channel) -> Option<&PlanNode> {
        self.node(channel.target)
    }

    pub fn total_costs(&self) -> Costs {
        self.channels
            .iter()
            .fold(Costs::zero(), |acc, c| acc + c.costs)
    }

    /// Stable digest of the whole plan.
    pub fn fingerprint(&self) -> Result<Hash256> {
        hash_serde(self)
    }

    /// Indented rendering, sinks first. Shared nodes are expanded once and
    /// referenced afterwards.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let mut expanded = vec![false; self.nodes.len()];
        // (node, depth, channel that led here)
        let mut stack: Vec<(PlanNodeId, usize, Option<ChannelId>)> =
            self.sinks.iter().rev().map(|s| (*s, 0, None)).collect();

        while let Some((id, depth, via)) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            let indent = "  ".repeat(depth);
            let _ = write!(out, "{indent}");
            if let Some(ch) = via.and_then(|c| self.channel(c)) {
                let _ = write!(out, "<- {}", ch.ship_strategy);
                if ch.local_strategy != LocalStrategy::None {
                    let _ = write!(out, " [{}]", ch.local_strategy);
                }
                let _ = write!(out, " -- ");
            }
            let _ = write!(
                out,
                "{} '{}' ({}) p={} props={}",
                node.kind_name(),
                node.name(),
                node.operator_name(),
                node.info().parallelism,
                node.properties()
            );
            if expanded[id.index()] {
                let _ = writeln!(out, " (shared, see above)");
                continue;
            }
            let _ = writeln!(out);
            expanded[id.index()] = true;
            for ch in node.inputs().iter().rev() {
                if let Some(channel) = self.channel(*ch) {
                    stack.push((channel.source, depth + 1, Some(*ch)));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ship_strategy_keys_only_for_key_partitioning() {
        assert_eq!(
            ShipStrategy::PartitionHash(FieldList::single(0)).keys(),
            Some(&FieldList::single(0))
        );
        assert_eq!(ShipStrategy::Forward.keys(), None);
        assert_eq!(ShipStrategy::Broadcast.keys(), None);
        assert_eq!(ShipStrategy::Rebalance.keys(), None);
        assert!(!ShipStrategy::Forward.is_network());
        assert_eq!(
            ShipStrategy::PartitionRange(FieldList::new([1, 0])).to_string(),
            "PARTITION_RANGE[1, 0]"
        );
    }

    #[test]
    fn optimized_plan_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OptimizedPlan>();
    }
}
