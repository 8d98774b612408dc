//! Union flattening and per-consumer replication.
//!
//! Logical unions are binary and may nest (`union(a, union(b, c))`) and be
//! shared (`u23` feeding both `u123` and `u234`). This pass replaces every
//! union tree that reaches a non-union consumer with an n-ary union *replica*
//! owned by that consumer alone:
//!
//! ```text
//!  s1 ──────────┐                         s1 ─┐
//!               ├─ u123 ── g(0)           s2 ─┼─ ∪ ── g(0)
//!  s2 ─┐        │                         s3 ─┘
//!      ├─ u23 ──┤             ==>
//!  s3 ─┘        │                         s4 ─┐
//!               ├─ u234 ── g(1)           s2 ─┼─ ∪ ── g(1)
//!  s4 ──────────┘                         s3 ─┘
//! ```
//!
//! Leaf producers stay shared; only the union wrapper is replicated. A
//! replica never feeds another replica and has exactly one consumer, so each
//! consumer's partitioning request can be pushed through it independently.

use std::collections::HashMap;

use shipplan_core::config::OptimizerConfig;
use shipplan_core::dag::{LogicalPlan, Operator};
use shipplan_core::error::{Error, Result};
use shipplan_core::id::{FlatNodeId, NodeId};

use crate::branches::BranchResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatKind {
    /// Any non-union logical operator.
    Operator(Operator),
    /// N-ary union replica created for one consumer of the union tree rooted
    /// at `union`.
    UnionReplica { union: NodeId },
}

#[derive(Debug, Clone)]
pub struct FlatNode {
    pub id: FlatNodeId,
    /// Logical node this flat node stands for (the root union for replicas).
    pub origin: NodeId,
    pub name: String,
    pub kind: FlatKind,
    pub inputs: Vec<FlatNodeId>,
    pub parallelism: u32,
    pub estimated_bytes: u64,
}

impl FlatNode {
    pub fn is_union(&self) -> bool {
        matches!(self.kind, FlatKind::UnionReplica { .. })
    }
}

/// Union-free DAG. Nodes are stored in topological order.
#[derive(Debug, Clone, Default)]
pub struct FlatPlan {
    nodes: Vec<FlatNode>,
    sinks: Vec<FlatNodeId>,
}

impl FlatPlan {
    pub fn nodes(&self) -> &[FlatNode] {
        &self.nodes
    }

    pub fn node(&self, id: FlatNodeId) -> Option<&FlatNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn sinks(&self) -> &[FlatNodeId] {
        &self.sinks
    }

    /// Replicas created for the union tree rooted at `union`.
    pub fn replicas_of(&self, union: NodeId) -> impl Iterator<Item = &FlatNode> + '_ {
        self.nodes
            .iter()
            .filter(move |n| n.kind == FlatKind::UnionReplica { union })
    }

    fn push(&mut self, mut node: FlatNode) -> FlatNodeId {
        let id = FlatNodeId::from(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        id
    }
}

/// Depth-first, left-to-right list of the non-union producers under `root`.
/// A union nested in a union contributes its own leaves, never itself.
pub fn collect_union_leaves(plan: &LogicalPlan, root: NodeId) -> Vec<NodeId> {
    let mut leaves = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(node) = plan.node(id) else { continue };
        if node.operator.is_union() {
            stack.extend(node.inputs.iter().rev());
        } else {
            leaves.push(id);
        }
    }
    leaves
}

/// Rewrite `plan` (given in topological `order`) into a flat plan.
pub fn flatten_unions(
    plan: &LogicalPlan,
    order: &[NodeId],
    resolver: &BranchResolver,
    config: &OptimizerConfig,
) -> Result<FlatPlan> {
    let mut flat = FlatPlan::default();
    let mut flat_of: Vec<Option<FlatNodeId>> = vec![None; plan.len()];
    let mut replica_for: HashMap<(NodeId, usize), FlatNodeId> = HashMap::new();

    let parallelism_of = |id: NodeId| {
        plan.node(id)
            .and_then(|n| n.parallelism)
            .unwrap_or(config.default_parallelism)
    };

    for &id in order {
        let node = plan
            .node(id)
            .ok_or_else(|| Error::invariant(id.to_string(), "node missing from plan"))?;

        if !resolver.is_live(id) {
            #[cfg(feature = "tracing")]
            tracing::debug!(node = %node.name, "dropping node that reaches no sink");
            continue;
        }

        if node.operator.is_union() {
            // One replica per consumer edge; unions consumed by unions are
            // absorbed into the consumer's own flattening, so an inner union
            // of a chain never walks its subtree.
            let mut edges = Vec::new();
            for edge in resolver.consumers(id) {
                let consumer = plan
                    .node(edge.consumer)
                    .ok_or_else(|| Error::invariant(&node.name, "consumer missing from plan"))?;
                if !consumer.operator.is_union() {
                    edges.push(edge);
                }
            }
            if edges.is_empty() {
                continue;
            }

            let leaves = collect_union_leaves(plan, id);
            for edge in edges {
                let mut inputs = Vec::with_capacity(leaves.len());
                for leaf in &leaves {
                    let leaf_flat = flat_of[leaf.index()].ok_or_else(|| {
                        Error::invariant(&node.name, format!("leaf {leaf} not flattened yet"))
                    })?;
                    inputs.push(leaf_flat);
                }
                let bytes = estimate_bytes(plan, id, &inputs, &flat, config);
                let replica = flat.push(FlatNode {
                    id: FlatNodeId::new(0),
                    origin: id,
                    name: node.name.clone(),
                    kind: FlatKind::UnionReplica { union: id },
                    inputs,
                    parallelism: parallelism_of(edge.consumer),
                    estimated_bytes: bytes,
                });
                replica_for.insert((edge.consumer, edge.slot), replica);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(
                union = %node.name,
                leaves = leaves.len(),
                consumers = resolver.consumer_count(id),
                "flattened union"
            );
            continue;
        }

        let mut inputs = Vec::with_capacity(node.inputs.len());
        for (slot, input) in node.inputs.iter().enumerate() {
            let is_union = plan.node(*input).is_some_and(|n| n.operator.is_union());
            let flat_input = if is_union {
                replica_for.get(&(id, slot)).copied()
            } else {
                flat_of[input.index()]
            };
            inputs.push(flat_input.ok_or_else(|| {
                Error::invariant(&node.name, format!("input slot {slot} was not flattened"))
            })?);
        }

        let bytes = estimate_bytes(plan, id, &inputs, &flat, config);
        let flat_id = flat.push(FlatNode {
            id: FlatNodeId::new(0),
            origin: id,
            name: node.name.clone(),
            kind: FlatKind::Operator(node.operator.clone()),
            inputs,
            parallelism: parallelism_of(id),
            estimated_bytes: bytes,
        });
        flat_of[id.index()] = Some(flat_id);
        if node.operator.is_sink() {
            flat.sinks.push(flat_id);
        }
    }

    Ok(flat)
}

/// The plan's own estimate when allowed, otherwise the default for sources
/// and the sum of the inputs for everything else.
fn estimate_bytes(
    plan: &LogicalPlan,
    id: NodeId,
    inputs: &[FlatNodeId],
    flat: &FlatPlan,
    config: &OptimizerConfig,
) -> u64 {
    let declared = plan.node(id).and_then(|n| n.estimated_output_bytes);
    match declared {
        Some(bytes) if config.use_size_estimates => bytes,
        _ if inputs.is_empty() => config.default_source_bytes,
        _ => inputs
            .iter()
            .filter_map(|i| flat.node(*i))
            .fold(0u64, |acc, n| acc.saturating_add(n.estimated_bytes)),
    }
}
