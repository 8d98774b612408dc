//! Logical plan representation consumed by the optimizer.
//!
//! The plan is an arena of `LogicalNode`s addressed by `NodeId`. Shared
//! subplans are simply nodes that appear in the `inputs` of more than one
//! consumer; nothing relies on reference identity.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::fields::{FieldList, FieldSet};
use crate::id::NodeId;
use crate::properties::{GlobalProperties, Ordering, Partitioning};

/// Explicit repartitioning requested by the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionMethod {
    Hash(FieldList),
    Range(FieldList),
    Random,
}

/// Restricts which physical join strategies the optimizer may consider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinHint {
    /// Let the cost model choose.
    #[default]
    Optimizer,
    Repartition,
    BroadcastLeft,
    BroadcastRight,
}

/// Property-relevant semantics of a logical operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Source {
        #[serde(default)]
        properties: GlobalProperties,
    },
    /// Record-at-a-time transformation; `forwarded` lists the fields copied
    /// unchanged to the same position of the output.
    Map {
        #[serde(default)]
        forwarded: FieldSet,
    },
    Filter,
    GroupReduce {
        keys: FieldList,
    },
    Sort {
        ordering: Ordering,
    },
    Partition {
        method: PartitionMethod,
    },
    /// Equi-join; the output carries the left record's fields at their
    /// original positions.
    Join {
        left_keys: FieldList,
        right_keys: FieldList,
        #[serde(default)]
        hint: JoinHint,
    },
    Union,
    Sink {
        #[serde(default)]
        ordering: Option<Ordering>,
    },
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Source { .. } => "Source",
            Operator::Map { .. } => "Map",
            Operator::Filter => "Filter",
            Operator::GroupReduce { .. } => "GroupReduce",
            Operator::Sort { .. } => "Sort",
            Operator::Partition { .. } => "Partition",
            Operator::Join { .. } => "Join",
            Operator::Union => "Union",
            Operator::Sink { .. } => "Sink",
        }
    }

    pub fn is_union(&self) -> bool {
        matches!(self, Operator::Union)
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, Operator::Sink { .. })
    }

    /// Returns `(min, max)` number of inputs.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Operator::Source { .. } => (0, 0),
            Operator::Join { .. } => (2, 2),
            Operator::Union => (2, usize::MAX),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalNode {
    pub id: NodeId,
    /// Label used for diagnostics and plan-node resolution.
    pub name: String,
    pub operator: Operator,
    pub inputs: Vec<NodeId>,
    /// Degree of parallelism; the optimizer default applies when absent.
    #[serde(default)]
    pub parallelism: Option<u32>,
    /// Opaque size estimate supplied by the front end.
    #[serde(default)]
    pub estimated_output_bytes: Option<u64>,
}

/// Immutable logical DAG.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogicalPlan {
    nodes: Vec<LogicalNode>,
}

impl LogicalPlan {
    /// Wrap a node list. Node ids must equal their position in the list;
    /// everything else is checked by `validate`.
    pub fn new(nodes: Vec<LogicalNode>) -> Result<Self> {
        for (pos, node) in nodes.iter().enumerate() {
            if node.id.index() != pos {
                return Err(Error::unsupported(
                    &node.name,
                    format!("node id {} does not match its position {pos}", node.id),
                ));
            }
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[LogicalNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&LogicalNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name_of(&self, id: NodeId) -> &str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn sinks(&self) -> impl Iterator<Item = &LogicalNode> + '_ {
        self.nodes.iter().filter(|n| n.operator.is_sink())
    }

    /// Full precondition check: references, acyclicity, operator shapes.
    /// Returns a topological order (producers before consumers).
    pub fn validate(&self) -> Result<Vec<NodeId>> {
        self.check_references()?;
        let order = self.topological_order()?;
        self.check_shapes()?;
        Ok(order)
    }

    fn check_references(&self) -> Result<()> {
        for node in &self.nodes {
            if let Some(bad) = node.inputs.iter().find(|i| i.index() >= self.nodes.len()) {
                return Err(Error::unsupported(
                    &node.name,
                    format!("input {bad} does not exist"),
                ));
            }
        }
        Ok(())
    }

    /// Kahn's algorithm; ties are resolved by node id so the order is stable.
    /// Callers must have checked references first.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        for node in &self.nodes {
            for input in &node.inputs {
                in_degree[node.id.index()] += 1;
                dependents[input.index()].push(node.id);
            }
        }

        let mut ready: VecDeque<NodeId> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(NodeId::from)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for next in &dependents[id.index()] {
                let deg = &mut in_degree[next.index()];
                *deg -= 1;
                if *deg == 0 {
                    ready.push_back(*next);
                }
            }
        }

        if order.len() < n {
            let on_cycle = self.find_cycle_member(&in_degree);
            return Err(Error::CyclicPlan {
                node: self.name_of(on_cycle).to_string(),
            });
        }
        Ok(order)
    }

    /// Nodes left with a positive in-degree are on a cycle or downstream of
    /// one. Walking unresolved inputs from any of them must revisit a node.
    fn find_cycle_member(&self, in_degree: &[usize]) -> NodeId {
        let start = in_degree
            .iter()
            .position(|&d| d > 0)
            .map(NodeId::from)
            .unwrap_or(NodeId::new(0));
        let mut seen = vec![false; self.nodes.len()];
        let mut cur = start;
        while !seen[cur.index()] {
            seen[cur.index()] = true;
            let next = self.nodes[cur.index()]
                .inputs
                .iter()
                .find(|i| in_degree[i.index()] > 0);
            match next {
                Some(next) => cur = *next,
                None => break,
            }
        }
        cur
    }

    fn check_shapes(&self) -> Result<()> {
        let mut consumed = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for input in &node.inputs {
                consumed[input.index()] = true;
            }
        }

        for node in &self.nodes {
            let (min, max) = node.operator.arity();
            let got = node.inputs.len();
            if got < min || got > max {
                let expected = if min == max {
                    format!("{min}")
                } else {
                    format!("at least {min}")
                };
                return Err(Error::unsupported(
                    &node.name,
                    format!(
                        "{} expects {expected} input(s), got {got}",
                        node.operator.name()
                    ),
                ));
            }
            if node.parallelism == Some(0) {
                return Err(Error::unsupported(&node.name, "parallelism must be positive"));
            }
            if node.operator.is_sink() && consumed[node.id.index()] {
                return Err(Error::unsupported(&node.name, "a sink cannot feed other operators"));
            }
            check_operator(&node.name, &node.operator)?;
        }

        if self.sinks().next().is_none() {
            return Err(Error::unsupported("<plan>", "the plan has no sinks"));
        }
        Ok(())
    }
}

fn check_operator(name: &str, op: &Operator) -> Result<()> {
    match op {
        Operator::Source { properties } => {
            match &properties.partitioning {
                Partitioning::FullReplication => {
                    return Err(Error::unsupported(
                        name,
                        "sources cannot declare fully replicated output",
                    ))
                }
                Partitioning::Hash(f) | Partitioning::Range(f) if f.is_empty() => {
                    return Err(Error::unsupported(name, "declared partitioning has no fields"))
                }
                _ => {}
            }
            if let Some(ordering) = &properties.ordering {
                let ok = matches!(&properties.partitioning,
                    Partitioning::Range(f) if ordering.fields().starts_with(f));
                if !ok {
                    return Err(Error::unsupported(
                        name,
                        "a declared ordering needs a matching range partitioning",
                    ));
                }
            }
        }
        Operator::GroupReduce { keys } if keys.is_empty() => {
            return Err(Error::unsupported(name, "grouping needs at least one key"));
        }
        Operator::Sort { ordering } if ordering.is_empty() => {
            return Err(Error::unsupported(name, "sort needs at least one key"));
        }
        Operator::Sink {
            ordering: Some(ordering),
        } if ordering.is_empty() => {
            return Err(Error::unsupported(name, "sink ordering needs at least one key"));
        }
        Operator::Partition {
            method: PartitionMethod::Hash(f) | PartitionMethod::Range(f),
        } if f.is_empty() => {
            return Err(Error::unsupported(name, "partitioning needs at least one field"));
        }
        Operator::Join {
            left_keys,
            right_keys,
            ..
        } => {
            if left_keys.is_empty() || left_keys.len() != right_keys.len() {
                return Err(Error::unsupported(
                    name,
                    format!("join keys {left_keys} and {right_keys} do not pair up"),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Convenience builder that assigns ids in insertion order.
#[derive(Debug, Default)]
pub struct LogicalPlanBuilder {
    nodes: Vec<LogicalNode>,
}

impl LogicalPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary node. Inputs are not checked until validation.
    pub fn add(&mut self, name: impl Into<String>, operator: Operator, inputs: Vec<NodeId>) -> NodeId {
        let id = NodeId::from(self.nodes.len());
        self.nodes.push(LogicalNode {
            id,
            name: name.into(),
            operator,
            inputs,
            parallelism: None,
            estimated_output_bytes: None,
        });
        id
    }

    pub fn source(&mut self, name: impl Into<String>) -> NodeId {
        self.add(
            name,
            Operator::Source {
                properties: GlobalProperties::none(),
            },
            vec![],
        )
    }

    pub fn source_with_properties(
        &mut self,
        name: impl Into<String>,
        properties: GlobalProperties,
    ) -> NodeId {
        self.add(name, Operator::Source { properties }, vec![])
    }

    pub fn map(&mut self, name: impl Into<String>, input: NodeId, forwarded: FieldSet) -> NodeId {
        self.add(name, Operator::Map { forwarded }, vec![input])
    }

    pub fn filter(&mut self, name: impl Into<String>, input: NodeId) -> NodeId {
        self.add(name, Operator::Filter, vec![input])
    }

    pub fn group_reduce(&mut self, name: impl Into<String>, input: NodeId, keys: FieldList) -> NodeId {
        self.add(name, Operator::GroupReduce { keys }, vec![input])
    }

    pub fn sort(&mut self, name: impl Into<String>, input: NodeId, ordering: Ordering) -> NodeId {
        self.add(name, Operator::Sort { ordering }, vec![input])
    }

    pub fn partition(
        &mut self,
        name: impl Into<String>,
        input: NodeId,
        method: PartitionMethod,
    ) -> NodeId {
        self.add(name, Operator::Partition { method }, vec![input])
    }

    pub fn join(
        &mut self,
        name: impl Into<String>,
        left: NodeId,
        right: NodeId,
        left_keys: FieldList,
        right_keys: FieldList,
        hint: JoinHint,
    ) -> NodeId {
        self.add(
            name,
            Operator::Join {
                left_keys,
                right_keys,
                hint,
            },
            vec![left, right],
        )
    }

    pub fn union(&mut self, name: impl Into<String>, left: NodeId, right: NodeId) -> NodeId {
        self.add(name, Operator::Union, vec![left, right])
    }

    pub fn sink(&mut self, name: impl Into<String>, input: NodeId) -> NodeId {
        self.add(name, Operator::Sink { ordering: None }, vec![input])
    }

    pub fn sorted_sink(&mut self, name: impl Into<String>, input: NodeId, ordering: Ordering) -> NodeId {
        self.add(
            name,
            Operator::Sink {
                ordering: Some(ordering),
            },
            vec![input],
        )
    }

    /// Override parallelism of an already added node. Unknown ids are ignored.
    pub fn with_parallelism(&mut self, id: NodeId, parallelism: u32) -> &mut Self {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.parallelism = Some(parallelism);
        }
        self
    }

    pub fn with_estimated_bytes(&mut self, id: NodeId, bytes: u64) -> &mut Self {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.estimated_output_bytes = Some(bytes);
        }
        self
    }

    pub fn build(self) -> LogicalPlan {
        LogicalPlan { nodes: self.nodes }
    }
}
