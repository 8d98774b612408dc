//! YAML → LogicalPlan parser for DAG-shaped programs.
//!
//! Nodes are listed by unique name; `inputs` refer to other nodes by name and
//! may point forward in the list. Example (a shared union feeding two
//! groupings):
//! ```yaml
//! config:
//!   default_parallelism: 4
//! nodes:
//!   - { name: s1, op: source }
//!   - { name: s2, op: source, estimated_bytes: 1000 }
//!   - { name: s3, op: source }
//!   - { name: u23, op: union, inputs: [s2, s3] }
//!   - { name: u123, op: union, inputs: [s1, u23] }
//!   - { name: g, op: group_reduce, keys: [0], inputs: [u123] }
//!   - { name: out, op: sink, inputs: [g], order_by: [{ field: 0 }] }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use shipplan_core::config::OptimizerConfig;
use shipplan_core::dag::{JoinHint, LogicalNode, LogicalPlan, Operator, PartitionMethod};
use shipplan_core::fields::{FieldList, FieldSet};
use shipplan_core::id::NodeId;
use shipplan_core::properties::{Direction, GlobalProperties, Ordering, SortKey};

use super::DslError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDoc {
    #[serde(default)]
    pub config: Option<OptimizerConfig>,
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(flatten)]
    pub op: OpDef,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub parallelism: Option<u32>,
    #[serde(default)]
    pub estimated_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum OpDef {
    Source {
        #[serde(default)]
        partitioned_by: Option<PartitionDef>,
        #[serde(default)]
        order_by: Vec<SortKeyDef>,
    },
    Map {
        #[serde(default)]
        forwarded: Vec<usize>,
    },
    Filter,
    GroupReduce {
        keys: Vec<usize>,
    },
    Sort {
        order_by: Vec<SortKeyDef>,
    },
    Partition {
        method: PartitionDef,
    },
    Join {
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
        #[serde(default)]
        hint: HintDef,
    },
    Union,
    Sink {
        #[serde(default)]
        order_by: Vec<SortKeyDef>,
    },
}

/// `{ hash: [0] }`, `{ range: [1, 2] }` or `random`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionDef {
    Hash(Vec<usize>),
    Range(Vec<usize>),
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortKeyDef {
    pub field: usize,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintDef {
    #[default]
    Optimizer,
    Repartition,
    BroadcastLeft,
    BroadcastRight,
}

#[derive(Debug, Clone)]
pub struct ParsedPlan {
    pub plan: LogicalPlan,
    pub config: OptimizerConfig,
}

fn to_ordering(keys: &[SortKeyDef]) -> Option<Ordering> {
    if keys.is_empty() {
        return None;
    }
    Some(Ordering::new(keys.iter().map(|k| SortKey {
        field: k.field,
        direction: if k.descending {
            Direction::Descending
        } else {
            Direction::Ascending
        },
    })))
}

fn to_operator(name: &str, op: OpDef) -> Result<Operator, DslError> {
    Ok(match op {
        OpDef::Source {
            partitioned_by,
            order_by,
        } => {
            let mut properties = match partitioned_by {
                None => GlobalProperties::none(),
                Some(PartitionDef::Hash(f)) => GlobalProperties::hash(FieldList::from(f)),
                Some(PartitionDef::Range(f)) => GlobalProperties::range(FieldList::from(f)),
                Some(PartitionDef::Random) => GlobalProperties::random(),
            };
            properties.ordering = to_ordering(&order_by);
            Operator::Source { properties }
        }
        OpDef::Map { forwarded } => Operator::Map {
            forwarded: FieldSet::new(forwarded),
        },
        OpDef::Filter => Operator::Filter,
        OpDef::GroupReduce { keys } => Operator::GroupReduce {
            keys: FieldList::from(keys),
        },
        OpDef::Sort { order_by } => Operator::Sort {
            ordering: to_ordering(&order_by).ok_or_else(|| DslError::Invalid {
                node: name.to_string(),
                reason: "sort needs at least one key in order_by".into(),
            })?,
        },
        OpDef::Partition { method } => Operator::Partition {
            method: match method {
                PartitionDef::Hash(f) => PartitionMethod::Hash(FieldList::from(f)),
                PartitionDef::Range(f) => PartitionMethod::Range(FieldList::from(f)),
                PartitionDef::Random => PartitionMethod::Random,
            },
        },
        OpDef::Join {
            left_keys,
            right_keys,
            hint,
        } => Operator::Join {
            left_keys: FieldList::from(left_keys),
            right_keys: FieldList::from(right_keys),
            hint: match hint {
                HintDef::Optimizer => JoinHint::Optimizer,
                HintDef::Repartition => JoinHint::Repartition,
                HintDef::BroadcastLeft => JoinHint::BroadcastLeft,
                HintDef::BroadcastRight => JoinHint::BroadcastRight,
            },
        },
        OpDef::Union => Operator::Union,
        OpDef::Sink { order_by } => Operator::Sink {
            ordering: to_ordering(&order_by),
        },
    })
}

/// Parse a YAML plan document. Only name resolution happens here; shape and
/// cycle checks are left to the optimizer.
pub fn parse_yaml_plan(yaml_src: &str) -> Result<ParsedPlan, DslError> {
    let doc: PlanDoc = serde_yaml::from_str(yaml_src)?;

    let mut ids: HashMap<&str, NodeId> = HashMap::with_capacity(doc.nodes.len());
    for (pos, node) in doc.nodes.iter().enumerate() {
        if ids.insert(node.name.as_str(), NodeId::from(pos)).is_some() {
            return Err(DslError::DuplicateName(node.name.clone()));
        }
    }

    let mut nodes = Vec::with_capacity(doc.nodes.len());
    for (pos, def) in doc.nodes.iter().enumerate() {
        let inputs = def
            .inputs
            .iter()
            .map(|input| {
                ids.get(input.as_str())
                    .copied()
                    .ok_or_else(|| DslError::UnknownInput {
                        node: def.name.clone(),
                        input: input.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        nodes.push(LogicalNode {
            id: NodeId::from(pos),
            name: def.name.clone(),
            operator: to_operator(&def.name, def.op.clone())?,
            inputs,
            parallelism: def.parallelism,
            estimated_output_bytes: def.estimated_bytes,
        });
    }

    Ok(ParsedPlan {
        plan: LogicalPlan::new(nodes)?,
        config: doc.config.unwrap_or_default(),
    })
}
