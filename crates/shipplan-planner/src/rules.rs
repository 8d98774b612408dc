//! Per-operator property rules.
//!
//! For every flat node these rules answer three questions:
//! - which combinations of input requests (alternatives) the operator can
//!   work with, given the requests its own consumers made;
//! - what global properties the operator's output carries for one
//!   alternative, given the properties of the data arriving on its inputs;
//! - which local strategy the operator itself needs on an input.

use shipplan_core::dag::{JoinHint, Operator, PartitionMethod};
use shipplan_core::fields::{FieldList, FieldSet};
use shipplan_core::properties::{
    GlobalProperties, Ordering, Partitioning, RequestedGlobalProperties,
};

use crate::physical::LocalStrategy;
use crate::union::{FlatKind, FlatNode};

/// One way of feeding an operator: a request per input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub inputs: Vec<RequestedGlobalProperties>,
}

impl Alternative {
    fn single(request: RequestedGlobalProperties) -> Self {
        Self {
            inputs: vec![request],
        }
    }

    fn pair(left: RequestedGlobalProperties, right: RequestedGlobalProperties) -> Self {
        Self {
            inputs: vec![left, right],
        }
    }
}

/// Alternatives for `node`, deduplicated, trivial-first then pushed
/// requests in the order they were registered.
pub fn alternatives(node: &FlatNode, requests: &[RequestedGlobalProperties]) -> Vec<Alternative> {
    let mut out: Vec<Alternative> = Vec::new();

    match &node.kind {
        FlatKind::UnionReplica { .. } => {
            // The union forwards each consumer request to every input; the
            // ordering part cannot survive the merge.
            for r in requests {
                let pushed = r.clone().without_ordering();
                push_unique(&mut out, Alternative {
                    inputs: vec![pushed; node.inputs.len()],
                });
            }
            if out.is_empty() {
                push_unique(&mut out, Alternative {
                    inputs: vec![RequestedGlobalProperties::trivial(); node.inputs.len()],
                });
            }
        }
        FlatKind::Operator(op) => match op {
            Operator::Source { .. } => push_unique(&mut out, Alternative { inputs: Vec::new() }),
            Operator::Filter => {
                push_unique(&mut out, Alternative::single(RequestedGlobalProperties::trivial()));
                for r in requests.iter().filter(|r| !r.is_trivial()) {
                    push_unique(&mut out, Alternative::single(r.clone()));
                }
            }
            Operator::Map { forwarded } => {
                push_unique(&mut out, Alternative::single(RequestedGlobalProperties::trivial()));
                for r in requests.iter().filter(|r| !r.is_trivial()) {
                    if request_survives_map(r, forwarded) {
                        push_unique(&mut out, Alternative::single(r.clone()));
                    }
                }
            }
            Operator::GroupReduce { keys } => {
                push_unique(&mut out, Alternative::single(RequestedGlobalProperties::hash(keys.clone())));
            }
            Operator::Sort { ordering } => {
                push_unique(&mut out, Alternative::single(RequestedGlobalProperties::total_order(
                    ordering.clone(),
                )));
            }
            Operator::Partition { method } => {
                let r = match method {
                    PartitionMethod::Hash(f) => RequestedGlobalProperties::hash(f.clone()),
                    PartitionMethod::Range(f) => RequestedGlobalProperties::range(f.clone()),
                    PartitionMethod::Random => RequestedGlobalProperties::random(),
                };
                push_unique(&mut out, Alternative::single(r));
            }
            Operator::Join {
                left_keys,
                right_keys,
                hint,
            } => {
                let repartition = Alternative::pair(
                    RequestedGlobalProperties::hash(left_keys.clone()),
                    RequestedGlobalProperties::hash(right_keys.clone()),
                );
                let broadcast_left = Alternative::pair(
                    RequestedGlobalProperties::full_replication(),
                    RequestedGlobalProperties::trivial(),
                );
                let broadcast_right = Alternative::pair(
                    RequestedGlobalProperties::trivial(),
                    RequestedGlobalProperties::full_replication(),
                );
                match hint {
                    JoinHint::Optimizer => {
                        push_unique(&mut out, repartition);
                        push_unique(&mut out, broadcast_left);
                        push_unique(&mut out, broadcast_right);
                    }
                    JoinHint::Repartition => push_unique(&mut out, repartition),
                    JoinHint::BroadcastLeft => push_unique(&mut out, broadcast_left),
                    JoinHint::BroadcastRight => push_unique(&mut out, broadcast_right),
                }
            }
            Operator::Sink { ordering } => {
                let r = match ordering {
                    Some(o) => RequestedGlobalProperties::total_order(o.clone()),
                    None => RequestedGlobalProperties::any_distribution(),
                };
                push_unique(&mut out, Alternative::single(r));
            }
            // Flattening removes every logical union.
            Operator::Union => push_unique(&mut out, Alternative {
                inputs: vec![RequestedGlobalProperties::trivial(); node.inputs.len()],
            }),
        },
    }
    out
}

fn push_unique(out: &mut Vec<Alternative>, alt: Alternative) {
    if !out.contains(&alt) {
        out.push(alt);
    }
}

/// A request passes through a map only if every field it mentions is
/// forwarded unchanged.
fn request_survives_map(r: &RequestedGlobalProperties, forwarded: &FieldSet) -> bool {
    let partitioning_ok = r
        .partitioning
        .fields()
        .map_or(true, |f| forwarded.contains_all(f));
    let ordering_ok = r
        .ordering
        .as_ref()
        .map_or(true, |o| forwarded.contains_all(&o.fields()));
    partitioning_ok && ordering_ok
}

/// Output properties of `node` fed through `alternative`, where `inputs`
/// holds the properties of the data on each input channel.
pub fn output_properties(
    node: &FlatNode,
    alternative: &Alternative,
    inputs: &[GlobalProperties],
) -> GlobalProperties {
    let first = inputs.first().cloned().unwrap_or_default();
    match &node.kind {
        FlatKind::UnionReplica { .. } => union_output(inputs),
        FlatKind::Operator(op) => match op {
            Operator::Source { properties } => properties.clone(),
            Operator::Filter
            | Operator::Sort { .. }
            | Operator::Partition { .. }
            | Operator::Sink { .. } => first,
            Operator::Map { forwarded } => map_output(first, forwarded),
            Operator::GroupReduce { keys } => GlobalProperties::hash(keys.clone()),
            Operator::Join { .. } => {
                let left_replicated = alternative
                    .inputs
                    .first()
                    .is_some_and(|r| r.partitioning == Partitioning::FullReplication);
                if left_replicated {
                    // Each instance sees a different slice of the right side.
                    GlobalProperties::none()
                } else {
                    first.without_ordering()
                }
            }
            Operator::Union => GlobalProperties::none(),
        },
    }
}

/// Hash and range partitionings survive a union only when every input
/// carries the same one. Replicated inputs stay replicated.
fn union_output(inputs: &[GlobalProperties]) -> GlobalProperties {
    let Some(first) = inputs.first() else {
        return GlobalProperties::none();
    };
    if !inputs.iter().all(|p| p.partitioning == first.partitioning) {
        return GlobalProperties::none();
    }
    match &first.partitioning {
        Partitioning::Hash(_) | Partitioning::Range(_) | Partitioning::FullReplication => {
            first.clone().without_ordering()
        }
        _ => GlobalProperties::none(),
    }
}

fn map_output(input: GlobalProperties, forwarded: &FieldSet) -> GlobalProperties {
    let partitioning = match input.partitioning {
        Partitioning::Hash(f) | Partitioning::Range(f) if !forwarded.contains_all(&f) => {
            Partitioning::None
        }
        p => p,
    };
    let ordering = match (&partitioning, input.ordering) {
        (Partitioning::Range(_), Some(o)) if forwarded.contains_all(&o.fields()) => Some(o),
        _ => None,
    };
    GlobalProperties {
        partitioning,
        ordering,
    }
}

/// Local strategy the operator itself needs on input `slot`, given the
/// properties arriving there.
pub fn operator_local_strategy(
    node: &FlatNode,
    _slot: usize,
    arriving: &GlobalProperties,
) -> LocalStrategy {
    match &node.kind {
        FlatKind::Operator(Operator::GroupReduce { keys }) => grouping_sort(keys, arriving),
        _ => LocalStrategy::None,
    }
}

fn grouping_sort(keys: &FieldList, arriving: &GlobalProperties) -> LocalStrategy {
    let grouped = arriving
        .ordering
        .as_ref()
        .is_some_and(|o| o.groups_fields(keys));
    if grouped {
        LocalStrategy::None
    } else {
        LocalStrategy::Sort(Ordering::ascending(keys))
    }
}
