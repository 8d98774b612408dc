//! Lowering: chosen candidates → physical plan graph.
//!
//! Starting from each sink's memoized candidate, walk the chosen input
//! candidates with an explicit work stack. Non-union candidates become one
//! plan node no matter how many channels read them, which keeps shared
//! subplans shared. Union candidates are instantiated once per referencing
//! channel so every n-ary union ends up with exactly one consumer.

use std::collections::HashMap;

use shipplan_core::dag::Operator;
use shipplan_core::error::{Error, Result};
use shipplan_core::id::{CandidateId, ChannelId, PlanNodeId};

use crate::physical::{
    Channel, DualInputPlanNode, NAryUnionPlanNode, NodeInfo, OptimizedPlan, PlanNode,
    SingleInputPlanNode, SinkPlanNode, SourcePlanNode,
};
use crate::propagate::{sink_request, CandidateArena};
use crate::union::{FlatKind, FlatPlan};

/// Plan node under construction; input slots are filled as channels appear.
struct PendingNode {
    info: NodeInfo,
    kind: FlatKind,
    inputs: Vec<Option<ChannelId>>,
}

/// Work item: instantiate `candidate` and, if `consumer` is set, connect it
/// to slot `slot` of the consumer plan node built from `consumer_candidate`.
struct Task {
    candidate: CandidateId,
    consumer: Option<(PlanNodeId, usize, CandidateId)>,
}

pub fn assemble(flat: &FlatPlan, arena: &CandidateArena) -> Result<OptimizedPlan> {
    let mut pending: Vec<PendingNode> = Vec::new();
    let mut channels: Vec<Channel> = Vec::new();
    let mut instantiated: HashMap<CandidateId, PlanNodeId> = HashMap::new();
    let mut sinks: Vec<PlanNodeId> = Vec::with_capacity(flat.sinks().len());

    let request = sink_request();
    for sink in flat.sinks() {
        let name = flat.node(*sink).map(|n| n.name.as_str()).unwrap_or("<sink>");
        let candidate = arena
            .lookup(*sink, &request)
            .ok_or_else(|| Error::invariant(name, "sink has no chosen candidate"))?;

        let mut stack = vec![Task {
            candidate,
            consumer: None,
        }];
        while let Some(task) = stack.pop() {
            let cand = arena
                .get(task.candidate)
                .ok_or_else(|| Error::invariant(name, "dangling candidate id"))?;
            let node = flat
                .node(cand.node)
                .ok_or_else(|| Error::invariant(name, "candidate for unknown flat node"))?;

            let existing = if node.is_union() {
                None
            } else {
                instantiated.get(&task.candidate).copied()
            };
            let (plan_id, fresh) = match existing {
                Some(id) => (id, false),
                None => {
                    let id = PlanNodeId::from(pending.len());
                    pending.push(PendingNode {
                        info: NodeInfo {
                            id,
                            logical: node.origin,
                            name: node.name.clone(),
                            parallelism: node.parallelism,
                            properties: cand.properties.clone(),
                            outgoing: Vec::new(),
                            costs: cand.costs,
                        },
                        kind: node.kind.clone(),
                        inputs: vec![None; cand.inputs.len()],
                    });
                    if !node.is_union() {
                        instantiated.insert(task.candidate, id);
                    }
                    (id, true)
                }
            };

            match task.consumer {
                Some((consumer_id, slot, consumer_candidate)) => {
                    let plan = arena
                        .get(consumer_candidate)
                        .and_then(|c| c.inputs.get(slot))
                        .ok_or_else(|| Error::invariant(&node.name, "missing channel plan"))?;
                    let channel_id = ChannelId::from(channels.len());
                    channels.push(Channel {
                        id: channel_id,
                        source: plan_id,
                        target: consumer_id,
                        target_slot: slot,
                        ship_strategy: plan.ship_strategy.clone(),
                        local_strategy: plan.local_strategy.clone(),
                        requested: plan.requested.clone(),
                        properties: plan.properties.clone(),
                        estimated_bytes: plan.estimated_bytes,
                        costs: plan.costs,
                    });
                    pending[plan_id.index()].info.outgoing.push(channel_id);
                    let target = pending
                        .get_mut(consumer_id.index())
                        .and_then(|p| p.inputs.get_mut(slot))
                        .ok_or_else(|| Error::invariant(&node.name, "consumer slot out of range"))?;
                    *target = Some(channel_id);

                    #[cfg(feature = "tracing")]
                    tracing::trace!(
                        producer = %node.name,
                        consumer = %pending[consumer_id.index()].info.name,
                        slot,
                        ship = %plan.ship_strategy,
                        "connected channel"
                    );
                }
                None => sinks.push(plan_id),
            }

            if fresh {
                // Reverse so slot 0 is built first.
                for (slot, input) in cand.inputs.iter().enumerate().rev() {
                    stack.push(Task {
                        candidate: input.source,
                        consumer: Some((plan_id, slot, task.candidate)),
                    });
                }
            }
        }
    }

    let nodes = pending
        .into_iter()
        .map(finish_node)
        .collect::<Result<Vec<_>>>()?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        nodes = nodes.len(),
        channels = channels.len(),
        sinks = sinks.len(),
        "assembled physical plan"
    );

    Ok(OptimizedPlan::new(nodes, channels, sinks))
}

fn finish_node(p: PendingNode) -> Result<PlanNode> {
    let mut inputs = Vec::with_capacity(p.inputs.len());
    for (slot, ch) in p.inputs.iter().enumerate() {
        inputs.push(ch.ok_or_else(|| {
            Error::invariant(&p.info.name, format!("input slot {slot} left unconnected"))
        })?);
    }
    let expected = match &p.kind {
        FlatKind::UnionReplica { .. } => None,
        FlatKind::Operator(Operator::Source { .. }) => Some(0),
        FlatKind::Operator(Operator::Join { .. }) => Some(2),
        FlatKind::Operator(_) => Some(1),
    };
    if let Some(n) = expected {
        if inputs.len() != n {
            return Err(Error::invariant(
                &p.info.name,
                format!("expected {n} input(s), got {}", inputs.len()),
            ));
        }
    }

    let info = p.info;
    let node = match p.kind {
        FlatKind::UnionReplica { .. } => PlanNode::NAryUnion(NAryUnionPlanNode { info, inputs }),
        FlatKind::Operator(operator @ Operator::Source { .. }) => {
            PlanNode::Source(SourcePlanNode { info, operator })
        }
        FlatKind::Operator(operator @ Operator::Sink { .. }) => PlanNode::Sink(SinkPlanNode {
            info,
            operator,
            input: inputs[0],
        }),
        FlatKind::Operator(operator @ Operator::Join { .. }) => {
            PlanNode::DualInput(DualInputPlanNode {
                info,
                operator,
                inputs: [inputs[0], inputs[1]],
            })
        }
        FlatKind::Operator(operator) => PlanNode::SingleInput(SingleInputPlanNode {
            info,
            operator,
            input: inputs[0],
        }),
    };
    Ok(node)
}
