//! Structural checks on an assembled plan.
//!
//! Every check failure is an optimizer bug, reported as `Error::Invariant`
//! naming the offending plan node.

use shipplan_core::error::{Error, Result};

use crate::physical::{OptimizedPlan, PlanNode, ShipStrategy};

pub fn verify_plan(plan: &OptimizedPlan) -> Result<()> {
    for (pos, node) in plan.nodes().iter().enumerate() {
        if node.id().index() != pos {
            return Err(Error::invariant(node.name(), "plan node id does not match position"));
        }
        check_endpoints(plan, node)?;
        check_fan_out(node)?;
        if let PlanNode::NAryUnion(union) = node {
            check_union(plan, node, union.list_of_inputs().len())?;
        }
    }

    for channel in plan.channels() {
        if let ShipStrategy::PartitionHash(keys) | ShipStrategy::PartitionRange(keys) =
            &channel.ship_strategy
        {
            if keys.is_empty() {
                let name = plan.target_of(channel).map(|n| n.name()).unwrap_or("<unknown>");
                return Err(Error::invariant(name, "key partitioning without keys"));
            }
        }
    }

    for sink in plan.sink_ids() {
        if !matches!(plan.node(*sink), Some(PlanNode::Sink(_))) {
            return Err(Error::invariant(sink.to_string(), "sink id does not name a sink"));
        }
    }
    Ok(())
}

/// Channel endpoints agree with the nodes that list them.
fn check_endpoints(plan: &OptimizedPlan, node: &PlanNode) -> Result<()> {
    for (slot, id) in node.inputs().iter().enumerate() {
        let ch = plan
            .channel(*id)
            .ok_or_else(|| Error::invariant(node.name(), format!("input {id} does not exist")))?;
        if ch.target != node.id() || ch.target_slot != slot {
            return Err(Error::invariant(
                node.name(),
                format!("input {id} targets {} slot {}", ch.target, ch.target_slot),
            ));
        }
    }
    for id in node.outgoing_channels() {
        let ch = plan
            .channel(*id)
            .ok_or_else(|| Error::invariant(node.name(), format!("output {id} does not exist")))?;
        if ch.source != node.id() {
            return Err(Error::invariant(
                node.name(),
                format!("output {id} starts at {}", ch.source),
            ));
        }
    }
    Ok(())
}

fn check_fan_out(node: &PlanNode) -> Result<()> {
    let outgoing = node.outgoing_channels().len();
    match node {
        PlanNode::Sink(_) if outgoing > 0 => {
            Err(Error::invariant(node.name(), "sink has outgoing channels"))
        }
        PlanNode::Sink(_) => Ok(()),
        _ if outgoing == 0 => Err(Error::invariant(node.name(), "node has no consumer")),
        _ => Ok(()),
    }
}

fn check_union(plan: &OptimizedPlan, node: &PlanNode, inputs: usize) -> Result<()> {
    if inputs < 2 {
        return Err(Error::invariant(
            node.name(),
            format!("n-ary union has {inputs} input(s)"),
        ));
    }
    if node.outgoing_channels().len() != 1 {
        return Err(Error::invariant(
            node.name(),
            format!(
                "n-ary union has {} outgoing channels",
                node.outgoing_channels().len()
            ),
        ));
    }
    let union_input = plan
        .input_channels(node)
        .into_iter()
        .find(|ch| plan.source_of(ch).is_some_and(PlanNode::is_union));
    if union_input.is_some() {
        return Err(Error::invariant(node.name(), "n-ary union reads another union"));
    }
    Ok(())
}
