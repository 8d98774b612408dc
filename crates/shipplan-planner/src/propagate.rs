//! Interesting-property propagation and candidate enumeration.
//!
//! Two passes over the flat plan:
//! 1. top-down (consumers first): every node collects the distinct requests
//!    its consumers make and derives its alternatives, which in turn become
//!    requests on its inputs;
//! 2. bottom-up (producers first): for every alternative, build the input
//!    channels from the memoized best input candidates, compute output
//!    properties and costs, prune, and memoize the cheapest candidate per
//!    distinct request.
//!
//! Both passes iterate over the topologically ordered node list, so plan
//! depth never turns into recursion depth.

use std::collections::HashMap;

use shipplan_core::config::OptimizerConfig;
use shipplan_core::error::{Error, Result};
use shipplan_core::id::{CandidateId, FlatNodeId};
use shipplan_core::properties::{GlobalProperties, Partitioning, RequestedGlobalProperties};

use crate::branches::BranchDescriptor;
use crate::cost::{self, CostModel, Costed, Costs};
use crate::physical::{LocalStrategy, ShipStrategy};
use crate::rules::{self, Alternative};
use crate::union::{FlatNode, FlatPlan};

/// Shipping decision for one requested/available pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDecision {
    pub ship_strategy: ShipStrategy,
    pub local_strategy: LocalStrategy,
    /// Properties of the data after shipping and local work.
    pub properties: GlobalProperties,
}

/// Choose how to move data with `available` properties from a producer at
/// `producer_parallelism` to a consumer at `consumer_parallelism` so that
/// `requested` holds. `None` if no strategy can.
pub fn parameterize(
    requested: &RequestedGlobalProperties,
    available: &GlobalProperties,
    producer_parallelism: u32,
    consumer_parallelism: u32,
) -> Option<ChannelDecision> {
    if !requested.is_satisfiable() {
        return None;
    }
    let same_parallelism = producer_parallelism == consumer_parallelism;

    // Replicated data can only be forwarded as-is; re-shipping it would
    // duplicate every record.
    if available.is_fully_replicated()
        && !(same_parallelism
            && matches!(
                requested.partitioning,
                Partitioning::FullReplication | Partitioning::AnyDistribution
            ))
    {
        return None;
    }

    let (ship_strategy, mut properties) =
        if same_parallelism && requested.partitioning_met_by(available) {
            (ShipStrategy::Forward, available.clone())
        } else {
            match &requested.partitioning {
                Partitioning::Hash(f) => (
                    ShipStrategy::PartitionHash(f.clone()),
                    GlobalProperties::hash(f.clone()),
                ),
                Partitioning::Range(f) => (
                    ShipStrategy::PartitionRange(f.clone()),
                    GlobalProperties::range(f.clone()),
                ),
                Partitioning::Random => (ShipStrategy::PartitionRandom, GlobalProperties::random()),
                Partitioning::FullReplication => {
                    (ShipStrategy::Broadcast, GlobalProperties::full_replication())
                }
                Partitioning::None | Partitioning::AnyDistribution => {
                    (ShipStrategy::Rebalance, GlobalProperties::random())
                }
            }
        };

    let local_strategy = match &requested.ordering {
        Some(o) if !requested.ordering_met_by(&properties) => {
            properties.ordering = Some(o.clone());
            LocalStrategy::Sort(o.clone())
        }
        _ => LocalStrategy::None,
    };

    Some(ChannelDecision {
        ship_strategy,
        local_strategy,
        properties,
    })
}

/// One input channel of a candidate.
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    /// Producer candidate.
    pub source: CandidateId,
    pub requested: RequestedGlobalProperties,
    pub ship_strategy: ShipStrategy,
    pub local_strategy: LocalStrategy,
    pub properties: GlobalProperties,
    pub estimated_bytes: u64,
    pub costs: Costs,
}

/// A fully parameterized subplan rooted at one flat node.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: CandidateId,
    pub node: FlatNodeId,
    pub inputs: Vec<ChannelPlan>,
    pub properties: GlobalProperties,
    /// Cumulative cost of the subplan.
    pub costs: Costs,
}

impl Costed for Candidate {
    fn properties(&self) -> &GlobalProperties {
        &self.properties
    }

    fn costs(&self) -> Costs {
        self.costs
    }
}

/// Requests and alternatives gathered for one flat node in the top-down pass.
#[derive(Debug, Clone, Default)]
pub struct NodeRequirements {
    pub descriptor: BranchDescriptor,
    pub alternatives: Vec<Alternative>,
}

/// Candidate storage plus the per-(node, request) memo.
#[derive(Debug, Default)]
pub struct CandidateArena {
    candidates: Vec<Candidate>,
    memo: HashMap<(FlatNodeId, RequestedGlobalProperties), CandidateId>,
    /// Surviving candidates per flat node, indexed by node id.
    by_node: Vec<Vec<CandidateId>>,
}

impl CandidateArena {
    pub fn get(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.get(id.index())
    }

    pub fn lookup(&self, node: FlatNodeId, request: &RequestedGlobalProperties) -> Option<CandidateId> {
        self.memo.get(&(node, request.clone())).copied()
    }

    pub fn candidates_of(&self, node: FlatNodeId) -> &[CandidateId] {
        self.by_node.get(node.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn insert(&mut self, mut candidate: Candidate) -> CandidateId {
        let id = CandidateId::from(self.candidates.len());
        candidate.id = id;
        self.candidates.push(candidate);
        id
    }
}

/// Request under which sink candidates are memoized. Nothing consumes a
/// sink, so any distribution will do.
pub fn sink_request() -> RequestedGlobalProperties {
    RequestedGlobalProperties::any_distribution()
}

/// Top-down pass. Returns requirements indexed by flat node id.
pub fn push_requirements(flat: &FlatPlan) -> Vec<NodeRequirements> {
    let mut reqs: Vec<NodeRequirements> = vec![NodeRequirements::default(); flat.len()];
    for sink in flat.sinks() {
        reqs[sink.index()].descriptor.register(sink_request());
    }

    for node in flat.nodes().iter().rev() {
        let idx = node.id.index();
        let alternatives = rules::alternatives(node, reqs[idx].descriptor.requests());
        for alt in &alternatives {
            for (slot, request) in alt.inputs.iter().enumerate() {
                if let Some(input) = node.inputs.get(slot) {
                    reqs[input.index()].descriptor.register(request.clone());
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            node = %node.name,
            requests = reqs[idx].descriptor.len(),
            alternatives = alternatives.len(),
            "pushed requirements"
        );

        reqs[idx].alternatives = alternatives;
    }
    reqs
}

/// Bottom-up pass.
pub fn enumerate_candidates(
    flat: &FlatPlan,
    reqs: &[NodeRequirements],
    model: &CostModel,
    config: &OptimizerConfig,
) -> Result<CandidateArena> {
    let mut arena = CandidateArena::default();

    for node in flat.nodes() {
        let requirements = reqs
            .get(node.id.index())
            .ok_or_else(|| Error::invariant(&node.name, "no requirements recorded"))?;

        let mut local: Vec<Candidate> = Vec::with_capacity(requirements.alternatives.len());
        let mut last_err = None;
        for alt in &requirements.alternatives {
            match build_candidate(flat, &arena, model, node, alt) {
                Ok(c) => local.push(c),
                Err(e) => last_err = Some(e),
            }
        }
        if local.is_empty() {
            return Err(last_err
                .unwrap_or_else(|| Error::invariant(&node.name, "operator has no alternatives")));
        }

        let survivors = cost::prune_dominated(&local);
        let survivors = cost::bound_candidates(&local, survivors, config.max_candidates_per_node);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            node = %node.name,
            built = local.len(),
            kept = survivors.len(),
            "enumerated candidates"
        );

        let mut kept: Vec<CandidateId> = Vec::with_capacity(survivors.len());
        let mut slots: Vec<Option<Candidate>> = local.into_iter().map(Some).collect();
        for idx in survivors {
            if let Some(c) = slots[idx].take() {
                kept.push(arena.insert(c));
            }
        }

        // A request no kept candidate can serve at equal parallelism gets no
        // memo entry; consumers then search all candidates themselves.
        for request in requirements.descriptor.requests() {
            if let Some(best) = select_for_request(&arena, model, node, &kept, request) {
                arena.memo.insert((node.id, request.clone()), best);
            }
        }
        arena.by_node.push(kept);
    }

    Ok(arena)
}

fn build_candidate(
    flat: &FlatPlan,
    arena: &CandidateArena,
    model: &CostModel,
    node: &FlatNode,
    alt: &Alternative,
) -> Result<Candidate> {
    let mut inputs = Vec::with_capacity(alt.inputs.len());
    let mut arriving = Vec::with_capacity(alt.inputs.len());
    let mut costs = Costs::zero();

    for (slot, request) in alt.inputs.iter().enumerate() {
        let input_id = *node
            .inputs
            .get(slot)
            .ok_or_else(|| Error::invariant(&node.name, format!("missing input slot {slot}")))?;
        let producer = flat
            .node(input_id)
            .ok_or_else(|| Error::invariant(&node.name, "input node missing from flat plan"))?;
        let (source, decision) = choose_input(arena, model, producer, node, request)
            .ok_or_else(|| Error::UnsatisfiableRequirement {
                node: node.name.clone(),
                requested: request.to_string(),
            })?;
        let producer_candidate = arena
            .get(source)
            .ok_or_else(|| Error::invariant(&producer.name, "dangling candidate id"))?;

        let local_strategy = match decision.local_strategy {
            LocalStrategy::None => rules::operator_local_strategy(node, slot, &decision.properties),
            sort => sort,
        };
        let channel_costs = model.channel_costs(
            &decision.ship_strategy,
            &local_strategy,
            producer.estimated_bytes,
            node.parallelism,
        );
        costs = costs + producer_candidate.costs + channel_costs;
        arriving.push(decision.properties.clone());
        inputs.push(ChannelPlan {
            source,
            requested: request.clone(),
            ship_strategy: decision.ship_strategy,
            local_strategy,
            properties: decision.properties,
            estimated_bytes: producer.estimated_bytes,
            costs: channel_costs,
        });
    }

    Ok(Candidate {
        id: CandidateId::new(0),
        node: node.id,
        properties: rules::output_properties(node, alt, &arriving),
        inputs,
        costs,
    })
}

/// Shipping decision for feeding `candidate` of `producer` into a consumer
/// at `consumer_parallelism`.
///
/// A union replica built for `request` already shipped every input to the
/// requested partitioning, so that partitioning holds on its output channel
/// even though the union itself only reports hash, range or replicated
/// output.
fn ship_candidate(
    request: &RequestedGlobalProperties,
    candidate: &Candidate,
    producer: &FlatNode,
    consumer_parallelism: u32,
) -> Option<ChannelDecision> {
    let concrete = matches!(
        request.partitioning,
        Partitioning::Hash(_)
            | Partitioning::Range(_)
            | Partitioning::Random
            | Partitioning::FullReplication
    );
    let stripped = request.clone().without_ordering();
    let established = concrete
        && producer.is_union()
        && producer.parallelism == consumer_parallelism
        && !candidate.inputs.is_empty()
        && candidate.inputs.iter().all(|ch| ch.requested == stripped);
    if established {
        let available = GlobalProperties {
            partitioning: request.partitioning.clone(),
            ordering: None,
        };
        return parameterize(request, &available, producer.parallelism, consumer_parallelism);
    }
    parameterize(
        request,
        &candidate.properties,
        producer.parallelism,
        consumer_parallelism,
    )
}

/// The memoized candidate for `request` if it can be shipped to `consumer`;
/// otherwise the cheapest candidate of `producer` that can.
fn choose_input(
    arena: &CandidateArena,
    model: &CostModel,
    producer: &FlatNode,
    consumer: &FlatNode,
    request: &RequestedGlobalProperties,
) -> Option<(CandidateId, ChannelDecision)> {
    let ship = |id: CandidateId| {
        let c = arena.get(id)?;
        ship_candidate(request, c, producer, consumer.parallelism)
    };
    if let Some(id) = arena.lookup(producer.id, request) {
        if let Some(decision) = ship(id) {
            return Some((id, decision));
        }
    }

    let candidates = arena.candidates_of(producer.id);
    let scores = candidates.iter().enumerate().filter_map(|(pos, id)| {
        let c = arena.get(*id)?;
        let d = ship(*id)?;
        let channel = model.channel_costs(
            &d.ship_strategy,
            &d.local_strategy,
            producer.estimated_bytes,
            consumer.parallelism,
        );
        Some((pos, c.costs.total().saturating_add(channel.total())))
    });
    let id = cost::cheapest(scores).and_then(|pos| candidates.get(pos).copied())?;

    #[cfg(feature = "tracing")]
    tracing::trace!(
        producer = %producer.name,
        consumer = %consumer.name,
        %request,
        "memoized candidate unusable, fell back to another"
    );
    Some((id, ship(id)?))
}

/// Cheapest kept candidate once the cost of satisfying `request` on top of
/// it is added. Consumers are scored at the producer's own parallelism.
fn select_for_request(
    arena: &CandidateArena,
    model: &CostModel,
    node: &FlatNode,
    kept: &[CandidateId],
    request: &RequestedGlobalProperties,
) -> Option<CandidateId> {
    let scores = kept.iter().enumerate().filter_map(|(pos, id)| {
        let c = arena.get(*id)?;
        let d = ship_candidate(request, c, node, node.parallelism)?;
        let ship = model.channel_costs(
            &d.ship_strategy,
            &d.local_strategy,
            node.estimated_bytes,
            node.parallelism,
        );
        Some((pos, c.costs.total().saturating_add(ship.total())))
    });
    cost::cheapest(scores).and_then(|pos| kept.get(pos).copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipplan_core::fields::FieldList;
    use shipplan_core::properties::Ordering;

    fn f(i: usize) -> FieldList {
        FieldList::single(i)
    }

    #[test]
    fn met_partitioning_at_same_parallelism_forwards() {
        let d = parameterize(
            &RequestedGlobalProperties::hash(f(0)),
            &GlobalProperties::hash(f(0)),
            4,
            4,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::Forward);
        assert_eq!(d.local_strategy, LocalStrategy::None);
    }

    #[test]
    fn parallelism_change_forces_a_network_ship() {
        let d = parameterize(
            &RequestedGlobalProperties::hash(f(0)),
            &GlobalProperties::hash(f(0)),
            4,
            2,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::PartitionHash(f(0)));

        let d = parameterize(
            &RequestedGlobalProperties::trivial(),
            &GlobalProperties::none(),
            4,
            2,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::Rebalance);
        assert_eq!(d.properties, GlobalProperties::random());
    }

    #[test]
    fn hash_on_other_fields_is_repartitioned() {
        let d = parameterize(
            &RequestedGlobalProperties::hash(f(1)),
            &GlobalProperties::hash(f(0)),
            4,
            4,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::PartitionHash(f(1)));
        assert_eq!(d.properties, GlobalProperties::hash(f(1)));
    }

    #[test]
    fn total_order_adds_a_local_sort() {
        let o = Ordering::ascending(&f(0));
        let d = parameterize(
            &RequestedGlobalProperties::total_order(o.clone()),
            &GlobalProperties::none(),
            4,
            4,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::PartitionRange(f(0)));
        assert_eq!(d.local_strategy, LocalStrategy::Sort(o.clone()));
        assert_eq!(d.properties, GlobalProperties::range(f(0)).with_ordering(o.clone()));

        // range-partitioned input only needs the local sort
        let d = parameterize(
            &RequestedGlobalProperties::total_order(o.clone()),
            &GlobalProperties::range(f(0)),
            4,
            4,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::Forward);
        assert_eq!(d.local_strategy, LocalStrategy::Sort(o));
    }

    #[test]
    fn replicated_data_is_only_forwarded() {
        let rep = GlobalProperties::full_replication();
        assert!(parameterize(&RequestedGlobalProperties::trivial(), &rep, 4, 4).is_none());
        assert!(parameterize(&RequestedGlobalProperties::hash(f(0)), &rep, 4, 4).is_none());
        assert!(parameterize(&RequestedGlobalProperties::any_distribution(), &rep, 4, 2).is_none());
        let d = parameterize(&RequestedGlobalProperties::any_distribution(), &rep, 4, 4).unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::Forward);
    }

    #[test]
    fn broadcast_and_random_requests() {
        let d = parameterize(
            &RequestedGlobalProperties::full_replication(),
            &GlobalProperties::hash(f(0)),
            4,
            4,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::Broadcast);
        assert!(d.properties.is_fully_replicated());

        let d = parameterize(
            &RequestedGlobalProperties::random(),
            &GlobalProperties::none(),
            4,
            4,
        )
        .unwrap();
        assert_eq!(d.ship_strategy, ShipStrategy::PartitionRandom);
    }

    #[test]
    fn ordering_without_range_is_unsatisfiable() {
        let r = RequestedGlobalProperties::hash(f(0)).with_ordering(Ordering::ascending(&f(0)));
        assert!(parameterize(&r, &GlobalProperties::none(), 4, 4).is_none());
    }
}
