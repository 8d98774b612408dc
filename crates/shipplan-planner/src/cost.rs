//! Additive cost model and candidate pruning.
//!
//! Cost is shipped bytes plus a fixed penalty per local sort. Candidates are
//! compared only against other candidates of the same plan node, so the model
//! does not need to be calibrated against wall-clock time.

use serde::{Deserialize, Serialize};

use shipplan_core::config::OptimizerConfig;
use shipplan_core::properties::GlobalProperties;

use crate::physical::{LocalStrategy, ShipStrategy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Costs {
    /// Bytes moved over the network.
    pub network_bytes: u64,
    /// Accumulated local-sort penalties.
    pub sort_penalty: u64,
}

impl Costs {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.network_bytes.saturating_add(self.sort_penalty)
    }

    /// Combine two cost records (for merging subplans).
    pub fn combine(a: Self, b: Self) -> Self {
        Self {
            network_bytes: a.network_bytes.saturating_add(b.network_bytes),
            sort_penalty: a.sort_penalty.saturating_add(b.sort_penalty),
        }
    }
}

impl std::ops::Add for Costs {
    type Output = Costs;

    fn add(self, rhs: Costs) -> Costs {
        Costs::combine(self, rhs)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    local_sort_penalty: u64,
}

impl CostModel {
    pub fn new(local_sort_penalty: u64) -> Self {
        Self { local_sort_penalty }
    }

    pub fn from_config(cfg: &OptimizerConfig) -> Self {
        Self::new(cfg.local_sort_penalty)
    }

    /// Cost of shipping `bytes` to a consumer running at `consumer_parallelism`.
    pub fn ship_cost(&self, ship: &ShipStrategy, bytes: u64, consumer_parallelism: u32) -> u64 {
        match ship {
            ShipStrategy::Forward => 0,
            ShipStrategy::PartitionHash(_)
            | ShipStrategy::PartitionRange(_)
            | ShipStrategy::PartitionRandom
            | ShipStrategy::Rebalance => bytes,
            ShipStrategy::Broadcast => bytes.saturating_mul(u64::from(consumer_parallelism)),
        }
    }

    pub fn local_cost(&self, local: &LocalStrategy) -> u64 {
        match local {
            LocalStrategy::None => 0,
            LocalStrategy::Sort(_) => self.local_sort_penalty,
        }
    }

    pub fn channel_costs(
        &self,
        ship: &ShipStrategy,
        local: &LocalStrategy,
        bytes: u64,
        consumer_parallelism: u32,
    ) -> Costs {
        Costs {
            network_bytes: self.ship_cost(ship, bytes, consumer_parallelism),
            sort_penalty: self.local_cost(local),
        }
    }
}

/// Anything the pruning pass can compare.
pub trait Costed {
    fn properties(&self) -> &GlobalProperties;
    fn costs(&self) -> Costs;
}

/// `a` dominates `b` when it is no more expensive and at least as strong.
pub fn dominates<T: Costed>(a: &T, b: &T) -> bool {
    a.costs().total() <= b.costs().total() && a.properties().implies(b.properties())
}

/// Indices of the candidates that survive dominance pruning, in insertion
/// order. Of two mutually dominating candidates the earlier one survives.
pub fn prune_dominated<T: Costed>(candidates: &[T]) -> Vec<usize> {
    (0..candidates.len())
        .filter(|&i| {
            !candidates.iter().enumerate().any(|(j, other)| {
                j != i
                    && dominates(other, &candidates[i])
                    && !(dominates(&candidates[i], other) && i < j)
            })
        })
        .collect()
}

/// Keep at most `max` of `survivors`, cheapest first; insertion order breaks
/// ties and is preserved in the result.
pub fn bound_candidates<T: Costed>(candidates: &[T], survivors: Vec<usize>, max: usize) -> Vec<usize> {
    if survivors.len() <= max {
        return survivors;
    }
    let mut by_cost = survivors;
    by_cost.sort_by_key(|&i| (candidates[i].costs().total(), i));
    by_cost.truncate(max);
    by_cost.sort_unstable();
    by_cost
}

/// Position of the cheapest score; the first wins on ties.
pub fn cheapest(scores: impl IntoIterator<Item = (usize, u64)>) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (idx, score) in scores {
        match best {
            Some((_, b)) if b <= score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipplan_core::fields::FieldList;
    use shipplan_core::properties::Ordering;

    struct C(GlobalProperties, u64);

    impl Costed for C {
        fn properties(&self) -> &GlobalProperties {
            &self.0
        }
        fn costs(&self) -> Costs {
            Costs {
                network_bytes: self.1,
                sort_penalty: 0,
            }
        }
    }

    #[test]
    fn stronger_and_cheaper_candidate_prunes_weaker() {
        let cands = vec![
            C(GlobalProperties::none(), 10),
            C(GlobalProperties::hash(FieldList::single(0)), 10),
            C(GlobalProperties::hash(FieldList::single(1)), 20),
        ];
        // hash[0] implies none at equal cost; hash[1] is incomparable.
        assert_eq!(prune_dominated(&cands), vec![1, 2]);
    }

    #[test]
    fn cheaper_weak_candidate_survives() {
        let cands = vec![
            C(GlobalProperties::hash(FieldList::single(0)), 100),
            C(GlobalProperties::none(), 10),
        ];
        assert_eq!(prune_dominated(&cands), vec![0, 1]);
    }

    #[test]
    fn identical_candidates_keep_the_first() {
        let cands = vec![
            C(GlobalProperties::random(), 5),
            C(GlobalProperties::random(), 5),
            C(GlobalProperties::random(), 5),
        ];
        assert_eq!(prune_dominated(&cands), vec![0]);
    }

    #[test]
    fn ordering_strengthens_range_partitioning() {
        let f = FieldList::single(0);
        let cands = vec![
            C(GlobalProperties::range(f.clone()), 7),
            C(GlobalProperties::range(f.clone()).with_ordering(Ordering::ascending(&f)), 7),
        ];
        assert_eq!(prune_dominated(&cands), vec![1]);
    }

    #[test]
    fn bound_keeps_cheapest_in_insertion_order() {
        let cands = vec![
            C(GlobalProperties::hash(FieldList::single(0)), 30),
            C(GlobalProperties::hash(FieldList::single(1)), 10),
            C(GlobalProperties::hash(FieldList::single(2)), 20),
        ];
        assert_eq!(bound_candidates(&cands, vec![0, 1, 2], 2), vec![1, 2]);
    }

    #[test]
    fn cheapest_breaks_ties_by_position() {
        assert_eq!(cheapest([(0, 5), (1, 3), (2, 3)]), Some(1));
        assert_eq!(cheapest(std::iter::empty()), None);
    }

    #[test]
    fn broadcast_scales_with_consumer_parallelism() {
        let m = CostModel::new(1);
        assert_eq!(m.ship_cost(&ShipStrategy::Broadcast, 10, 4), 40);
        assert_eq!(m.ship_cost(&ShipStrategy::Forward, 10, 4), 0);
        assert_eq!(
            m.channel_costs(
                &ShipStrategy::PartitionHash(FieldList::single(0)),
                &LocalStrategy::Sort(Ordering::ascending(&FieldList::single(0))),
                10,
                4
            )
            .total(),
            11
        );
    }
}
