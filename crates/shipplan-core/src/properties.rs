//! Global (cross-partition) data properties.
//!
//! `GlobalProperties` describes what a plan node actually produces;
//! `RequestedGlobalProperties` describes what a consumer needs from one input.
//! Both share the same shape. Partitioning comparison is a strict,
//! order-sensitive exact match on the field sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fields::FieldList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: usize,
    pub direction: Direction,
}

/// Field order plus direction for each field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ordering(Vec<SortKey>);

impl Ordering {
    pub fn new(keys: impl IntoIterator<Item = SortKey>) -> Self {
        Self(keys.into_iter().collect())
    }

    /// All fields ascending, in the given order.
    pub fn ascending(fields: &FieldList) -> Self {
        Self(
            fields
                .iter()
                .map(|field| SortKey {
                    field,
                    direction: Direction::Ascending,
                })
                .collect(),
        )
    }

    pub fn append(mut self, field: usize, direction: Direction) -> Self {
        self.0.push(SortKey { field, direction });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn fields(&self) -> FieldList {
        FieldList::new(self.0.iter().map(|k| k.field))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `required` is a prefix of this ordering (same fields, same directions).
    pub fn satisfies(&self, required: &Ordering) -> bool {
        self.0.starts_with(&required.0)
    }

    /// Data ordered like this is grouped on `fields` (in any order of the
    /// leading keys).
    pub fn groups_fields(&self, fields: &FieldList) -> bool {
        if fields.len() > self.0.len() {
            return false;
        }
        let leading = FieldList::new(self.0[..fields.len()].iter().map(|k| k.field));
        leading.to_set() == fields.to_set()
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let dir = match key.direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            write!(f, "{} {dir}", key.field)?;
        }
        Ok(())
    }
}

/// How records are spread over the parallel instances of an operator.
///
/// Partitioning fields live inside `Hash`/`Range`, so a kind without fields
/// can never carry any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partitioning {
    /// Unknown distribution (available) / no requirement (requested).
    #[default]
    None,
    Hash(FieldList),
    Range(FieldList),
    /// Records spread without key affinity.
    Random,
    /// Every parallel instance holds the complete data set.
    FullReplication,
    /// Any distribution at all, replicated data included.
    AnyDistribution,
}

impl Partitioning {
    pub fn fields(&self) -> Option<&FieldList> {
        match self {
            Partitioning::Hash(f) | Partitioning::Range(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_key_partitioned(&self) -> bool {
        self.fields().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Partitioning::None => "none",
            Partitioning::Hash(_) => "hash",
            Partitioning::Range(_) => "range",
            Partitioning::Random => "random",
            Partitioning::FullReplication => "full-replication",
            Partitioning::AnyDistribution => "any-distribution",
        }
    }
}

impl fmt::Display for Partitioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fields() {
            Some(fields) => write!(f, "{}{}", self.name(), fields),
            None => f.write_str(self.name()),
        }
    }
}

/// Actual output distribution of a plan node or of the data on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalProperties {
    pub partitioning: Partitioning,
    pub ordering: Option<Ordering>,
}

impl GlobalProperties {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn hash(fields: FieldList) -> Self {
        Self {
            partitioning: Partitioning::Hash(fields),
            ordering: None,
        }
    }

    pub fn range(fields: FieldList) -> Self {
        Self {
            partitioning: Partitioning::Range(fields),
            ordering: None,
        }
    }

    pub fn random() -> Self {
        Self {
            partitioning: Partitioning::Random,
            ordering: None,
        }
    }

    pub fn full_replication() -> Self {
        Self {
            partitioning: Partitioning::FullReplication,
            ordering: None,
        }
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn without_ordering(mut self) -> Self {
        self.ordering = None;
        self
    }

    pub fn partitioning_fields(&self) -> Option<&FieldList> {
        self.partitioning.fields()
    }

    pub fn is_fully_replicated(&self) -> bool {
        self.partitioning == Partitioning::FullReplication
    }

    /// True if `self` is at least as strong as `weaker`: every request that
    /// `weaker` meets is met by `self` too. Used for dominance pruning.
    pub fn implies(&self, weaker: &GlobalProperties) -> bool {
        if self == weaker {
            return true;
        }
        let partitioning_ok = match (&self.partitioning, &weaker.partitioning) {
            (Partitioning::FullReplication, _) | (_, Partitioning::FullReplication) => {
                self.partitioning == weaker.partitioning
            }
            (_, Partitioning::None | Partitioning::AnyDistribution) => true,
            (mine, theirs) => mine == theirs,
        };
        let ordering_ok = match (&self.ordering, &weaker.ordering) {
            (_, None) => true,
            (Some(mine), Some(theirs)) => mine.satisfies(theirs),
            (None, Some(_)) => false,
        };
        partitioning_ok && ordering_ok
    }
}

impl fmt::Display for GlobalProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.partitioning)?;
        if let Some(o) = &self.ordering {
            write!(f, " ordered by ({o})")?;
        }
        Ok(())
    }
}

/// What a consumer requires from one of its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestedGlobalProperties {
    pub partitioning: Partitioning,
    pub ordering: Option<Ordering>,
}

impl RequestedGlobalProperties {
    /// No requirement beyond "not fully replicated".
    pub fn trivial() -> Self {
        Self::default()
    }

    pub fn any_distribution() -> Self {
        Self {
            partitioning: Partitioning::AnyDistribution,
            ordering: None,
        }
    }

    pub fn hash(fields: FieldList) -> Self {
        Self {
            partitioning: Partitioning::Hash(fields),
            ordering: None,
        }
    }

    pub fn range(fields: FieldList) -> Self {
        Self {
            partitioning: Partitioning::Range(fields),
            ordering: None,
        }
    }

    pub fn random() -> Self {
        Self {
            partitioning: Partitioning::Random,
            ordering: None,
        }
    }

    pub fn full_replication() -> Self {
        Self {
            partitioning: Partitioning::FullReplication,
            ordering: None,
        }
    }

    /// Range partitioning on the ordering's fields plus the ordering itself.
    pub fn total_order(ordering: Ordering) -> Self {
        Self {
            partitioning: Partitioning::Range(ordering.fields()),
            ordering: Some(ordering),
        }
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn without_ordering(mut self) -> Self {
        self.ordering = None;
        self
    }

    pub fn is_trivial(&self) -> bool {
        self.partitioning == Partitioning::None && self.ordering.is_none()
    }

    /// Orderings can only be produced on top of a range partitioning whose
    /// fields lead the ordering.
    pub fn is_satisfiable(&self) -> bool {
        match (&self.partitioning, &self.ordering) {
            (_, None) => true,
            (Partitioning::Range(fields), Some(o)) => o.fields().starts_with(fields),
            _ => false,
        }
    }

    /// Exact-match test on the partitioning part only.
    pub fn partitioning_met_by(&self, available: &GlobalProperties) -> bool {
        match (&self.partitioning, &available.partitioning) {
            (Partitioning::None, theirs) => *theirs != Partitioning::FullReplication,
            (Partitioning::AnyDistribution, _) => true,
            (Partitioning::Hash(mine), Partitioning::Hash(theirs))
            | (Partitioning::Range(mine), Partitioning::Range(theirs)) => {
                mine.is_exact_match(theirs)
            }
            (Partitioning::Random, Partitioning::Random) => true,
            (Partitioning::FullReplication, Partitioning::FullReplication) => true,
            _ => false,
        }
    }

    pub fn ordering_met_by(&self, available: &GlobalProperties) -> bool {
        match (&self.ordering, &available.ordering) {
            (None, _) => true,
            (Some(mine), Some(theirs)) => theirs.satisfies(mine),
            (Some(_), None) => false,
        }
    }

    pub fn is_met_by(&self, available: &GlobalProperties) -> bool {
        self.partitioning_met_by(available) && self.ordering_met_by(available)
    }
}

impl fmt::Display for RequestedGlobalProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.partitioning)?;
        if let Some(o) = &self.ordering {
            write!(f, " ordered by ({o})")?;
        }
        Ok(())
    }
}
