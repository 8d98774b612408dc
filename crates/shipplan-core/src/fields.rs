//! Field-index collections used by partitioning, ordering and key declarations.
//!
//! `FieldList` is ordered: `[0, 1]` and `[1, 0]` are different partitionings.
//! `FieldSet` is unordered and only answers membership questions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ordered, immutable sequence of field indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldList(Vec<usize>);

impl FieldList {
    pub fn new(fields: impl IntoIterator<Item = usize>) -> Self {
        Self(fields.into_iter().collect())
    }

    pub fn single(field: usize) -> Self {
        Self(vec![field])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<usize> {
        self.0.get(pos).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Same fields in the same order. No subset or superset is accepted.
    pub fn is_exact_match(&self, other: &FieldList) -> bool {
        self.0 == other.0
    }

    /// True if `self` starts with all of `prefix`, in order.
    pub fn starts_with(&self, prefix: &FieldList) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn to_set(&self) -> FieldSet {
        FieldSet::new(self.iter())
    }
}

impl From<Vec<usize>> for FieldList {
    fn from(v: Vec<usize>) -> Self {
        Self(v)
    }
}

impl fmt::Display for FieldList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, "]")
    }
}

/// Unordered set of field indices (forwarded fields, key membership).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet(BTreeSet<usize>);

impl FieldSet {
    pub fn new(fields: impl IntoIterator<Item = usize>) -> Self {
        Self(fields.into_iter().collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: usize) -> bool {
        self.0.contains(&field)
    }

    /// Every field of `fields` is in this set.
    pub fn contains_all(&self, fields: &FieldList) -> bool {
        fields.iter().all(|f| self.contains(f))
    }

    pub fn is_subset_of(&self, other: &FieldSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_order_sensitive() {
        let a = FieldList::new([0, 1]);
        assert!(a.is_exact_match(&FieldList::new([0, 1])));
        assert!(!a.is_exact_match(&FieldList::new([1, 0])));
        assert!(!a.is_exact_match(&FieldList::single(0)));
        assert!(!FieldList::single(0).is_exact_match(&a));
    }

    #[test]
    fn field_set_ignores_order() {
        let set = FieldSet::new([2, 0, 1]);
        assert_eq!(set, FieldSet::new([0, 1, 2]));
        assert!(set.contains_all(&FieldList::new([1, 0])));
        assert!(!set.contains_all(&FieldList::new([1, 3])));
        assert!(FieldSet::new([1]).is_subset_of(&set));
    }

    #[test]
    fn display_formats() {
        assert_eq!(FieldList::new([3, 1]).to_string(), "[3, 1]");
        assert_eq!(FieldSet::new([3, 1]).to_string(), "{1, 3}");
    }
}
