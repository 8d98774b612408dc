//! Strongly-typed identifiers used across the optimizer.
//!
//! Every graph in shipplan is an arena indexed by one of these ids. Downstream
//! code should *not* pass raw integers around.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
            /// Position of the id inside its owning arena.
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(idx: usize) -> Self {
                Self(idx as u64)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

// Logical DAG nodes (input to the optimizer).
new_id!(NodeId);
// Nodes of the union-free flattened plan.
new_id!(FlatNodeId);
// Entries in the candidate arena.
new_id!(CandidateId);
// Nodes and channels of the frozen optimized plan.
new_id!(PlanNodeId);
new_id!(ChannelId);
