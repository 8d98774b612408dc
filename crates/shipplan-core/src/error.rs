use thiserror::Error;

/// Canonical result for core and planner.
pub type Result<T> = std::result::Result<T, Error>;

/// Every compilation failure aborts the whole plan; the offending logical node
/// is named by its label so callers can point at it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported plan shape at '{node}': {reason}")]
    UnsupportedPlanShape { node: String, reason: String },

    #[error("logical plan contains a cycle through '{node}'")]
    CyclicPlan { node: String },

    #[error("no shipping strategy satisfies {requested} at '{node}'")]
    UnsatisfiableRequirement { node: String, requested: String },

    #[error("internal invariant failed at '{node}': {reason}")]
    Invariant { node: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("plan lookup failed: {0}")]
    Lookup(String),

    #[error("hashing error: {0}")]
    Hash(String),
}

impl Error {
    pub fn unsupported(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::UnsupportedPlanShape {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Invariant {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
