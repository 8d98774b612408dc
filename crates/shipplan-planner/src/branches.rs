//! Branch / DAG-sharing resolution.
//!
//! A node consumed by more than one operator is a *branch point*. The resolver
//! builds the consumer index once per compilation; later passes look sharing
//! up by id. It never mutates the plan.

use shipplan_core::dag::LogicalPlan;
use shipplan_core::id::NodeId;
use shipplan_core::properties::RequestedGlobalProperties;

/// One use of a node: `consumer` reads it through input `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerEdge {
    pub consumer: NodeId,
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct BranchResolver {
    consumers: Vec<Vec<ConsumerEdge>>,
    live: Vec<bool>,
}

impl BranchResolver {
    /// Index consumers of every node. Only live nodes (those that reach a
    /// sink) count as consumers; dead branches are invisible to later passes.
    pub fn build(plan: &LogicalPlan) -> Self {
        let n = plan.len();
        let mut live = vec![false; n];
        let mut stack: Vec<NodeId> = plan.sinks().map(|s| s.id).collect();
        while let Some(id) = stack.pop() {
            if live[id.index()] {
                continue;
            }
            live[id.index()] = true;
            if let Some(node) = plan.node(id) {
                stack.extend(node.inputs.iter().filter(|i| !live[i.index()]));
            }
        }

        let mut consumers: Vec<Vec<ConsumerEdge>> = vec![Vec::new(); n];
        for node in plan.nodes().iter().filter(|n| live[n.id.index()]) {
            for (slot, input) in node.inputs.iter().enumerate() {
                consumers[input.index()].push(ConsumerEdge {
                    consumer: node.id,
                    slot,
                });
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = n,
            live = live.iter().filter(|l| **l).count(),
            branch_points = consumers.iter().filter(|c| c.len() > 1).count(),
            "built branch resolver"
        );

        Self { consumers, live }
    }

    pub fn consumers(&self, id: NodeId) -> &[ConsumerEdge] {
        self.consumers
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn consumer_count(&self, id: NodeId) -> usize {
        self.consumers(id).len()
    }

    pub fn is_branch_point(&self, id: NodeId) -> bool {
        self.consumer_count(id) > 1
    }

    pub fn branch_points(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.consumers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.len() > 1)
            .map(|(i, _)| NodeId::from(i))
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.live.get(id.index()).copied().unwrap_or(false)
    }
}

/// Distinct requested properties under which candidates of one node are
/// computed. Identical requests collapse into one entry (and later share one
/// memoized candidate); distinct requests stay separate, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct BranchDescriptor {
    requests: Vec<RequestedGlobalProperties>,
}

impl BranchDescriptor {
    /// Returns true if the request was not known before.
    pub fn register(&mut self, request: RequestedGlobalProperties) -> bool {
        if self.requests.contains(&request) {
            return false;
        }
        self.requests.push(request);
        true
    }

    pub fn requests(&self) -> &[RequestedGlobalProperties] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
