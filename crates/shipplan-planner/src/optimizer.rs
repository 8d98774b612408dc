//! Compilation driver: logical plan in, frozen `OptimizedPlan` out.

use shipplan_core::config::OptimizerConfig;
use shipplan_core::dag::LogicalPlan;
use shipplan_core::error::Result;

use crate::branches::BranchResolver;
use crate::cost::CostModel;
use crate::lower::assemble;
use crate::physical::OptimizedPlan;
use crate::propagate::{enumerate_candidates, push_requirements};
use crate::union::flatten_unions;
use crate::verify::verify_plan;

/// Stateless apart from its configuration; one optimizer can compile any
/// number of plans, from any number of threads.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    cost_model: CostModel,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        let cost_model = CostModel::from_config(&config);
        Ok(Self { config, cost_model })
    }

    /// Optimizer configured from `SHIPPLAN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OptimizerConfig::from_env())
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn compile(&self, plan: &LogicalPlan) -> Result<OptimizedPlan> {
        let order = plan.validate()?;
        let resolver = BranchResolver::build(plan);
        let flat = flatten_unions(plan, &order, &resolver, &self.config)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            logical = plan.len(),
            flat = flat.len(),
            sinks = flat.sinks().len(),
            "flattened plan"
        );

        let requirements = push_requirements(&flat);
        let arena = enumerate_candidates(&flat, &requirements, &self.cost_model, &self.config)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(candidates = arena.len(), "enumerated candidates");

        let optimized = assemble(&flat, &arena)?;
        verify_plan(&optimized)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = optimized.nodes().len(),
            cost = optimized.total_costs().total(),
            "compiled plan"
        );
        Ok(optimized)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        let config = OptimizerConfig::default();
        let cost_model = CostModel::from_config(&config);
        Self { config, cost_model }
    }
}

/// Compile with the default configuration.
pub fn compile(plan: &LogicalPlan) -> Result<OptimizedPlan> {
    Optimizer::default().compile(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipplan_core::dag::LogicalPlanBuilder;
    use shipplan_core::error::Error;
    use shipplan_core::fields::FieldList;

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = OptimizerConfig {
            max_candidates_per_node: 0,
            ..OptimizerConfig::default()
        };
        assert!(matches!(Optimizer::new(cfg), Err(Error::Config(_))));
    }

    #[test]
    fn source_to_sink_is_forwarded() {
        let mut b = LogicalPlanBuilder::new();
        let s = b.source("s");
        b.sink("k", s);
        let plan = compile(&b.build()).unwrap();
        assert_eq!(plan.nodes().len(), 2);
        assert_eq!(plan.channels().len(), 1);
        assert_eq!(
            plan.channels()[0].ship_strategy,
            crate::physical::ShipStrategy::Forward
        );
    }

    #[test]
    fn compiling_twice_gives_identical_plans() {
        let mut b = LogicalPlanBuilder::new();
        let s1 = b.source("s1");
        let s2 = b.source("s2");
        let u = b.union("u", s1, s2);
        let g = b.group_reduce("g", u, FieldList::single(0));
        b.sink("k", g);
        let logical = b.build();
        let opt = Optimizer::default();
        let a = opt.compile(&logical).unwrap();
        let b = opt.compile(&logical).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }
}
