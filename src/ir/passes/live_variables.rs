use crate::ir::dataflow::liveness;
use crate::ir::passes::{
    AnalysisData, CompilerPass, DependencyKind, PassCache, PassError, PassId, PassOutcome,
};
use crate::ir::{IrUnit, ScopeIndex};

/// Runs live-variable analysis over a scope and leaves the result in the
/// cache for retrieval by consuming transforms. Never mutates the IR.
pub struct LiveVariableAnalysis;

impl CompilerPass for LiveVariableAnalysis {
    fn id(&self) -> PassId {
        PassId::LiveVariableAnalysis
    }

    fn dependencies(&self) -> &'static [(PassId, DependencyKind)] {
        &[]
    }

    fn run(
        &self,
        unit: &mut IrUnit,
        scope: ScopeIndex,
        _cache: &PassCache,
    ) -> Result<PassOutcome, PassError> {
        let result = liveness::mark_dead_instructions(unit, scope);
        Ok(PassOutcome {
            changed: false,
            data: Some(AnalysisData::Liveness(result)),
        })
    }
}
