use tracing::debug;

use crate::ir::passes::{
    CompilerPass, DependencyKind, PassCache, PassError, PassId, PassOutcome,
};
use crate::ir::{IrUnit, ScopeIndex};

/// Deletes instructions whose results are never observed, as marked by
/// live-variable analysis. Keeps the relative order of everything that
/// survives, then repeats over nested closures. Running it twice with no
/// intervening IR change is a no-op the second time.
pub struct DeadCodeElimination;

impl CompilerPass for DeadCodeElimination {
    fn id(&self) -> PassId {
        PassId::DeadCodeElimination
    }

    fn dependencies(&self) -> &'static [(PassId, DependencyKind)] {
        &[(PassId::LiveVariableAnalysis, DependencyKind::Retrieve)]
    }

    fn applies_to_children(&self) -> bool {
        true
    }

    fn run(
        &self,
        unit: &mut IrUnit,
        scope: ScopeIndex,
        cache: &PassCache,
    ) -> Result<PassOutcome, PassError> {
        let dead = {
            let scope_ref = &unit.scopes[scope];
            let liveness =
                cache
                    .liveness(scope_ref, scope)
                    .ok_or(PassError::MissingDependency {
                        pass: PassId::DeadCodeElimination,
                        dependency: PassId::LiveVariableAnalysis,
                    })?;
            debug_assert_eq!(liveness.dead.len(), scope_ref.instructions().len());
            liveness.dead.clone()
        };

        if !dead.iter().any(|d| *d) {
            return Ok(PassOutcome::unchanged());
        }

        let removed = dead.iter().filter(|d| **d).count();
        unit.scopes[scope].retain_instructions(|i, _| !dead[i]);
        debug!(
            "dead code elimination removed {removed} instruction(s) from {}",
            unit.scopes[scope].name
        );

        Ok(PassOutcome {
            changed: true,
            data: None,
        })
    }
}
