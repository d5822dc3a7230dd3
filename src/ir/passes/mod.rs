use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::compile_unit_info::{CompileUnitInfo, OptLevel};
use crate::ir::dataflow::liveness::LivenessResult;
use crate::ir::{printer, IrUnit, Scope, ScopeIndex};

pub mod dead_code;
pub mod live_variables;

pub use dead_code::DeadCodeElimination;
pub use live_variables::LiveVariableAnalysis;

/// Identities of the registered compiler passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    LiveVariableAnalysis,
    DeadCodeElimination,
}

/// How a pass consumes one of its declared prerequisites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Always (re)run the prerequisite and discard its result.
    Compute,
    /// Reuse the prerequisite's cached result, running it only when the
    /// result is missing or stale.
    Retrieve,
}

/// Analysis data a pass leaves behind for `Retrieve` dependents.
#[derive(Debug, Clone)]
pub enum AnalysisData {
    Liveness(LivenessResult),
}

/// What one pass execution reports back to the framework.
#[derive(Debug)]
pub struct PassOutcome {
    /// The pass mutated the scope's instruction list.
    pub changed: bool,
    /// Result to cache for dependents, if this pass is an analysis.
    pub data: Option<AnalysisData>,
}

impl PassOutcome {
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            data: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PassError {
    #[error("pass {pass:?} requires {dependency:?}, which produced no result")]
    MissingDependency { pass: PassId, dependency: PassId },
    #[error("pass {pass:?} failed: {message}")]
    Failed { pass: PassId, message: String },
}

/// A compiler pass: a stateless descriptor of one analysis or transform.
/// Per-run state lives in the framework, never in the pass itself.
pub trait CompilerPass {
    fn id(&self) -> PassId;

    /// Prerequisites, resolved in declaration order before the pass runs.
    fn dependencies(&self) -> &'static [(PassId, DependencyKind)];

    /// Whether the framework re-runs this pass over nested scopes after
    /// the parent scope, in pre-order.
    fn applies_to_children(&self) -> bool {
        false
    }

    fn run(
        &self,
        unit: &mut IrUnit,
        scope: ScopeIndex,
        cache: &PassCache,
    ) -> Result<PassOutcome, PassError>;
}

/// The static pass registry.
fn descriptor(id: PassId) -> &'static dyn CompilerPass {
    match id {
        PassId::LiveVariableAnalysis => &LiveVariableAnalysis,
        PassId::DeadCodeElimination => &DeadCodeElimination,
    }
}

/// Cached analysis results, keyed per scope and tagged with the scope
/// version they were computed against. An entry whose version disagrees
/// with the scope's current one is stale and never served; the framework
/// recomputes it on demand instead.
#[derive(Debug, Default)]
pub struct PassCache {
    entries: HashMap<(ScopeIndex, PassId), (u64, AnalysisData)>,
}

impl PassCache {
    pub fn lookup(&self, scope_ref: &Scope, scope: ScopeIndex, pass: PassId) -> Option<&AnalysisData> {
        match self.entries.get(&(scope, pass)) {
            Some((version, data)) if *version == scope_ref.version() => Some(data),
            _ => None,
        }
    }

    /// The cached liveness result for `scope`, if fresh.
    pub fn liveness(&self, scope_ref: &Scope, scope: ScopeIndex) -> Option<&LivenessResult> {
        match self.lookup(scope_ref, scope, PassId::LiveVariableAnalysis) {
            Some(AnalysisData::Liveness(result)) => Some(result),
            None => None,
        }
    }

    fn store(&mut self, scope_ref: &Scope, scope: ScopeIndex, pass: PassId, data: AnalysisData) {
        self.entries
            .insert((scope, pass), (scope_ref.version(), data));
    }

    /// Drop entries invalidated by mutations of `scope`.
    fn evict_stale(&mut self, scope_ref: &Scope, scope: ScopeIndex) {
        let current = scope_ref.version();
        self.entries
            .retain(|(s, _), (version, _)| *s != scope || *version == current);
    }
}

/// Progress of a schedule through the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleState {
    #[default]
    Unscheduled,
    /// Dependencies resolved and the run order fixed.
    Scheduled,
    /// The named pass is executing on the parent scope.
    Running(PassId),
    /// The named pass is being re-applied to nested scopes.
    AppliedToChildren(PassId),
    Done,
}

/// Schedules and executes compiler passes over scopes, resolving each
/// pass's declared prerequisites first and caching analysis results per
/// scope. Results are never shared across scopes, sibling closures
/// included.
#[derive(Debug, Default)]
pub struct PassManager {
    cache: PassCache,
    executed: Vec<(ScopeIndex, PassId)>,
    state: ScheduleState,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pass execution so far, in order.
    pub fn executed(&self) -> &[(ScopeIndex, PassId)] {
        &self.executed
    }

    pub fn executions_of(&self, pass: PassId) -> usize {
        self.executed.iter().filter(|(_, id)| *id == pass).count()
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn cache(&self) -> &PassCache {
        &self.cache
    }

    /// Run one pass (and whatever its dependencies require) over `scope`.
    /// Host-facing entry point.
    pub fn run_pass(
        &mut self,
        unit: &mut IrUnit,
        scope: ScopeIndex,
        id: PassId,
    ) -> Result<(), PassError> {
        for (dependency, kind) in descriptor(id).dependencies() {
            match kind {
                DependencyKind::Retrieve => {
                    let fresh = self
                        .cache
                        .lookup(&unit.scopes[scope], scope, *dependency)
                        .is_some();
                    if !fresh {
                        self.run_pass(unit, scope, *dependency)?;
                    }
                }
                DependencyKind::Compute => self.run_pass(unit, scope, *dependency)?,
            }
        }
        self.execute(unit, scope, id)
    }

    fn execute(
        &mut self,
        unit: &mut IrUnit,
        scope: ScopeIndex,
        id: PassId,
    ) -> Result<(), PassError> {
        let pass = descriptor(id);
        debug!("running pass {:?} on scope {}", id, unit.scopes[scope].name);

        self.state = ScheduleState::Running(id);
        let outcome = pass.run(unit, scope, &self.cache)?;
        self.executed.push((scope, id));

        if outcome.changed {
            self.cache.evict_stale(&unit.scopes[scope], scope);
        }
        if let Some(data) = outcome.data {
            self.cache.store(&unit.scopes[scope], scope, id, data);
        }

        if pass.applies_to_children() {
            self.state = ScheduleState::AppliedToChildren(id);
            let children = unit.scopes[scope].children.clone();
            for child in children {
                self.run_pass(unit, child, id)?;
            }
        }

        Ok(())
    }

    /// Schedule `requested` (dependencies hoisted ahead of dependents) and
    /// run the result over `scope`. A failing pass aborts the remainder of
    /// the schedule for this scope; sibling scopes are unaffected.
    pub fn run_schedule(
        &mut self,
        unit: &mut IrUnit,
        scope: ScopeIndex,
        requested: &[PassId],
    ) -> Result<(), PassError> {
        self.state = ScheduleState::Unscheduled;
        let schedule = schedule_passes(requested);
        self.state = ScheduleState::Scheduled;
        for id in schedule {
            self.run_pass(unit, scope, id)?;
        }
        self.state = ScheduleState::Done;
        Ok(())
    }
}

/// Topologically order `requested`: each pass's dependencies come ahead
/// of it, in declaration order. Dependencies are inserted once; passes
/// requested explicitly keep every occurrence.
pub fn schedule_passes(requested: &[PassId]) -> Vec<PassId> {
    fn hoist(id: PassId, schedule: &mut Vec<PassId>) {
        for (dependency, _) in descriptor(id).dependencies() {
            if !schedule.contains(dependency) {
                hoist(*dependency, schedule);
                schedule.push(*dependency);
            }
        }
    }

    let mut schedule = Vec::new();
    for &id in requested {
        hoist(id, &mut schedule);
        schedule.push(id);
    }
    schedule
}

/// The pass pipeline run by default at each optimization level.
pub fn passes_for(level: OptLevel) -> &'static [PassId] {
    match level {
        OptLevel::None => &[],
        OptLevel::Less | OptLevel::Default | OptLevel::Aggressive => {
            &[PassId::DeadCodeElimination]
        }
    }
}

/// Run the default pipeline for `info` over `scope` and its nested
/// scopes. The original instruction lists stay usable if a pass fails:
/// every edit a pass makes is instruction-local and validated.
pub fn optimize(
    unit: &mut IrUnit,
    scope: ScopeIndex,
    info: &CompileUnitInfo,
) -> Result<(), PassError> {
    let mut manager = PassManager::new();
    manager.run_schedule(unit, scope, passes_for(info.optlevel))?;
    if info.dump_ir {
        debug!("optimized IR:\n{}", printer::dump_scope(unit, scope));
    }
    Ok(())
}
