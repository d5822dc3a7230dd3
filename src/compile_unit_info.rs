/// This struct holds the information needed to prepare one compilation unit
/// for execution, like the optimization level and debugging toggles.
#[derive(Debug, Clone)]
pub struct CompileUnitInfo {
    /// The optimization level to use with this compilation unit.
    pub optlevel: OptLevel,
    /// Whether to log the textual IR after the pass pipeline has run.
    pub dump_ir: bool,
}

impl Default for CompileUnitInfo {
    fn default() -> Self {
        Self {
            optlevel: OptLevel::Default,
            dump_ir: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptLevel {
    None,       // -O0
    Less,       // -O1
    Default,    // -O2
    Aggressive, // -O3
}
