/*!
Configuration of a grounder.

All configuration for a grounder is contained within [Config]; the
grounder takes its copy at construction and reads it for the rest of
its life.
*/

/// The primary configuration structure.
#[derive(Clone, Debug)]
pub struct Config {
    /// Announce an incremental (multi-step) program to the emitter.
    pub incremental: bool,

    /// Emit facts as rules with empty bodies.
    ///
    /// With this off, facts live only in the domains; bodies still
    /// drop fact literals either way.
    pub keep_facts: bool,

    /// Raise the atom-undefined info diagnostics after dependency
    /// analysis.
    pub check_undefined: bool,
}

impl Default for Config {
    /// The default grounder emits facts, reports undefined atoms, and
    /// treats the program as single-step.
    fn default() -> Self {
        Config {
            incremental: false,
            keep_facts: true,
            check_undefined: true,
        }
    }
}
