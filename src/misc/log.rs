/*!
Miscellaneous items related to [logging](log).

Calls to the log macro are made throughout the library.
No log implementation is provided; see [log] for how to install one.

Targets are defined per subsystem so output can be narrowed, e.g. with
[env_logger](https://docs.rs/env_logger/latest/env_logger/):
`RUST_LOG=instantiate …` for the semi-naive loop alone, or
`RUST_LOG=defines=debug …` for constant substitution.
*/

/// Targets to be used within a [log]! macro.
pub mod targets {
    /// Logs related to the rewriting pipeline.
    pub const REWRITE: &str = "rewrite";

    /// Logs related to `#const` definitions.
    pub const DEFINES: &str = "defines";

    /// Logs related to the dependency analysis.
    pub const DEPENDENCY: &str = "dependency";

    /// Logs related to the safety check.
    pub const SAFETY: &str = "safety";

    /// Logs related to predicate domains.
    pub const DOMAIN: &str = "domain";

    /// Logs related to the semi-naive instantiation loop.
    pub const INSTANTIATE: &str = "instantiate";

    /// Logs related to aggregate accumulation.
    pub const AGGREGATE: &str = "aggregate";
}
