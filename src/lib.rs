//! Crate root: public surface, shared error type, and crate-wide invariants.
//!
//! This module is the single canonical entry-point for downstream users of
//! the library. It centralizes the handle newtypes, the unified error
//! enum, and re-exports the submodules that implement the clearinghouse:
//! a compatibility model, a population sampler, a cycle/chain graph
//! builder, a vertex-disjoint matching engine, a discrete-event scheduler,
//! and a statistics aggregator.
//!
//! ## Invariants
//!
//! - **Determinism.** A `Simulation` owns exactly one PRNG, seeded
//!   explicitly at construction. Given the same seed and config, a run
//!   produces bit-identical arrivals, departures, matches and statistics.
//!   Iteration over pools is always in handle order.
//! - **Handles, not objects.** Pairs and altruistic donors are referred to
//!   by stable integer handles (`PairId` / `AltruistId`) allocated at
//!   arrival. Attributes live in arenas indexed by handle; pools are sets
//!   of handles. This sidesteps object-identity hashing pitfalls and makes
//!   the event loop's bookkeeping trivial to reason about.
//! - **Matches are final.** The matching engine never revisits a past
//!   decision; a matched vertex leaves its pool and never re-enters.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

/// ABO blood-type rules and virtual-PRA compatibility checks.
pub mod compatibility;
/// Run configuration, validation, and TOML loading.
pub mod config;
/// Compatibility digraph construction and cycle/chain enumeration.
pub mod graph;
/// Vertex-disjoint cycle/chain packing over an enumerated graph.
pub mod matching;
/// Patient/Pair/AltruisticDonor data model and the NKR population sampler.
pub mod population;
/// Discrete-event scheduler: arrival/departure streams and the main loop.
pub mod scheduler;
/// 0/1 binary packing solver interface and the bundled exact implementation.
pub mod solver;
/// Run statistics: throughput, wait times, and fairness slices.
pub mod stats;

pub use compatibility::BloodType;
pub use config::SimConfig;
pub use population::{AltruistId, AltruisticDonor, Pair, PairId};
pub use scheduler::{RunOutcome, Simulation};
pub use stats::RunStatistics;

/// Errors surfaced by the clearinghouse core.
///
/// Each variant corresponds to one of the named failure modes of the
/// system: a malformed population distribution, a solver that cannot
/// produce an optimal assignment, a broken matching-engine post-condition,
/// or an invalid run configuration.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The NKR pool-composition table failed to normalise (marginals don't
    /// sum to 1, a required ABO combination is missing, or a PRA row's
    /// conditional distribution is malformed).
    #[error("malformed population distribution: {0}")]
    MalformedDistribution(String),

    /// The binary packing solver reported infeasible, unbounded, or timed
    /// out against its wall-clock cap.
    #[error("solver failed: {0}")]
    SolverFailure(#[from] crate::solver::SolverError),

    /// A post-condition of the matching engine was violated (a vertex
    /// returned twice, or a vertex absent from the input pool). Fatal:
    /// the run that produced it is aborted.
    #[error("matching engine invariant violated: {0}")]
    InvariantViolation(String),

    /// The run configuration is invalid (negative rate, non-positive
    /// `time_limit`, `batch_size < 1`, or `max_chain_length < 1`).
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}
