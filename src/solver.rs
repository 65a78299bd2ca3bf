//! 0/1 binary packing solver interface and the bundled exact implementation.
//!
//! The clearinghouse's matching formulation is, at its core, an external
//! black box: `MaximizeBinaryPacking(vars, weights, constraints)`. The
//! [`BinaryPackingSolver`] trait pins down that interface; anything
//! implementing it — a call into a real MILP package, a thin wrapper over a
//! solver service — can be dropped in behind [`crate::matching`] without
//! touching the graph/enumeration code. [`ExactBranchAndBoundSolver`] is the
//! in-crate default: a deterministic branch-and-bound exact solver, sized
//! for the handful-of-hundred-variable instances one matching epoch
//! produces.

use std::time::{Duration, Instant};

/// Errors the solver can surface. `SimError::SolverFailure` wraps this.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// The constraint system has no feasible 0/1 assignment. Cannot occur
    /// for the all-singleton "at most one" constraints this crate builds
    /// (the all-zero assignment is always feasible), but is detected and
    /// reported rather than assumed away.
    #[error("packing problem is infeasible")]
    Infeasible,

    /// The solver exceeded its configured wall-clock budget before proving
    /// optimality.
    #[error("solver exceeded its time budget of {0:?}")]
    TimedOut(Duration),
}

/// A 0/1 maximisation over a binary packing problem: choose a subset of
/// `vars` variables maximising `Σ weights[i] * x_i` subject to, for every
/// constraint in `constraints`, `Σ_{i in constraint} x_i <= 1`.
pub trait BinaryPackingSolver {
    /// Solve for an optimal 0/1 assignment. `weights.len() == vars` and each
    /// constraint is a list of variable indices `< vars`.
    fn solve(
        &self,
        vars: usize,
        weights: &[f64],
        constraints: &[Vec<usize>],
    ) -> Result<Vec<bool>, SolverError>;
}

/// Deterministic branch-and-bound exact solver for the small "at most one
/// per group" packing instances a matching epoch produces.
///
/// Branches on variables in index order, using the sum of remaining
/// positive weights as an upper-bound relaxation to prune. Exact, so it
/// always returns the true optimum (ties are broken by whichever branch the
/// traversal order visits first — see the "replacing the solver" testable
/// property, which only requires matching *objective value*, not which tie
/// is picked).
pub struct ExactBranchAndBoundSolver {
    time_cap: Option<Duration>,
}

impl ExactBranchAndBoundSolver {
    /// A solver with no wall-clock cap.
    pub fn new() -> Self {
        ExactBranchAndBoundSolver { time_cap: None }
    }

    /// A solver that fails with `SolverError::TimedOut` if it hasn't proven
    /// optimality within `cap`.
    pub fn with_time_cap(cap: Duration) -> Self {
        ExactBranchAndBoundSolver {
            time_cap: Some(cap),
        }
    }
}

impl Default for ExactBranchAndBoundSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryPackingSolver for ExactBranchAndBoundSolver {
    fn solve(
        &self,
        vars: usize,
        weights: &[f64],
        constraints: &[Vec<usize>],
    ) -> Result<Vec<bool>, SolverError> {
        assert_eq!(weights.len(), vars, "weights must have one entry per variable");

        if vars == 0 {
            return Ok(Vec::new());
        }

        // For each variable, the constraints (groups) it belongs to.
        let mut groups_of_var: Vec<Vec<usize>> = vec![Vec::new(); vars];
        for (g, members) in constraints.iter().enumerate() {
            for &v in members {
                groups_of_var[v].push(g);
            }
        }

        let start = Instant::now();
        let mut best_value = 0.0_f64;
        let mut best_assignment = vec![false; vars];
        let mut current = vec![false; vars];
        let mut used_groups = vec![false; constraints.len()];

        // Suffix sum of positive weights, for the upper-bound relaxation:
        // from index i onward, the best any completion could possibly add.
        let mut suffix_positive = vec![0.0_f64; vars + 1];
        for i in (0..vars).rev() {
            suffix_positive[i] = suffix_positive[i + 1] + weights[i].max(0.0);
        }

        branch(
            0,
            0.0,
            vars,
            weights,
            &groups_of_var,
            &mut used_groups,
            &mut current,
            &mut best_value,
            &mut best_assignment,
            &suffix_positive,
            self.time_cap,
            &start,
        )?;

        Ok(best_assignment)
    }
}

#[allow(clippy::too_many_arguments)]
fn branch(
    i: usize,
    value_so_far: f64,
    vars: usize,
    weights: &[f64],
    groups_of_var: &[Vec<usize>],
    used_groups: &mut [bool],
    current: &mut [bool],
    best_value: &mut f64,
    best_assignment: &mut [bool],
    suffix_positive: &[f64],
    time_cap: Option<Duration>,
    start: &Instant,
) -> Result<(), SolverError> {
    if let Some(cap) = time_cap {
        if start.elapsed() > cap {
            return Err(SolverError::TimedOut(cap));
        }
    }

    if i == vars {
        if value_so_far > *best_value {
            *best_value = value_so_far;
            best_assignment.copy_from_slice(current);
        }
        return Ok(());
    }

    // Upper bound: value so far plus the best any remaining positive-weight
    // variable could add. Prune if it can't beat the incumbent.
    if value_so_far + suffix_positive[i] <= *best_value {
        return Ok(());
    }

    // Branch 1: exclude variable i.
    branch(
        i + 1,
        value_so_far,
        vars,
        weights,
        groups_of_var,
        used_groups,
        current,
        best_value,
        best_assignment,
        suffix_positive,
        time_cap,
        start,
    )?;

    // Branch 2: include variable i, if none of its groups are already used.
    let blocked = groups_of_var[i].iter().any(|&g| used_groups[g]);
    if !blocked {
        for &g in &groups_of_var[i] {
            used_groups[g] = true;
        }
        current[i] = true;

        branch(
            i + 1,
            value_so_far + weights[i],
            vars,
            weights,
            groups_of_var,
            used_groups,
            current,
            best_value,
            best_assignment,
            suffix_positive,
            time_cap,
            start,
        )?;

        current[i] = false;
        for &g in &groups_of_var[i] {
            used_groups[g] = false;
        }
    }

    Ok(())
}
