//! Compatibility digraph construction and cycle/chain enumeration.
//!
//! Operates on an epoch's pool *snapshot*: `pairs[i]` / `altruists[i]` are
//! addressed by their position in the slice passed to [`CompatibilityGraph::build`],
//! not by their stable [`PairId`](crate::population::PairId) /
//! [`AltruistId`](crate::population::AltruistId) — the matching engine maps
//! back to handles via `Pair::id` / `AltruisticDonor::id` once a cycle or
//! chain is selected. The graph is rebuilt from scratch every matching
//! epoch, so local indices never need to remain valid across epochs.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::population::{AltruisticDonor, Pair};

/// Selects which scalar weight function is used to score cycles and chains.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    /// Weight = number of pairs matched by the structure.
    Simple,
    /// Weight = size minus the potentials of the vertices involved.
    Potentials,
    /// Weight rewards long waiters and near-expiry vertices.
    Fairness,
}

/// A constant baked into the Potentials chain-weight formula (the altruist's
/// potential counts three times what a pair's does).
const CHAIN_ALTRUIST_POTENTIAL_WEIGHT: f64 = 3.0;

/// Fairness bonus for vertices close to expiring: `max(0, FAIRNESS_HORIZON - remaining_sojourn)`.
const FAIRNESS_HORIZON: f64 = 10.0;

/// A simple directed cycle of length 2 or 3 among pair-local indices,
/// canonicalised to start at its smallest index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cycle {
    pub pairs: Vec<usize>,
}

impl Cycle {
    pub fn size(&self) -> usize {
        self.pairs.len()
    }
}

/// A simple directed path of length 1..=L starting at altruist-local index
/// `altruist` and proceeding through pair-local indices.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Chain {
    pub altruist: usize,
    pub pairs: Vec<usize>,
}

impl Chain {
    /// Number of pairs consumed (the altruist itself is not counted).
    pub fn size(&self) -> usize {
        self.pairs.len()
    }
}

/// The compatibility digraph for one matching epoch, plus its enumerated
/// cycles/chains and their objective-dependent weights.
pub struct CompatibilityGraph {
    /// `edges[i]` is the sorted set of pair-local indices `j` such that
    /// `pairs[i].donor` can give to `pairs[j].patient`.
    edges: Vec<BTreeSet<usize>>,
    /// `altruist_edges[a]` is the sorted set of pair-local indices reachable
    /// in one hop from altruist-local index `a`.
    altruist_edges: Vec<BTreeSet<usize>>,
    pub cycles: Vec<Cycle>,
    pub chains: Vec<Chain>,
    pub cycle_weights: Vec<f64>,
    pub chain_weights: Vec<f64>,
}

impl CompatibilityGraph {
    /// Build the digraph over `pairs`/`altruists`, enumerate all 2- and
    /// 3-cycles and all chains of length `1..=max_chain_length`, and score
    /// every structure under `objective` at `current_time`.
    pub fn build(
        pairs: &[Pair],
        altruists: &[AltruisticDonor],
        objective: Objective,
        current_time: f64,
        max_chain_length: usize,
    ) -> Self {
        let edges = find_pair_edges(pairs);
        let altruist_edges = find_altruist_edges(pairs, altruists);

        let cycles = enumerate_cycles(&edges);
        let chains = enumerate_chains(&altruist_edges, &edges, max_chain_length);

        let cycle_weights = cycles
            .iter()
            .map(|c| cycle_weight(c, pairs, objective, current_time))
            .collect();
        let chain_weights = chains
            .iter()
            .map(|c| chain_weight(c, pairs, altruists, objective, current_time))
            .collect();

        CompatibilityGraph {
            edges,
            altruist_edges,
            cycles,
            chains,
            cycle_weights,
            chain_weights,
        }
    }

    /// True iff pair-local `from` can give to pair-local `to`. Exposed for
    /// the invariant checks in the matching engine's test suite.
    pub fn has_pair_edge(&self, from: usize, to: usize) -> bool {
        self.edges[from].contains(&to)
    }

    /// True iff altruist-local `from` can give to pair-local `to`.
    pub fn has_altruist_edge(&self, from: usize, to: usize) -> bool {
        self.altruist_edges[from].contains(&to)
    }
}

fn find_pair_edges(pairs: &[Pair]) -> Vec<BTreeSet<usize>> {
    let n = pairs.len();
    let mut edges = vec![BTreeSet::new(); n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if pairs[i].donor.is_compatible_with(&pairs[j].patient) {
                edges[i].insert(j);
            }
        }
    }
    edges
}

fn find_altruist_edges(pairs: &[Pair], altruists: &[AltruisticDonor]) -> Vec<BTreeSet<usize>> {
    altruists
        .iter()
        .map(|a| {
            pairs
                .iter()
                .enumerate()
                .filter(|(_, p)| a.donor.is_compatible_with(&p.patient))
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// Enumerate every distinct directed 2- and 3-cycle exactly once,
/// canonicalised as the rotation starting at the smallest index.
fn enumerate_cycles(edges: &[BTreeSet<usize>]) -> Vec<Cycle> {
    let n = edges.len();
    let mut cycles = Vec::new();

    // 2-cycles: unordered {i, j} with i -> j and j -> i.
    for i in 0..n {
        for &j in edges[i].iter().filter(|&&j| j > i) {
            if edges[j].contains(&i) {
                cycles.push(Cycle { pairs: vec![i, j] });
            }
        }
    }

    // 3-cycles: (i, j, k) with i = min(i, j, k) and i -> j -> k -> i.
    for i in 0..n {
        for &j in edges[i].iter().filter(|&&j| j > i) {
            for &k in edges[j].iter().filter(|&&k| k > i && k != j) {
                if edges[k].contains(&i) {
                    cycles.push(Cycle {
                        pairs: vec![i, j, k],
                    });
                }
            }
        }
    }

    cycles
}

/// Enumerate, for each altruist, every prefix of every path its chain walk
/// visits via donor->patient edges, up to `max_len`. Each root (first
/// compatible pair) gets one fresh `found` set, but that set is shared and
/// mutated across the root's *entire* traversal rather than reset per
/// branch: once any branch visits a vertex, every later-explored sibling
/// branch from the same root treats it as unavailable, even if backtracking
/// would otherwise make it reachable again. This reproduces the reference
/// walk's `get_chains(start, past, found)` exactly, including its quirk of
/// sometimes dropping a simple path that a later sibling branch could have
/// taken. An explicit stack stands in for the reference's recursion; `past`
/// is cloned per branch (it is not aliased in the original either) while
/// `found` is the one piece of state shared across the whole root traversal.
fn enumerate_chains(
    altruist_edges: &[BTreeSet<usize>],
    pair_edges: &[BTreeSet<usize>],
    max_len: usize,
) -> Vec<Chain> {
    let mut chains = Vec::new();

    for (a, roots) in altruist_edges.iter().enumerate() {
        for &root in roots {
            let mut found: HashSet<usize> = HashSet::new();
            let mut stack: Vec<(usize, Vec<usize>)> = vec![(root, Vec::new())];

            while let Some((node, past)) = stack.pop() {
                found.insert(node);
                let mut path = past;
                path.push(node);
                chains.push(Chain {
                    altruist: a,
                    pairs: path.clone(),
                });

                if path.len() >= max_len {
                    continue;
                }

                let next: Vec<usize> = pair_edges[node]
                    .iter()
                    .filter(|j| !found.contains(j))
                    .copied()
                    .collect();
                for &j in next.iter().rev() {
                    stack.push((j, path.clone()));
                }
            }
        }
    }

    chains
}

fn cycle_weight(cycle: &Cycle, pairs: &[Pair], objective: Objective, current_time: f64) -> f64 {
    match objective {
        Objective::Simple => cycle.size() as f64,
        Objective::Potentials => {
            cycle.size() as f64
                - cycle
                    .pairs
                    .iter()
                    .map(|&p| pairs[p].patient.potential + pairs[p].donor.potential)
                    .sum::<f64>()
        }
        Objective::Fairness => {
            1.0 + cycle
                .pairs
                .iter()
                .map(|&p| fairness_term(&pairs[p], current_time))
                .sum::<f64>()
        }
    }
}

fn chain_weight(
    chain: &Chain,
    pairs: &[Pair],
    altruists: &[AltruisticDonor],
    objective: Objective,
    current_time: f64,
) -> f64 {
    match objective {
        Objective::Simple => chain.size() as f64,
        Objective::Potentials => {
            chain.size() as f64
                - chain
                    .pairs
                    .iter()
                    .map(|&p| pairs[p].patient.potential + pairs[p].donor.potential)
                    .sum::<f64>()
                - CHAIN_ALTRUIST_POTENTIAL_WEIGHT * altruists[chain.altruist].donor.potential
        }
        Objective::Fairness => {
            1.0 + chain
                .pairs
                .iter()
                .map(|&p| fairness_term(&pairs[p], current_time))
                .sum::<f64>()
        }
    }
}

fn fairness_term(pair: &Pair, current_time: f64) -> f64 {
    let waited = (current_time - pair.arrival_time).max(0.0).sqrt();
    let urgency = (FAIRNESS_HORIZON - (pair.departure_time - current_time)).max(0.0);
    waited + urgency
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compatibility::BloodType;
    use crate::population::{Donor, Patient, PairId, AltruistId};

    fn pair(id: usize, donor_type: BloodType, patient_type: BloodType) -> Pair {
        Pair {
            id: PairId(id),
            patient: Patient {
                blood_type: patient_type,
                pra: 0.0,
                potential: 0.0,
            },
            donor: Donor {
                blood_type: donor_type,
                virtual_pra: 1.0,
                potential: 0.0,
            },
            arrival_time: 0.0,
            departure_time: 100.0,
            matched: false,
            match_time: None,
        }
    }

    #[test]
    fn enumerates_a_two_cycle() {
        // Pair 0: O donor -> A patient needs A donor for O patient (pair 1).
        let pairs = vec![
            pair(0, BloodType::A, BloodType::O),
            pair(1, BloodType::O, BloodType::A),
        ];
        let g = CompatibilityGraph::build(&pairs, &[], Objective::Simple, 0.0, 10);
        assert_eq!(g.cycles.len(), 1);
        assert_eq!(g.cycles[0].pairs, vec![0, 1]);
        assert_eq!(g.cycle_weights[0], 2.0);
    }

    #[test]
    fn enumerates_a_three_cycle_exactly_once() {
        // ABO blocks both reverse edges outright (B donor can't reach an A
        // patient, A donor can't reach a B patient); PRA blocks the one
        // remaining ABO-permitted edge (0 -> 2) that isn't part of the ring.
        // What's left is exactly the ring 0 -> 1 -> 2 -> 0.
        let mut pairs = vec![
            pair(0, BloodType::B, BloodType::A),
            pair(1, BloodType::B, BloodType::B),
            pair(2, BloodType::A, BloodType::AB),
        ];
        pairs[0].patient.pra = 0.2;
        pairs[0].donor.virtual_pra = 0.3;
        pairs[1].patient.pra = 0.1;
        pairs[1].donor.virtual_pra = 0.9;
        pairs[2].patient.pra = 0.5;
        pairs[2].donor.virtual_pra = 0.9;

        let g = CompatibilityGraph::build(&pairs, &[], Objective::Simple, 0.0, 10);
        assert_eq!(g.cycles.len(), 1);
        assert_eq!(g.cycles[0].pairs, vec![0, 1, 2]);
    }

    #[test]
    fn chain_length_is_capped_at_max_len() {
        // A fully-connected pool of 15 O/O pairs: every donor can reach
        // every other patient, so the reachable simple paths run well past
        // the chain-length cap.
        let pairs: Vec<Pair> = (0..15)
            .map(|i| pair(i, BloodType::O, BloodType::O))
            .collect();
        let altruist = AltruisticDonor {
            id: AltruistId(0),
            donor: Donor {
                blood_type: BloodType::O,
                virtual_pra: 1.0,
                potential: 0.0,
            },
            arrival_time: 0.0,
            departure_time: 100.0,
            matched: false,
            match_time: None,
        };
        let g = CompatibilityGraph::build(&pairs, std::slice::from_ref(&altruist), Objective::Simple, 0.0, 10);
        let longest = g.chains.iter().map(|c| c.size()).max().unwrap();
        assert_eq!(longest, 10);
    }
}
