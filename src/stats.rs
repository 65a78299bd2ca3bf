//! Statistics aggregator.
//!
//! Builds a `RunStatistics` record from a completed run's pair/altruist
//! partitions: overall counts and proportions, mean wait time, and slices by
//! PRA threshold, ABO type, and short-sojourn threshold. Every proportion
//! and mean here is a plain `count / denominator`; Rust's `0.0 / 0.0 = NaN`
//! gives the "empty denominators yield NaN" rule for free rather than
//! needing special-cased branches.

use serde::{Deserialize, Serialize};

use crate::compatibility::BloodType;
use crate::population::{AltruisticDonor, Pair};

/// PRA thresholds θ the "proportion matched among PRA ≥ θ" slices are taken at.
pub const PRA_THRESHOLDS: [f64; 6] = [0.05, 0.2, 0.4, 0.6, 0.8, 0.9];

/// Sojourn-length thresholds τ the "proportion matched among short sojourns" slices are taken at.
pub const SHORT_SOJOURN_THRESHOLDS: [f64; 5] = [0.01, 0.05, 0.1, 0.2, 0.5];

/// Seen/matched/expired/left-at-end counts, proportions, and mean wait time
/// for one vertex class (pairs, or altruists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexClassStats {
    pub seen: usize,
    pub matched: usize,
    pub expired: usize,
    pub left_at_end: usize,
    pub matched_proportion: f64,
    pub expired_proportion: f64,
    pub left_at_end_proportion: f64,
    /// Mean of `match_time - arrival_time` over matched vertices. `NaN` if
    /// none were matched.
    pub average_wait_time: f64,
}

/// One point of a threshold slice: how many of the vertices on the right
/// side of the threshold were ever matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSlice {
    pub threshold: f64,
    pub seen: usize,
    pub matched: usize,
    pub matched_proportion: f64,
}

/// One point of an ABO-type slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AboSlice {
    pub blood_type: BloodType,
    pub seen: usize,
    pub matched: usize,
    pub matched_proportion: f64,
}

/// The full statistics record for one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    pub pairs: VertexClassStats,
    pub altruists: VertexClassStats,
    pub pair_pra_slices: Vec<ThresholdSlice>,
    pub pair_abo_slices: Vec<AboSlice>,
    pub altruist_abo_slices: Vec<AboSlice>,
    pub pair_short_sojourn_slices: Vec<ThresholdSlice>,
    pub altruist_short_sojourn_slices: Vec<ThresholdSlice>,
}

/// Compute the full statistics record from a run's final partition.
pub fn compute(
    matched_pairs: &[Pair],
    expired_pairs: &[Pair],
    left_pairs: &[Pair],
    matched_altruists: &[AltruisticDonor],
    expired_altruists: &[AltruisticDonor],
    left_altruists: &[AltruisticDonor],
) -> RunStatistics {
    let wait_times: Vec<f64> = matched_pairs
        .iter()
        .filter_map(|p| p.match_time.map(|t| t - p.arrival_time))
        .collect();
    let pairs = vertex_class_stats(
        matched_pairs.len(),
        expired_pairs.len(),
        left_pairs.len(),
        &wait_times,
    );

    let altruist_wait_times: Vec<f64> = matched_altruists
        .iter()
        .filter_map(|a| a.match_time.map(|t| t - a.arrival_time))
        .collect();
    let altruists = vertex_class_stats(
        matched_altruists.len(),
        expired_altruists.len(),
        left_altruists.len(),
        &altruist_wait_times,
    );

    let all_pairs: Vec<(&Pair, bool)> = matched_pairs
        .iter()
        .map(|p| (p, true))
        .chain(expired_pairs.iter().map(|p| (p, false)))
        .chain(left_pairs.iter().map(|p| (p, false)))
        .collect();
    let all_altruists: Vec<(&AltruisticDonor, bool)> = matched_altruists
        .iter()
        .map(|a| (a, true))
        .chain(expired_altruists.iter().map(|a| (a, false)))
        .chain(left_altruists.iter().map(|a| (a, false)))
        .collect();

    let pair_pra_slices = PRA_THRESHOLDS
        .iter()
        .map(|&theta| {
            threshold_slice(theta, &all_pairs, |p| p.patient.pra >= theta)
        })
        .collect();

    let pair_abo_slices = BloodType::ALL
        .iter()
        .map(|&bt| abo_slice(bt, &all_pairs, |p| p.patient.blood_type == bt))
        .collect();
    let altruist_abo_slices = BloodType::ALL
        .iter()
        .map(|&bt| abo_slice(bt, &all_altruists, |a| a.donor.blood_type == bt))
        .collect();

    let pair_short_sojourn_slices = SHORT_SOJOURN_THRESHOLDS
        .iter()
        .map(|&tau| {
            threshold_slice(tau, &all_pairs, |p| {
                p.departure_time - p.arrival_time <= tau
            })
        })
        .collect();
    let altruist_short_sojourn_slices = SHORT_SOJOURN_THRESHOLDS
        .iter()
        .map(|&tau| {
            threshold_slice(tau, &all_altruists, |a| {
                a.departure_time - a.arrival_time <= tau
            })
        })
        .collect();

    RunStatistics {
        pairs,
        altruists,
        pair_pra_slices,
        pair_abo_slices,
        altruist_abo_slices,
        pair_short_sojourn_slices,
        altruist_short_sojourn_slices,
    }
}

fn vertex_class_stats(matched: usize, expired: usize, left_at_end: usize, wait_times: &[f64]) -> VertexClassStats {
    let seen = matched + expired + left_at_end;
    let average_wait_time = wait_times.iter().sum::<f64>() / wait_times.len() as f64;
    VertexClassStats {
        seen,
        matched,
        expired,
        left_at_end,
        matched_proportion: matched as f64 / seen as f64,
        expired_proportion: expired as f64 / seen as f64,
        left_at_end_proportion: left_at_end as f64 / seen as f64,
        average_wait_time,
    }
}

fn threshold_slice<T>(threshold: f64, vertices: &[(&T, bool)], predicate: impl Fn(&T) -> bool) -> ThresholdSlice {
    let relevant: Vec<bool> = vertices
        .iter()
        .filter(|(v, _)| predicate(v))
        .map(|(_, matched)| *matched)
        .collect();
    let seen = relevant.len();
    let matched = relevant.iter().filter(|&&m| m).count();
    ThresholdSlice {
        threshold,
        seen,
        matched,
        matched_proportion: matched as f64 / seen as f64,
    }
}

fn abo_slice<T>(blood_type: BloodType, vertices: &[(&T, bool)], predicate: impl Fn(&T) -> bool) -> AboSlice {
    let relevant: Vec<bool> = vertices
        .iter()
        .filter(|(v, _)| predicate(v))
        .map(|(_, matched)| *matched)
        .collect();
    let seen = relevant.len();
    let matched = relevant.iter().filter(|&&m| m).count();
    AboSlice {
        blood_type,
        seen,
        matched,
        matched_proportion: matched as f64 / seen as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{AltruistId, Donor, PairId, Patient};

    fn pair(id: usize, pra: f64, arrival: f64, departure: f64, match_time: Option<f64>) -> Pair {
        Pair {
            id: PairId(id),
            patient: Patient {
                blood_type: BloodType::O,
                pra,
                potential: 0.0,
            },
            donor: Donor {
                blood_type: BloodType::O,
                virtual_pra: 1.0,
                potential: 0.0,
            },
            arrival_time: arrival,
            departure_time: departure,
            matched: match_time.is_some(),
            match_time,
        }
    }

    #[test]
    fn empty_run_yields_nan_proportions() {
        let stats = compute(&[], &[], &[], &[], &[], &[]);
        assert!(stats.pairs.matched_proportion.is_nan());
        assert!(stats.pairs.average_wait_time.is_nan());
        assert!(stats.altruists.matched_proportion.is_nan());
    }

    #[test]
    fn counts_and_proportions_match_the_partition() {
        let matched = vec![pair(0, 0.1, 0.0, 10.0, Some(3.0))];
        let expired = vec![pair(1, 0.1, 0.0, 5.0, None)];
        let left = vec![pair(2, 0.1, 0.0, 100.0, None)];
        let stats = compute(&matched, &expired, &left, &[], &[], &[]);

        assert_eq!(stats.pairs.seen, 3);
        assert_eq!(stats.pairs.matched, 1);
        assert_eq!(stats.pairs.expired, 1);
        assert_eq!(stats.pairs.left_at_end, 1);
        assert!((stats.pairs.matched_proportion - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.pairs.average_wait_time, 3.0);
    }

    #[test]
    fn pra_slice_denominator_only_counts_vertices_above_threshold() {
        let matched = vec![pair(0, 0.9, 0.0, 10.0, Some(1.0))];
        let expired = vec![pair(1, 0.01, 0.0, 5.0, None)];
        let stats = compute(&matched, &expired, &[], &[], &[], &[]);

        let slice_at_05 = stats
            .pair_pra_slices
            .iter()
            .find(|s| (s.threshold - 0.05).abs() < 1e-9)
            .unwrap();
        assert_eq!(slice_at_05.seen, 1);
        assert_eq!(slice_at_05.matched, 1);
        assert_eq!(slice_at_05.matched_proportion, 1.0);
    }

    #[test]
    fn short_sojourn_slice_buckets_by_departure_minus_arrival() {
        let short = pair(0, 0.1, 0.0, 0.02, None);
        let long = pair(1, 0.1, 0.0, 10.0, None);
        let stats = compute(&[], &[short, long], &[], &[], &[], &[]);

        let slice_at_005 = stats
            .pair_short_sojourn_slices
            .iter()
            .find(|s| (s.threshold - 0.05).abs() < 1e-9)
            .unwrap();
        assert_eq!(slice_at_005.seen, 1);
    }

    #[test]
    fn altruist_abo_slices_are_keyed_by_donor_type() {
        let altruist = AltruisticDonor {
            id: AltruistId(0),
            donor: Donor {
                blood_type: BloodType::AB,
                virtual_pra: 1.0,
                potential: 0.0,
            },
            arrival_time: 0.0,
            departure_time: 10.0,
            matched: true,
            match_time: Some(2.0),
        };
        let stats = compute(&[], &[], &[], &[altruist], &[], &[]);
        let ab_slice = stats
            .altruist_abo_slices
            .iter()
            .find(|s| s.blood_type == BloodType::AB)
            .unwrap();
        assert_eq!(ab_slice.seen, 1);
        assert_eq!(ab_slice.matched, 1);
    }
}
