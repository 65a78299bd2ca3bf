//! Patient/donor data model, pool-composition loading, and the NKR
//! population sampler.
//!
//! Pairs and altruistic donors are identified by stable integer handles
//! (`PairId` / `AltruistId`) allocated by the scheduler at arrival, rather
//! than by object identity — see the crate-root invariants.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::compatibility::{virtually_compatible, BloodType};
use crate::SimError;

/// The fixed 7-point PRA grid the NKR table's conditional distributions are
/// defined over.
pub const PRA_GRID: [f64; 7] = [0.0, 0.05, 0.30, 0.65, 0.875, 0.97, 0.995];

/// Stable handle for a pair, assigned at arrival. Indices into the
/// current-epoch pool snapshot and into cycle/chain records are expressed
/// in terms of this type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairId(pub usize);

/// Stable handle for an altruistic donor, assigned at arrival.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AltruistId(pub usize);

/// Patient-side attributes.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Patient {
    pub blood_type: BloodType,
    /// Panel-reactive antibody threshold in `[0, 1]`.
    pub pra: f64,
    /// Scalar used only by the Potentials objective; defaults to 0.
    pub potential: f64,
}

/// Donor-side attributes, shared by pair donors and altruistic donors.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Donor {
    pub blood_type: BloodType,
    /// HLA-acceptability proxy in `[0, 1]`.
    pub virtual_pra: f64,
    /// Scalar used only by the Potentials objective; defaults to 0.
    pub potential: f64,
}

impl Donor {
    /// Is this donor virtually compatible with `patient`?
    pub fn is_compatible_with(&self, patient: &Patient) -> bool {
        virtually_compatible(
            self.blood_type,
            self.virtual_pra,
            patient.blood_type,
            patient.pra,
        )
    }
}

/// A patient-donor pair in the exchange. Patient-incompatible by
/// construction (see the sampler's rejection rule).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pair {
    pub id: PairId,
    pub patient: Patient,
    pub donor: Donor,
    pub arrival_time: f64,
    pub departure_time: f64,
    pub matched: bool,
    pub match_time: Option<f64>,
}

/// A non-directed (altruistic) donor: a standalone `Donor` with lifecycle
/// attributes but no attached patient.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AltruisticDonor {
    pub id: AltruistId,
    pub donor: Donor,
    pub arrival_time: f64,
    pub departure_time: f64,
    pub matched: bool,
    pub match_time: Option<f64>,
}

/// One row of the NKR pool-composition table: the marginal probability of
/// an (patient ABO, donor ABO) combination, and the conditional CDF of
/// patient PRA over `PRA_GRID` for that combination.
#[derive(Clone, Debug)]
struct DistributionRow {
    marginal: f64,
    /// Cumulative distribution over `PRA_GRID`; `pra_cdf[i]` is
    /// `P(pra <= PRA_GRID[i])`.
    pra_cdf: [f64; 7],
}

/// The NKR pool-composition table: marginal ABO probabilities and, per
/// combination, a conditional PRA distribution. Loaded from
/// `distributions.txt` (see the pool-composition file format).
#[derive(Clone, Debug)]
pub struct PoolDistribution {
    rows: HashMap<(BloodType, BloodType), DistributionRow>,
    /// Cumulative marginal distribution, in `BloodType::ALL_PAIRS` order,
    /// for inverse-CDF ABO-pair sampling.
    marginal_cdf: Vec<((BloodType, BloodType), f64)>,
}

const MARGINAL_TOLERANCE: f64 = 1e-3;

impl PoolDistribution {
    /// Load and normalise the pool-composition file at `path`.
    ///
    /// Each whitespace-delimited line is
    /// `<PATIENT>-<DONOR> marginal_pct p0 p1 p2 p3 p4 p5 p6`, all values
    /// percentages. All sixteen ABO combinations must be present and the
    /// marginals must sum to `100 ± ε`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SimError::MalformedDistribution(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&text)
    }

    /// Parse the pool-composition file contents directly (used by the
    /// loader and by tests that construct distributions inline).
    pub fn parse(text: &str) -> Result<Self, SimError> {
        let mut rows = HashMap::new();
        let mut marginal_sum = 0.0;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let key_tok = fields.next().ok_or_else(|| {
                SimError::MalformedDistribution(format!("empty row: {line:?}"))
            })?;
            let (patient_tok, donor_tok) = key_tok.split_once('-').ok_or_else(|| {
                SimError::MalformedDistribution(format!(
                    "row key {key_tok:?} is not <PATIENT>-<DONOR>"
                ))
            })?;
            let patient = BloodType::parse(patient_tok).ok_or_else(|| {
                SimError::MalformedDistribution(format!("unknown patient ABO {patient_tok:?}"))
            })?;
            let donor = BloodType::parse(donor_tok).ok_or_else(|| {
                SimError::MalformedDistribution(format!("unknown donor ABO {donor_tok:?}"))
            })?;

            let values: Vec<f64> = fields
                .map(|tok| {
                    tok.parse::<f64>().map_err(|e| {
                        SimError::MalformedDistribution(format!(
                            "bad numeric field {tok:?} in row {line:?}: {e}"
                        ))
                    })
                })
                .collect::<Result<_, _>>()?;
            if values.len() != 8 {
                return Err(SimError::MalformedDistribution(format!(
                    "row {line:?} has {} numeric fields, expected 8",
                    values.len()
                )));
            }

            let marginal = values[0] / 100.0;
            marginal_sum += values[0];

            let mut cumulative = 0.0;
            let mut pra_cdf = [0.0; 7];
            for (i, p) in values[1..8].iter().enumerate() {
                cumulative += p / 100.0;
                pra_cdf[i] = cumulative;
            }

            rows.insert((patient, donor), DistributionRow { marginal, pra_cdf });
        }

        for (patient, donor) in BloodType::ALL_PAIRS {
            if !rows.contains_key(&(patient, donor)) {
                return Err(SimError::MalformedDistribution(format!(
                    "missing ABO combination {patient:?}-{donor:?}"
                )));
            }
        }

        if (marginal_sum - 100.0).abs() > MARGINAL_TOLERANCE * 100.0 {
            return Err(SimError::MalformedDistribution(format!(
                "marginals sum to {marginal_sum}, expected 100 +/- {}",
                MARGINAL_TOLERANCE * 100.0
            )));
        }

        let mut marginal_cdf = Vec::with_capacity(16);
        let mut cumulative = 0.0;
        for (patient, donor) in BloodType::ALL_PAIRS {
            cumulative += rows[&(patient, donor)].marginal;
            marginal_cdf.push(((patient, donor), cumulative));
        }

        Ok(PoolDistribution { rows, marginal_cdf })
    }

    fn draw_abo_pair(&self, rng: &mut impl Rng) -> (BloodType, BloodType) {
        let u: f64 = rng.gen();
        for (combo, cumulative) in &self.marginal_cdf {
            if u <= *cumulative {
                return *combo;
            }
        }
        self.marginal_cdf.last().expect("non-empty table").0
    }

    fn draw_pra(&self, patient: BloodType, donor: BloodType, rng: &mut impl Rng) -> f64 {
        let row = &self.rows[&(patient, donor)];
        let u: f64 = rng.gen();
        for (i, cumulative) in row.pra_cdf.iter().enumerate() {
            if u <= *cumulative {
                return PRA_GRID[i];
            }
        }
        *PRA_GRID.last().expect("non-empty grid")
    }
}

/// Draws patients, pair donors, and altruistic donors from a
/// `PoolDistribution`. Owns no simulated-time state — `arrival_time`,
/// `departure_time`, and handle assignment are the scheduler's job.
pub struct PopulationSampler<'a> {
    dist: &'a PoolDistribution,
}

impl<'a> PopulationSampler<'a> {
    pub fn new(dist: &'a PoolDistribution) -> Self {
        PopulationSampler { dist }
    }

    /// Draw a `(Patient, Donor)` pair, rejecting and redrawing until the
    /// pair is not already internally compatible (see the rejection rule
    /// in the population sampler contract).
    pub fn sample_pair(&self, rng: &mut impl Rng) -> (Patient, Donor) {
        loop {
            let (patient_abo, donor_abo) = self.dist.draw_abo_pair(rng);
            let pra = self.dist.draw_pra(patient_abo, donor_abo, rng);
            let virtual_pra: f64 = rng.gen();

            let internally_compatible =
                donor_abo.can_donate_to(patient_abo) && virtual_pra >= pra;
            if internally_compatible {
                continue;
            }

            let patient = Patient {
                blood_type: patient_abo,
                pra,
                potential: 0.0,
            };
            let donor = Donor {
                blood_type: donor_abo,
                virtual_pra,
                potential: 0.0,
            };
            return (patient, donor);
        }
    }

    /// Draw a standalone altruistic donor: ABO and virtual PRA as for a
    /// pair donor, with no rejection.
    pub fn sample_altruist(&self, rng: &mut impl Rng) -> Donor {
        let (_, donor_abo) = self.dist.draw_abo_pair(rng);
        let virtual_pra: f64 = rng.gen();
        Donor {
            blood_type: donor_abo,
            virtual_pra,
            potential: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn uniform_table() -> PoolDistribution {
        let marginal_pct = 100.0 / 16.0;
        let mut lines = Vec::new();
        for (patient, donor) in BloodType::ALL_PAIRS {
            lines.push(format!(
                "{:?}-{:?} {marginal_pct} 14.2857 14.2857 14.2857 14.2857 14.2857 14.2857 14.2858",
                patient, donor
            ));
        }
        PoolDistribution::parse(&lines.join("\n")).unwrap()
    }

    #[test]
    fn missing_combination_is_malformed() {
        let text = "O-O 100 100 0 0 0 0 0 0";
        let err = PoolDistribution::parse(text).unwrap_err();
        assert!(matches!(err, SimError::MalformedDistribution(_)));
    }

    #[test]
    fn marginals_must_sum_to_100() {
        let mut lines = Vec::new();
        for (patient, donor) in BloodType::ALL_PAIRS {
            lines.push(format!("{:?}-{:?} 1.0 100 0 0 0 0 0 0", patient, donor));
        }
        let err = PoolDistribution::parse(&lines.join("\n")).unwrap_err();
        assert!(matches!(err, SimError::MalformedDistribution(_)));
    }

    #[test]
    fn sampled_pairs_are_never_internally_compatible() {
        let dist = uniform_table();
        let sampler = PopulationSampler::new(&dist);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let (patient, donor) = sampler.sample_pair(&mut rng);
            assert!(!donor.is_compatible_with(&patient));
        }
    }

    #[test]
    fn sampling_is_deterministic_given_seed() {
        let dist = uniform_table();
        let sampler = PopulationSampler::new(&dist);

        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let (pa, da) = sampler.sample_pair(&mut rng_a);
            let (pb, db) = sampler.sample_pair(&mut rng_b);
            assert_eq!(pa.pra, pb.pra);
            assert_eq!(da.virtual_pra, db.virtual_pra);
        }
    }
}
