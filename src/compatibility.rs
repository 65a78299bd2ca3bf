//! ABO blood-type donation rules and the virtual-PRA compatibility check.
//!
//! These are pure functions over patient/donor attributes; nothing here
//! touches pools, handles, or simulated time.

use serde::{Deserialize, Serialize};

/// Blood group. Drives the ABO donation rule: `O` is the universal donor,
/// `AB` the universal receiver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    O,
    A,
    B,
    AB,
}

impl BloodType {
    /// The four blood types, in a fixed order used wherever statistics are
    /// sliced by ABO type.
    pub const ALL: [BloodType; 4] = [BloodType::O, BloodType::A, BloodType::B, BloodType::AB];

    /// All sixteen (patient, donor) ABO combinations, in a fixed order
    /// matching the pool-composition file's row order (`O-O, O-A, ..., AB-AB`).
    pub const ALL_PAIRS: [(BloodType, BloodType); 16] = [
        (BloodType::O, BloodType::O),
        (BloodType::O, BloodType::A),
        (BloodType::O, BloodType::B),
        (BloodType::O, BloodType::AB),
        (BloodType::A, BloodType::O),
        (BloodType::A, BloodType::A),
        (BloodType::A, BloodType::B),
        (BloodType::A, BloodType::AB),
        (BloodType::B, BloodType::O),
        (BloodType::B, BloodType::A),
        (BloodType::B, BloodType::B),
        (BloodType::B, BloodType::AB),
        (BloodType::AB, BloodType::O),
        (BloodType::AB, BloodType::A),
        (BloodType::AB, BloodType::B),
        (BloodType::AB, BloodType::AB),
    ];

    /// Parse the `<ABO>` token used in the pool-composition file and in CLI
    /// config overrides.
    pub fn parse(s: &str) -> Option<BloodType> {
        match s {
            "O" => Some(BloodType::O),
            "A" => Some(BloodType::A),
            "B" => Some(BloodType::B),
            "AB" => Some(BloodType::AB),
            _ => None,
        }
    }

    /// ABO donation rule: can a donor of this type give to a patient of
    /// `patient_type`?
    ///
    /// `O` → all; `A` → {A, AB}; `B` → {B, AB}; `AB` → {AB} only.
    pub fn can_donate_to(self, patient_type: BloodType) -> bool {
        match patient_type {
            BloodType::O => self == BloodType::O,
            BloodType::A => self == BloodType::A || self == BloodType::O,
            BloodType::B => self == BloodType::B || self == BloodType::O,
            BloodType::AB => true,
        }
    }
}

/// Is `donor_type`/`donor_virtual_pra` virtually compatible with
/// `patient_type`/`patient_pra`? ABO must allow the donation *and* the
/// donor's virtual PRA must strictly exceed the patient's PRA threshold.
pub fn virtually_compatible(
    donor_type: BloodType,
    donor_virtual_pra: f64,
    patient_type: BloodType,
    patient_pra: f64,
) -> bool {
    donor_type.can_donate_to(patient_type) && donor_virtual_pra > patient_pra
}
