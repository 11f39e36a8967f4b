//! Nominal bead size classes and the bins that define them.

use serde::{Deserialize, Serialize};

/// A classified bead size. `Unknown` covers diameters outside every
/// configured bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeClass {
    Known(u32),
    Unknown,
}

impl SizeClass {
    pub fn label(&self) -> String {
        match self {
            SizeClass::Known(n) => n.to_string(),
            SizeClass::Unknown => "unknown".to_string(),
        }
    }
}

/// One half-open `[min, max)` bin, labelled with its nominal class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeBin {
    pub label: u32,
    pub min_mm: f64,
    pub max_mm: f64,
}

impl SizeBin {
    pub fn contains(&self, diameter_mm: f64) -> bool {
        diameter_mm >= self.min_mm && diameter_mm < self.max_mm
    }
}
