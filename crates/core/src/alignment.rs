use std::{collections::BTreeSet, fmt};

pub const ALIGNED_MESSAGE: &str = "All prototypes connect strongly to their respective classes";
pub const MISALIGNED_MESSAGE: &str =
    "WARNING: Not all prototypes connect most strongly to their respective classes";

/// Outcome of comparing each prototype's strongest last-layer connection with
/// the class recorded for it at push time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentReport {
    pub total: usize,
    pub aligned: usize,
    /// Prototypes whose strongest connection disagrees with their class.
    pub mismatched: Vec<usize>,
}

impl AlignmentReport {
    pub fn is_aligned(&self) -> bool {
        self.aligned == self.total
    }

    pub fn message(&self) -> &'static str {
        if self.is_aligned() {
            ALIGNED_MESSAGE
        } else {
            MISALIGNED_MESSAGE
        }
    }
}

impl fmt::Display for AlignmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Compares strongest connections with assigned classes element-wise.
///
/// Lengths are expected to match; extra entries on either side count as
/// misaligned.
pub fn check_alignment(strongest: &[usize], assigned: &[usize]) -> AlignmentReport {
    let total = strongest.len().max(assigned.len());
    let mismatched: Vec<usize> = (0..total)
        .filter(|&idx| strongest.get(idx) != assigned.get(idx))
        .collect();
    AlignmentReport {
        total,
        aligned: total - mismatched.len(),
        mismatched,
    }
}

/// Number of distinct classes prototypes were pushed from.
pub fn distinct_classes(assigned: &[usize]) -> usize {
    assigned.iter().collect::<BTreeSet<_>>().len()
}
