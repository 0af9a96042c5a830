//! Built-in sample datasets used by `concordance demo` and `trajectories`.

use std::collections::BTreeMap;

use concordance_core::StudyTrajectory;

/// Checkpoint percentages from the reference p-value table.
pub const CHECKPOINT_VALUES: [f64; 11] = [
    100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 91.0, 100.0, 94.8, 97.0, 73.0,
];

/// Final percentages matching [`CHECKPOINT_VALUES`] index by index.
pub const FINAL_VALUES: [f64; 11] = [
    100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 97.0, 97.0, 97.0, 97.0, 73.0,
];

/// Two stages of `(checkpoint, final)` pairs.
pub fn stage_data() -> BTreeMap<usize, Vec<(f64, f64)>> {
    let mut data = BTreeMap::new();
    data.insert(0, vec![(1.0, 2.0), (2.0, 3.0), (3.0, 5.0), (4.0, 7.0)]);
    data.insert(1, vec![(1.0, 1.5), (2.0, 2.8), (3.0, 3.7), (4.0, 4.9)]);
    data
}

/// Three studies with differing numbers of intermediate checkpoints.
pub fn studies() -> Vec<StudyTrajectory> {
    vec![
        StudyTrajectory::new("Study 1", 67.0, vec![75.0], 72.2),
        StudyTrajectory::new("Study 2", 100.0, vec![67.0], 75.0),
        StudyTrajectory::new("Study 3", 38.0, vec![], 60.0),
    ]
}
