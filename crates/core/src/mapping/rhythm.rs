//! Musical speed ratios.

/// Ratios of the base speed that line rotation cycles up with beat
/// subdivisions.
pub const CANDIDATE_RATIOS: [f32; 10] = [
    1.0 / 4.0,
    1.0 / 2.0,
    2.0 / 3.0,
    3.0 / 4.0,
    1.0,
    4.0 / 3.0,
    3.0 / 2.0,
    2.0,
    5.0 / 2.0,
    3.0,
];

const MIN_RATIO: f32 = 0.25;
const MAX_RATIO: f32 = 3.0;

/// Returns the ratios inside `[0.25, 3.0]`, ascending.
///
/// Every fixed ratio already lies inside the range, so the result does not
/// depend on `bpm`; the parameter is kept for tempo-adaptive sets.
pub fn candidate_ratios(_bpm: u32) -> Vec<f32> {
    let mut ratios: Vec<f32> = CANDIDATE_RATIOS
        .iter()
        .copied()
        .filter(|ratio| (MIN_RATIO..=MAX_RATIO).contains(ratio))
        .collect();
    ratios.sort_by(f32::total_cmp);
    ratios
}

/// Snaps `value` to the nearest candidate ratio. On ties the lower ratio
/// wins.
pub fn closest(value: f32, bpm: u32) -> f32 {
    let candidates = candidate_ratios(bpm);
    assert!(!candidates.is_empty(), "rhythmic ratio set is never empty");

    let mut best = candidates[0];
    let mut best_distance = (value - best).abs();
    for &candidate in &candidates[1..] {
        let distance = (value - candidate).abs();
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }
    best
}
