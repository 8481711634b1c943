//! Keyframe timestamp planning.

use crate::analysis::RelevantMoment;

/// Plan extraction timestamps across the relevant moments.
///
/// Each moment gets up to `ceil(duration * density)` evenly spaced
/// positions; when the sum exceeds `max_keyframes` the budget is split
/// proportionally to moment length (largest remainder, at least one per
/// moment while budget lasts). Timestamps stay within `[0, duration)`.
pub fn plan_timestamps(
    moments: &[RelevantMoment],
    density: f64,
    max_keyframes: usize,
    duration_sec: f64,
) -> Vec<f64> {
    if moments.is_empty() || max_keyframes == 0 || duration_sec <= 0.0 {
        return Vec::new();
    }

    let desired: Vec<usize> = moments
        .iter()
        .map(|m| ((m.duration() * density).ceil() as usize).max(1))
        .collect();
    let total_desired: usize = desired.iter().sum();

    let counts = if total_desired <= max_keyframes {
        desired
    } else {
        apportion(moments, max_keyframes)
    };

    let mut timestamps = Vec::new();
    for (moment, count) in moments.iter().zip(counts) {
        let span = moment.duration();
        for i in 0..count {
            // Midpoint sampling avoids the cut boundaries themselves.
            let t = moment.start_sec + span * (i as f64 + 0.5) / count as f64;
            timestamps.push(t.min(duration_sec - 0.001).max(0.0));
        }
    }

    timestamps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    timestamps.dedup_by(|a, b| (*a - *b).abs() < 0.05);
    timestamps.truncate(max_keyframes);
    timestamps
}

/// Split `budget` across moments proportionally to their length.
fn apportion(moments: &[RelevantMoment], budget: usize) -> Vec<usize> {
    let total_len: f64 = moments.iter().map(|m| m.duration()).sum();
    if total_len <= 0.0 {
        return vec![0; moments.len()];
    }

    let shares: Vec<f64> = moments
        .iter()
        .map(|m| budget as f64 * m.duration() / total_len)
        .collect();

    let mut counts: Vec<usize> = shares.iter().map(|s| s.floor() as usize).collect();
    let mut used: usize = counts.iter().sum();

    // Hand out the remainder by largest fractional share.
    let mut order: Vec<usize> = (0..moments.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = shares[a] - shares[a].floor();
        let fb = shares[b] - shares[b].floor();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });

    for &i in &order {
        if used >= budget {
            break;
        }
        counts[i] += 1;
        used += 1;
    }

    counts
}
