/// Peak detection over a raw series: local maxima filtered by
/// prominence (vertical drop to the higher flanking minimum) with a
/// minimum spacing between surviving peaks.

/// Indices of peaks at least `prominence` above their higher flanking
/// minimum and at least `distance` samples apart. Higher peaks win
/// spacing conflicts.
pub fn find_peaks(xs: &[f64], distance: usize, prominence: f64) -> Vec<usize> {
    let candidates = local_maxima(xs);

    let mut prominent: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| peak_prominence(xs, i) >= prominence)
        .collect();

    if distance > 1 {
        // Resolve spacing by priority: keep from highest to lowest,
        // discarding anything too close to an already-kept peak.
        let mut by_height = prominent.clone();
        by_height.sort_by(|&a, &b| xs[b].partial_cmp(&xs[a]).unwrap_or(std::cmp::Ordering::Equal));

        let mut keep = vec![false; xs.len()];
        let mut removed = vec![false; xs.len()];
        for &i in &by_height {
            if removed[i] {
                continue;
            }
            keep[i] = true;
            for &j in &prominent {
                if j != i && j.abs_diff(i) < distance {
                    removed[j] = true;
                }
            }
        }
        prominent.retain(|&i| keep[i]);
    }

    prominent
}

/// Troughs are peaks of the negated series.
pub fn find_troughs(xs: &[f64], distance: usize, prominence: f64) -> Vec<usize> {
    let negated: Vec<f64> = xs.iter().map(|v| -v).collect();
    find_peaks(&negated, distance, prominence)
}

/// Strict local maxima; flat tops report their midpoint.
fn local_maxima(xs: &[f64]) -> Vec<usize> {
    let mut out = Vec::new();
    let n = xs.len();
    let mut i = 1;
    while n >= 3 && i < n - 1 {
        if xs[i] > xs[i - 1] {
            // Walk across a possible plateau.
            let mut j = i;
            while j + 1 < n && xs[j + 1] == xs[i] {
                j += 1;
            }
            if j + 1 < n && xs[j + 1] < xs[i] {
                out.push((i + j) / 2);
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    out
}

/// Vertical drop from the peak to the higher of the two flanking
/// minima, searching outwards until a strictly higher sample or the
/// series edge.
fn peak_prominence(xs: &[f64], peak: usize) -> f64 {
    let height = xs[peak];

    let mut left_min = height;
    for i in (0..peak).rev() {
        if xs[i] > height {
            break;
        }
        if xs[i] < left_min {
            left_min = xs[i];
        }
    }

    let mut right_min = height;
    for &x in &xs[peak + 1..] {
        if x > height {
            break;
        }
        if x < right_min {
            right_min = x;
        }
    }

    height - left_min.max(right_min)
}

/// Full range of the finite values, used to scale relative prominence.
pub fn finite_range(xs: &[f64]) -> f64 {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for &x in xs {
        if x.is_finite() {
            min = min.min(x);
            max = max.max(x);
        }
    }
    if min > max { 0.0 } else { max - min }
}
