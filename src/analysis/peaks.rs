//! Peak detection primitives on uniformly indexed signals.
//!
//! Peaks are local maxima (flat tops report their middle sample). A peak's
//! prominence is its height above the higher of the two lowest points
//! reached on each side before the signal climbs above the peak again.
//! Valleys are found by running the same routines on the negated signal.

/// A detected peak with its prominence data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub prominence: f64,
    pub left_base: usize,
    pub right_base: usize,
}

/// Indices of all local maxima, excluding the two end samples.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left = i;
                let right = ahead - 1;
                peaks.push((left + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Prominence and bases of each peak in `peaks`.
pub fn prominences(x: &[f64], peaks: &[usize]) -> Vec<Peak> {
    peaks
        .iter()
        .map(|&peak| {
            let top = x[peak];

            let mut left_base = peak;
            let mut left_min = top;
            let mut i = peak;
            loop {
                if x[i] > top {
                    break;
                }
                if x[i] < left_min {
                    left_min = x[i];
                    left_base = i;
                }
                if i == 0 {
                    break;
                }
                i -= 1;
            }

            let mut right_base = peak;
            let mut right_min = top;
            for (j, &v) in x.iter().enumerate().skip(peak) {
                if v > top {
                    break;
                }
                if v < right_min {
                    right_min = v;
                    right_base = j;
                }
            }

            Peak {
                index: peak,
                prominence: top - left_min.max(right_min),
                left_base,
                right_base,
            }
        })
        .collect()
}

/// Keep-mask after enforcing a minimum index spacing between peaks. Higher
/// `priority` wins; `peaks` must be ascending.
pub fn select_by_distance(peaks: &[usize], priority: &[f64], distance: usize) -> Vec<bool> {
    let n = peaks.len();
    let mut keep = vec![true; n];
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| priority[a].total_cmp(&priority[b]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..n {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }
    keep
}

/// Local maxima of `x` with prominence of at least `min_prominence`, thinned
/// so that no two survivors are closer than `distance` samples (the more
/// prominent one is kept). Result is in ascending index order.
pub fn find_peaks(x: &[f64], min_prominence: f64, distance: usize) -> Vec<Peak> {
    let candidates: Vec<Peak> = prominences(x, &local_maxima(x))
        .into_iter()
        .filter(|p| p.prominence >= min_prominence)
        .collect();

    if distance <= 1 {
        return candidates;
    }
    let indices: Vec<usize> = candidates.iter().map(|p| p.index).collect();
    let priority: Vec<f64> = candidates.iter().map(|p| p.prominence).collect();
    let keep = select_by_distance(&indices, &priority, distance);

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

/// Width of each peak, in samples, at `rel_height` of its prominence below
/// the top. Crossings are linearly interpolated between samples and searched
/// only within the peak's bases.
pub fn widths(x: &[f64], peaks: &[Peak], rel_height: f64) -> Vec<f64> {
    peaks
        .iter()
        .map(|p| {
            let height = x[p.index] - p.prominence * rel_height;

            let mut i = p.index;
            while p.left_base < i && height < x[i] {
                i -= 1;
            }
            let mut left = i as f64;
            if x[i] < height {
                left += (height - x[i]) / (x[i + 1] - x[i]);
            }

            let mut i = p.index;
            while i < p.right_base && height < x[i] {
                i += 1;
            }
            let mut right = i as f64;
            if x[i] < height {
                right -= (height - x[i]) / (x[i - 1] - x[i]);
            }

            right - left
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_maxima_handles_plateaus_and_edges() {
        let x = [5.0, 1.0, 3.0, 3.0, 3.0, 1.0, 2.0, 0.0, 4.0];
        assert_eq!(local_maxima(&x), vec![3, 6]);
        assert!(local_maxima(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn prominence_uses_higher_base() {
        //            0    1    2    3    4    5    6
        let x = [0.0, 2.0, 1.0, 5.0, -1.0, 0.5, 0.0];
        let p = prominences(&x, &[1, 3, 5]);
        assert_eq!(p[0].prominence, 1.0);
        assert_eq!((p[0].left_base, p[0].right_base), (0, 2));
        assert_eq!(p[1].prominence, 5.0);
        assert_eq!((p[1].left_base, p[1].right_base), (0, 4));
        assert_eq!(p[2].prominence, 0.5);
    }

    #[test]
    fn distance_keeps_most_prominent() {
        let x = [0.0, 3.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        let found: Vec<usize> = find_peaks(&x, 1.0, 3).iter().map(|p| p.index).collect();
        assert_eq!(found, vec![3, 8]);
        let all: Vec<usize> = find_peaks(&x, 1.0, 1).iter().map(|p| p.index).collect();
        assert_eq!(all, vec![1, 3, 8]);
        assert_eq!(find_peaks(&x, 2.5, 1).len(), 2);
    }

    #[test]
    fn width_of_triangle_at_half_height() {
        let x = [0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0, 0.0, 0.0];
        let peaks = find_peaks(&x, 1.0, 1);
        assert_eq!(peaks.len(), 1);
        let w = widths(&x, &peaks, 0.5);
        assert!((w[0] - 4.0).abs() < 1e-12);
        let w = widths(&x, &peaks, 1.0);
        assert!((w[0] - 8.0).abs() < 1e-12);
    }
}
