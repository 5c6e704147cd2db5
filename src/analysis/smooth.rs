use super::polyfit::fit_coefficients;
use crate::error::{Error, Result};

/// Savitzky–Golay smoothing: each sample is replaced by the value at that
/// sample of a least-squares polynomial of `order` fitted over `window`
/// neighbouring samples. Near the ends the window is pinned to the first or
/// last `window` samples instead of being padded.
pub fn savgol(y: &[f64], window: usize, order: usize) -> Result<Vec<f64>> {
    if order >= window {
        return Err(Error::Input(format!(
            "savgol: polynomial order {order} must be less than window {window}"
        )));
    }
    if window > y.len() {
        return Err(Error::Input(format!(
            "savgol: window {window} exceeds trace length {}",
            y.len()
        )));
    }

    let half = window / 2;
    let scale = half.max(1) as f64;
    let n = y.len();

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - window);
            let t: Vec<f64> = (start..start + window)
                .map(|j| (j as f64 - i as f64) / scale)
                .collect();
            let coeffs = fit_coefficients(&t, &y[start..start + window], order)
                .ok_or_else(|| Error::Input("savgol: singular window fit".into()))?;
            Ok(coeffs[0])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_polynomials_up_to_order() {
        let y: Vec<f64> = (0..20).map(|i| 0.5 * (i as f64).powi(2) - i as f64).collect();
        let s = savgol(&y, 7, 2).unwrap();
        for (a, b) in y.iter().zip(&s) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn averages_out_alternating_noise() {
        let y: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let s = savgol(&y, 5, 0).unwrap();
        for v in &s[2..28] {
            assert!(v.abs() <= 0.2 + 1e-12);
        }
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(savgol(&[1.0; 4], 5, 2).is_err());
        assert!(savgol(&[1.0; 10], 3, 3).is_err());
    }
}
