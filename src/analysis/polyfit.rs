use crate::error::{Error, Result};

/// Least-squares polynomial in a centred, scaled variable
/// `t = (x - center) / scale`, which keeps the normal equations well
/// conditioned for wavelength-sized abscissae.
#[derive(Debug, Clone)]
pub struct Polynomial {
    /// Ascending powers of `t`.
    coeffs: Vec<f64>,
    center: f64,
    scale: f64,
}

impl Polynomial {
    pub fn eval(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    pub fn order(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }
}

/// Fit a polynomial of `order` to `(x, y)`.
pub fn polyfit(x: &[f64], y: &[f64], order: usize) -> Result<Polynomial> {
    if x.len() != y.len() {
        return Err(Error::Input(format!(
            "polyfit: x has {} samples, y has {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() <= order {
        return Err(Error::Input(format!(
            "polyfit: {} samples cannot determine an order {order} polynomial",
            x.len()
        )));
    }

    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let center = 0.5 * (lo + hi);
    let half_span = 0.5 * (hi - lo);
    let scale = if half_span > 0.0 && half_span.is_finite() {
        half_span
    } else {
        1.0
    };

    let t: Vec<f64> = x.iter().map(|&v| (v - center) / scale).collect();
    let coeffs = fit_coefficients(&t, y, order)
        .ok_or_else(|| Error::Input("polyfit: abscissa is degenerate".into()))?;
    Ok(Polynomial {
        coeffs,
        center,
        scale,
    })
}

/// Solve the normal equations for ascending-power coefficients of `t`.
/// `None` when the system is singular.
pub(crate) fn fit_coefficients(t: &[f64], y: &[f64], order: usize) -> Option<Vec<f64>> {
    let m = order + 1;

    // power sums Σ t^k for k in 0..=2*order
    let mut sums = vec![0.0; 2 * order + 1];
    let mut rhs = vec![0.0; m];
    for (&ti, &yi) in t.iter().zip(y) {
        let mut p = 1.0;
        for (k, s) in sums.iter_mut().enumerate() {
            *s += p;
            if k < m {
                rhs[k] += p * yi;
            }
            p *= ti;
        }
    }

    let mut a: Vec<Vec<f64>> = (0..m)
        .map(|r| (0..m).map(|c| sums[r + c]).collect())
        .collect();
    solve(&mut a, &mut rhs)?;
    Some(rhs)
}

/// Gaussian elimination with partial pivoting; the solution replaces `b`.
fn solve(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<()> {
    let n = b.len();
    let tol = a
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0, f64::max)
        * 1e-12;

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        let p = a[pivot][col].abs();
        if p.is_nan() || p <= tol {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * b[k]).sum();
        b[row] = (b[row] - tail) / a[row][row];
    }
    Some(())
}
