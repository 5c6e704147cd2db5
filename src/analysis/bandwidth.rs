use log::debug;
use serde::{Deserialize, Serialize};

use super::smooth::savgol;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthParams {
    /// GHz; the S21 level here is the 0 dB reference.
    pub reference_frequency: f64,
    /// dB below the reference that defines the band edge.
    pub drop_levels: f64,
    /// Savitzky–Golay window in samples; below 3 disables smoothing.
    pub smooth_window: usize,
    pub poly_order: usize,
}

impl Default for BandwidthParams {
    fn default() -> Self {
        Self {
            reference_frequency: 0.5,
            drop_levels: 3.0,
            smooth_window: 0,
            poly_order: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bandwidth {
    /// Crossing frequency minus the reference frequency, GHz.
    pub bandwidth_ghz: f64,
    pub crossing_ghz: f64,
    pub reference_level_db: f64,
}

/// Electro-optic bandwidth from an S21 magnitude trace (GHz, dB): the
/// distance from the reference frequency to the first frequency where S21
/// falls `drop_levels` below its value at the reference.
pub fn analyze_bandwidth(
    frequency: &[f64],
    s21_db: &[f64],
    params: &BandwidthParams,
) -> Result<Bandwidth> {
    if frequency.len() != s21_db.len() {
        return Err(Error::Input(format!(
            "frequency has {} samples, S21 has {}",
            frequency.len(),
            s21_db.len()
        )));
    }
    if frequency.len() < 2 {
        return Err(Error::Input("need at least two S21 samples".into()));
    }

    let smoothed;
    let level: &[f64] = if params.smooth_window >= 3 && params.poly_order < params.smooth_window {
        smoothed = savgol(s21_db, params.smooth_window, params.poly_order)?;
        &smoothed
    } else {
        s21_db
    };

    let reference_idx = frequency
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_nan())
        .min_by(|(_, a), (_, b)| {
            (*a - params.reference_frequency)
                .abs()
                .total_cmp(&(*b - params.reference_frequency).abs())
        })
        .map(|(i, _)| i)
        .ok_or_else(|| Error::Input("frequency axis has no valid samples".into()))?;
    let reference_level_db = level[reference_idx];
    let target = reference_level_db - params.drop_levels;

    let crossing_ghz = frequency
        .windows(2)
        .zip(level.windows(2))
        .find_map(|(f, s)| {
            if s[0] == s[1] || s[0].is_nan() || s[1].is_nan() {
                return None;
            }
            if (s[0] > target) == (s[1] > target) {
                return None;
            }
            Some(f[0] + (target - s[0]) * (f[1] - f[0]) / (s[1] - s[0]))
        })
        .ok_or_else(|| {
            Error::Input(format!(
                "S21 never crosses {target:.3} dB ({} dB below reference)",
                params.drop_levels
            ))
        })?;

    debug!("bandwidth: reference {reference_level_db:.3} dB, crossing at {crossing_ghz:.4} GHz");
    Ok(Bandwidth {
        bandwidth_ghz: crossing_ghz - params.reference_frequency,
        crossing_ghz,
        reference_level_db,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<f64> {
        (1..=4000).map(|i| i as f64 * 0.01).collect()
    }

    #[test]
    fn interpolates_linear_rolloff() {
        let f = grid();
        let s: Vec<f64> = f.iter().map(|&v| -0.2 * v).collect();
        let bw = analyze_bandwidth(&f, &s, &BandwidthParams::default()).unwrap();
        // -0.1 dB at 0.5 GHz, -3.1 dB at 15.5 GHz
        assert!((bw.crossing_ghz - 15.5).abs() < 1e-6);
        assert!((bw.bandwidth_ghz - 15.0).abs() < 1e-6);
        assert!((bw.reference_level_db + 0.1).abs() < 1e-12);
    }

    #[test]
    fn smoothing_keeps_quadratic_rolloff() {
        let f = grid();
        let s: Vec<f64> = f.iter().map(|&v| -0.01 * v * v).collect();
        let params = BandwidthParams {
            smooth_window: 11,
            poly_order: 2,
            ..Default::default()
        };
        let bw = analyze_bandwidth(&f, &s, &params).unwrap();
        let expected = (3.0f64 / 0.01 + 0.25).sqrt();
        assert!((bw.crossing_ghz - expected).abs() < 1e-3);
    }

    #[test]
    fn missing_crossing_is_an_error() {
        let f = grid();
        let s = vec![-1.0; f.len()];
        assert!(matches!(
            analyze_bandwidth(&f, &s, &BandwidthParams::default()),
            Err(Error::Input(_))
        ));
        assert!(analyze_bandwidth(&f, &s[1..], &BandwidthParams::default()).is_err());
    }
}
