//! Ring-resonator valley scan: baseline removal, valley detection and the
//! per-resonance metrics derived from it.

use log::debug;
use serde::{Deserialize, Serialize};

use super::peaks::{find_peaks, prominences, widths};
use super::polyfit::polyfit;
use super::{median, wavelength_to_ghz};
use crate::error::{Error, Result};

pub const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValleyParams {
    /// Minimum valley depth below the levelled baseline, dB.
    pub prominence: f64,
    /// Minimum spacing between accepted valleys, samples.
    pub distance: usize,
    pub baseline_order: usize,
}

impl Default for ValleyParams {
    fn default() -> Self {
        Self {
            prominence: 2.0,
            distance: 5,
            baseline_order: 3,
        }
    }
}

/// Per-valley metrics, one entry per accepted valley in ascending sample
/// order. All sequences are empty when fewer than two valleys were found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValleyAnalysis {
    pub index: Vec<usize>,
    pub wavelength_nm: Vec<f64>,
    pub frequency_ghz: Vec<f64>,
    pub extinction_ratio_db: Vec<f64>,
    pub fsr_nm: Vec<f64>,
    pub fsr_ghz: Vec<f64>,
    pub fwhm_nm: Vec<f64>,
    pub fwhm_ghz: Vec<f64>,
    pub q_factor: Vec<f64>,
}

/// One row of a [`ValleyAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resonance {
    pub index: usize,
    pub wavelength_nm: f64,
    pub frequency_ghz: f64,
    pub extinction_ratio_db: f64,
    pub fsr_nm: f64,
    pub fsr_ghz: f64,
    pub fwhm_nm: f64,
    pub fwhm_ghz: f64,
    pub q_factor: f64,
}

impl ValleyAnalysis {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn resonances(&self) -> Vec<Resonance> {
        (0..self.len())
            .map(|i| Resonance {
                index: self.index[i],
                wavelength_nm: self.wavelength_nm[i],
                frequency_ghz: self.frequency_ghz[i],
                extinction_ratio_db: self.extinction_ratio_db[i],
                fsr_nm: self.fsr_nm[i],
                fsr_ghz: self.fsr_ghz[i],
                fwhm_nm: self.fwhm_nm[i],
                fwhm_ghz: self.fwhm_ghz[i],
                q_factor: self.q_factor[i],
            })
            .collect()
    }
}

/// Scan a wavelength/insertion-loss trace (nm, dB) for resonance valleys.
pub fn analyze_valleys(x: &[f64], y_db: &[f64], params: &ValleyParams) -> Result<ValleyAnalysis> {
    if x.len() != y_db.len() {
        return Err(Error::Input(format!(
            "x has {} samples, y has {}",
            x.len(),
            y_db.len()
        )));
    }
    if x.len() < MIN_SAMPLES {
        return Err(Error::Input(format!(
            "{} samples, need at least {MIN_SAMPLES}",
            x.len()
        )));
    }
    if let Some(i) = x
        .iter()
        .zip(y_db)
        .position(|(xi, yi)| !xi.is_finite() || !yi.is_finite())
    {
        return Err(Error::Input(format!(
            "sample {i} is not finite (x = {}, y = {})",
            x[i], y_db[i]
        )));
    }
    if params.distance == 0 {
        return Err(Error::Input("valley distance must be at least 1".into()));
    }

    let baseline = polyfit(x, y_db, params.baseline_order)?;
    let levelled: Vec<f64> = x
        .iter()
        .zip(y_db)
        .map(|(&xi, &yi)| yi - baseline.eval(xi))
        .collect();

    let inverted: Vec<f64> = levelled.iter().map(|v| -v).collect();
    let valleys = find_peaks(&inverted, params.prominence, params.distance);
    debug!("valley scan: {} valleys", valleys.len());
    if valleys.len() < 2 {
        return Ok(ValleyAnalysis::default());
    }

    let index: Vec<usize> = valleys.iter().map(|v| v.index).collect();
    let wavelength_nm: Vec<f64> = index.iter().map(|&i| x[i]).collect();
    let frequency_ghz: Vec<f64> = wavelength_nm.iter().map(|&w| wavelength_to_ghz(w)).collect();

    let fsr_nm = neighbour_spacing(&wavelength_nm, |earlier, later| later - earlier);
    let fsr_ghz = neighbour_spacing(&frequency_ghz, |earlier, later| earlier - later);

    let extinction_ratio_db: Vec<f64> = valleys.iter().map(|v| v.prominence).collect();

    // half maximum is taken in linear transmission
    let inverted_linear: Vec<f64> = levelled.iter().map(|v| -(10f64.powf(v / 10.0))).collect();
    let linear_valleys = prominences(&inverted_linear, &index);
    let width_samples = widths(&inverted_linear, &linear_valleys, 0.5);

    let x_step = median(&diffs(x));
    let f_axis: Vec<f64> = x.iter().map(|&w| wavelength_to_ghz(w)).collect();
    let f_step = -median(&diffs(&f_axis));

    let fwhm_nm: Vec<f64> = width_samples.iter().map(|w| w * x_step).collect();
    let fwhm_ghz: Vec<f64> = width_samples.iter().map(|w| w * f_step).collect();
    let q_factor: Vec<f64> = wavelength_nm
        .iter()
        .zip(&fwhm_nm)
        .map(|(w, fw)| w / fw)
        .collect();

    Ok(ValleyAnalysis {
        index,
        wavelength_nm,
        frequency_ghz,
        extinction_ratio_db,
        fsr_nm,
        fsr_ghz,
        fwhm_nm,
        fwhm_ghz,
        q_factor,
    })
}

fn diffs(v: &[f64]) -> Vec<f64> {
    v.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Larger of the spacings to the previous and next feature. `spacing` gets
/// `(earlier, later)`; a missing neighbour never wins.
fn neighbour_spacing(pos: &[f64], spacing: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    (0..pos.len())
        .map(|i| {
            let forward = pos.get(i + 1).map_or(f64::NAN, |&next| spacing(pos[i], next));
            let backward = if i > 0 {
                spacing(pos[i - 1], pos[i])
            } else {
                f64::NAN
            };
            forward.max(backward)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lorentzian dips (linear transmission) multiplied together, in dB.
    fn comb(x: &[f64], centers: &[f64], depth: f64, half_width: f64) -> Vec<f64> {
        x.iter()
            .map(|&v| {
                let t: f64 = centers
                    .iter()
                    .map(|&c| 1.0 - depth * half_width.powi(2) / ((v - c).powi(2) + half_width.powi(2)))
                    .product();
                10.0 * t.log10()
            })
            .collect()
    }

    #[test]
    fn neighbour_spacing_prefers_larger_gap() {
        let s = neighbour_spacing(&[1.0, 2.0, 4.0, 5.0], |a, b| b - a);
        assert_eq!(s, vec![1.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn finds_evenly_spaced_resonances() {
        let x: Vec<f64> = (0..200).map(|i| 1545.0 + i as f64 * 0.05).collect();
        let centers: Vec<f64> = (0..10).map(|k| 1545.5 + k as f64).collect();
        let y = comb(&x, &centers, 0.9, 0.05);

        let r = analyze_valleys(&x, &y, &ValleyParams::default()).unwrap();
        assert_eq!(r.len(), 10);
        for (found, expected) in r.wavelength_nm.iter().zip(&centers) {
            assert!((found - expected).abs() < 1e-6);
        }
        for fsr in &r.fsr_nm {
            assert!((fsr - 1.0).abs() < 1e-2);
        }
        for (fsr_ghz, f) in r.fsr_ghz.iter().zip(&r.frequency_ghz) {
            assert!(*fsr_ghz > 0.0);
            // Δf ≈ f · Δλ / λ
            let approx = f / 1550.0;
            assert!((fsr_ghz - approx).abs() / approx < 0.01);
        }
        for er in &r.extinction_ratio_db {
            assert!((er - 10.0).abs() < 0.5, "er {er}");
        }
        for fwhm in &r.fwhm_nm {
            assert!((fwhm - 0.1).abs() < 5e-3, "fwhm {fwhm}");
        }
        for (q, w) in r.q_factor.iter().zip(&r.wavelength_nm) {
            let expected = w / 0.1;
            assert!((q - expected).abs() / expected < 0.05);
        }
        assert!(r.fwhm_ghz.iter().all(|&v| v > 0.0));
        assert_eq!(r.resonances().len(), 10);
    }

    #[test]
    fn nan_sample_is_input_error_not_empty() {
        let x: Vec<f64> = (0..200).map(|i| 1545.0 + i as f64 * 0.05).collect();
        let centers: Vec<f64> = (0..10).map(|k| 1545.5 + k as f64).collect();
        let mut y = comb(&x, &centers, 0.9, 0.05);
        y[57] = f64::NAN;

        match analyze_valleys(&x, &y, &ValleyParams::default()) {
            Err(Error::Input(msg)) => assert!(msg.contains("sample 57"), "{msg}"),
            other => panic!("expected input error, got {other:?}"),
        }

        let mut x = x;
        y[57] = -1.0;
        x[3] = f64::NAN;
        assert!(matches!(
            analyze_valleys(&x, &y, &ValleyParams::default()),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn single_valley_degrades_to_empty() {
        let x: Vec<f64> = (0..100).map(|i| 1550.0 + i as f64 * 0.01).collect();
        let y = comb(&x, &[1550.5], 0.9, 0.02);
        let r = analyze_valleys(&x, &y, &ValleyParams::default()).unwrap();
        assert!(r.is_empty());
        assert!(r.fsr_nm.is_empty() && r.q_factor.is_empty());
    }

    #[test]
    fn flat_minimum_length_trace_is_empty() {
        let x: Vec<f64> = (0..10).map(|i| 1550.0 + i as f64).collect();
        let y = vec![-3.0; 10];
        let r = analyze_valleys(&x, &y, &ValleyParams::default()).unwrap();
        assert_eq!(r, ValleyAnalysis::default());
    }

    #[test]
    fn rejects_short_or_mismatched_input() {
        let x: Vec<f64> = (0..9).map(|i| i as f64).collect();
        assert!(matches!(
            analyze_valleys(&x, &x, &ValleyParams::default()),
            Err(Error::Input(_))
        ));
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        assert!(matches!(
            analyze_valleys(&x, &x[..11], &ValleyParams::default()),
            Err(Error::Input(_))
        ));
    }
}
