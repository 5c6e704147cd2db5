//! Signal processing over traces produced by [`crate::data::loader`].
//!
//! Everything here is a pure function of its inputs; nothing is cached
//! between calls.

pub mod bandwidth;
pub mod peaks;
pub mod polyfit;
pub mod resonance;
pub mod smooth;

pub use bandwidth::{analyze_bandwidth, Bandwidth, BandwidthParams};
pub use resonance::{analyze_valleys, Resonance, ValleyAnalysis, ValleyParams};

/// m/s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Optical frequency in GHz for a vacuum wavelength in nm.
pub fn wavelength_to_ghz(nm: f64) -> f64 {
    SPEED_OF_LIGHT / nm
}

/// Median ignoring NaN; NaN for an empty or all-NaN input.
pub(crate) fn median(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        0.5 * (v[mid - 1] + v[mid])
    } else {
        v[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn c_band_frequency() {
        assert!((wavelength_to_ghz(1550.0) - 193_414.489).abs() < 1e-2);
    }
}
