use std::path::Path;

use anyhow::{Context, Result};

/// Lorentzian dip in linear transmission.
fn lorentzian_dip(wl: f64, center: f64, half_width: f64, depth: f64) -> f64 {
    1.0 - depth * half_width.powi(2) / ((wl - center).powi(2) + half_width.powi(2))
}

/// Insertion loss (dB) of a ring with evenly spaced resonances plus a gentle
/// grating-coupler roll-off.
fn ring_spectrum(
    wavelengths_nm: &[f64],
    fsr_nm: f64,
    half_width_nm: f64,
    depth: f64,
    noise_db: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    let first = wavelengths_nm[0] + fsr_nm / 2.0;
    let last = wavelengths_nm[wavelengths_nm.len() - 1];
    let centers: Vec<f64> = (0..)
        .map(|k| first + k as f64 * fsr_nm)
        .take_while(|&c| c < last)
        .collect();

    wavelengths_nm
        .iter()
        .map(|&wl| {
            let t: f64 = centers
                .iter()
                .map(|&c| lorentzian_dip(wl, c, half_width_nm, depth))
                .product();
            let envelope = -6.0 - 0.002 * (wl - 1550.0).powi(2);
            envelope + 10.0 * t.log10() + rng.gauss(0.0, noise_db)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn write_sweep(path: &Path, wavelengths_nm: &[f64], loss_db: &[f64]) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let step = wavelengths_nm[1] - wavelengths_nm[0];
    w.write_record(["WavelengthStart", &format!("{:e}", wavelengths_nm[0] * 1e-9), "m"])?;
    w.write_record([
        "WavelengthStop",
        &format!("{:e}", wavelengths_nm[wavelengths_nm.len() - 1] * 1e-9),
        "m",
    ])?;
    w.write_record(["WavelengthStep", &format!("{:e}", step * 1e-9), "m"])?;
    w.write_record(["SweepRate", "10", "nm/s"])?;
    w.write_record(["=== Average IL (TLS 0) ==="])?;
    for (wl, il) in wavelengths_nm.iter().zip(loss_db) {
        w.write_record([format!("{:e}", wl * 1e-9), format!("{il:.4}")])?;
    }
    w.write_record(["=== Mueller Row 1 (TLS 0) ==="])?;
    w.flush()?;
    Ok(())
}

/// Single-pole modulator response, S21 only; reflections are small constants.
fn write_s2p(path: &Path, f3db_ghz: f64, rng: &mut SimpleRng) -> Result<()> {
    let mut text = String::from("! synthetic modulator response\n# Hz S RI R 50\n");
    for i in 1..=400 {
        let f_ghz = i as f64 * 0.1;
        let x = f_ghz / f3db_ghz;
        let mag = 0.5 / (1.0 + x * x).sqrt() * (1.0 + rng.gauss(0.0, 0.002));
        let phase = -x.atan();
        let (re, im) = (mag * phase.cos(), mag * phase.sin());
        text.push_str(&format!(
            "{:e} 0.05 0.0 {re:e} {im:e} {re:e} {im:e} 0.05 0.0\n",
            f_ghz * 1e9
        ));
    }
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    let out = std::env::args().nth(1).unwrap_or_else(|| "sample_data".into());
    let out = Path::new(&out);
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let mut rng = SimpleRng::new(42);

    // 1540 → 1560 nm, 5 pm step
    let wavelengths: Vec<f64> = (0..4001).map(|i| 1540.0 + i as f64 * 0.005).collect();

    let devices = [("MRM031", 1.6, 0.02), ("MRM032", 1.8, 0.03), ("MRM033", 2.0, 0.025)];
    let biases_mv = [0, 500, 1000];

    let mut written = 0;
    for (die, &(device, fsr, hw)) in devices.iter().enumerate() {
        for (rep, &bias) in biases_mv.iter().enumerate() {
            let loss = ring_spectrum(&wavelengths, fsr, hw, 0.92, 0.02, &mut rng);
            let name = format!(
                "SPCM_W001_DOE1_die{}_C1_{device}_25C_rep{}_ch_1_2_-10dBm_SMU_pn_1_{bias}mV.csv",
                die + 1,
                rep + 1
            );
            write_sweep(&out.join(name), &wavelengths, &loss)?;
            written += 1;
        }

        let name = format!(
            "SPRF_W001_DOE1_C1_die{}_1_25C_#1_{device}_ch_3_4_0dBm_arg_2V.s2p",
            die + 1
        );
        write_s2p(&out.join(name), 20.0 + 5.0 * die as f64, &mut rng)?;
        written += 1;
    }

    std::fs::write(out.join("SPCM_untagged_sweep.csv"), "")?;

    println!("Wrote {written} measurement files to {}", out.display());
    Ok(())
}
