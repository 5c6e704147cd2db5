use std::path::Path;

use csv::StringRecord;
use log::{debug, info};
use num_complex::Complex64;

use super::model::{NetworkTable, SweepHeader, SweepTable};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// A trace read from one instrument file.
#[derive(Debug, Clone)]
pub enum Trace {
    Sweep(SweepTable),
    Network(NetworkTable),
}

/// Load a trace from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`        – wavelength sweep exported by the swept-laser system
/// * `.s2p` `.txt` – network analyzer two-port data, real/imaginary pairs
pub fn load_trace(path: &Path) -> Result<Trace> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => read_sweep(path).map(Trace::Sweep),
        "s2p" | "txt" => read_network_params(path).map(Trace::Network),
        other => Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("unsupported file extension: .{other}"),
        }),
    }
}

/// Cells that fail to parse become NaN instead of failing the row.
fn to_float(cell: &str) -> f64 {
    cell.trim().parse().unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// Wavelength sweep CSV
// ---------------------------------------------------------------------------

const SECTION_MIN_PREFIX: &str = "=== Min";
const SECTION_AVERAGE_IL: &str = "=== Average IL (TLS 0) ===";
const SECTION_END: &str = "=== Mueller Row 1 (TLS 0) ===";

const HEADER_KEYS: [&str; 4] = ["WavelengthStart", "WavelengthStop", "WavelengthStep", "SweepRate"];

/// Wavelength column is stored in metres.
const METRES_TO_NM: f64 = 1e9;

fn is_section_start(row: &StringRecord) -> bool {
    row.iter()
        .any(|c| c == SECTION_AVERAGE_IL || c.starts_with(SECTION_MIN_PREFIX))
}

fn is_section_end(row: &StringRecord) -> bool {
    row.iter().any(|c| c == SECTION_END)
}

/// CSV layout:
///
/// ```text
/// WavelengthStart,1.5e-06,m
/// WavelengthStop,1.6e-06,m
/// ...
/// === Average IL (TLS 0) ===
/// 1.5e-06,-3.21,-3.40
/// ...
/// === Mueller Row 1 (TLS 0) ===      (optional, ends the block)
/// ```
///
/// Header rows before the data block keep their `(value, unit)` cells.
pub fn read_sweep(path: &Path) -> Result<SweepTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut header = SweepHeader::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut in_data = false;

    for result in reader.records() {
        let row = result.map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        if !in_data && is_section_start(&row) {
            in_data = true;
            continue;
        }
        if is_section_end(&row) {
            break;
        }
        if in_data {
            let values: Vec<f64> = row.iter().map(to_float).collect();
            if let Some(first) = rows.first() {
                if first.len() != values.len() {
                    return Err(Error::Shape {
                        path: path.to_path_buf(),
                        line: row.position().map_or(0, |p| p.line() as usize),
                        reason: format!(
                            "row has {} cells but the data block has {}",
                            values.len(),
                            first.len()
                        ),
                    });
                }
            }
            rows.push(values);
        } else if let Some(key) = row.get(0).filter(|k| HEADER_KEYS.contains(k)) {
            let value = row.get(1).unwrap_or("").to_string();
            let unit = row.get(2).unwrap_or("").to_string();
            header.insert(key.to_string(), (value, unit));
        }
    }

    if !in_data {
        return Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "no recognized data section marker".into(),
        });
    }

    for row in &mut rows {
        if let Some(w) = row.first_mut() {
            *w *= METRES_TO_NM;
        }
    }

    info!(
        "{}: {} sweep points, {} header entries",
        path.display(),
        rows.len(),
        header.len()
    );
    Ok(SweepTable { header, rows })
}

// ---------------------------------------------------------------------------
// Network analyzer S-parameters
// ---------------------------------------------------------------------------

/// frequency + four real/imaginary pairs
const NETWORK_FIELDS: usize = 9;
const HZ_TO_GHZ: f64 = 1e9;

/// Whitespace-delimited text. Everything up to and including the first line
/// whose first field contains `#` is header; every non-blank line after it
/// is `f re11 im11 re21 im21 re12 im12 re22 im22`.
pub fn read_network_params(path: &Path) -> Result<NetworkTable> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let mut table = NetworkTable::default();
    let mut in_data = false;

    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = fields.first() else {
            continue;
        };

        if !in_data {
            if first.contains('#') {
                in_data = true;
            }
            continue;
        }
        if first.starts_with('!') {
            continue;
        }
        if fields.len() < NETWORK_FIELDS {
            return Err(Error::Shape {
                path: path.to_path_buf(),
                line: line_no + 1,
                reason: format!(
                    "expected at least {NETWORK_FIELDS} fields, found {}",
                    fields.len()
                ),
            });
        }

        let v: Vec<f64> = fields.iter().map(|f| to_float(f)).collect();
        let pair = |i: usize| Complex64::new(v[i], v[i + 1]);
        table.frequency_ghz.push(v[0] / HZ_TO_GHZ);
        table.s11.push(pair(1));
        table.s21.push(pair(3));
        table.s12.push(pair(5));
        table.s22.push(pair(7));
    }

    if !in_data {
        return Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "no '#' option line before the data block".into(),
        });
    }

    debug!("{}: {} frequency points", path.display(), table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn sweep_reads_header_and_scales_wavelength() {
        let f = write_temp(
            ".csv",
            "Instrument,CT440\n\
             WavelengthStart,1.5e-06,m\n\
             WavelengthStop,1.6e-06,m\n\
             SweepRate,10,nm/s\n\
             === Average IL (TLS 0) ===\n\
             1.5e-06,-3.5,-4.0\n\
             1.5001e-06,oops,-4.1\n\
             1.5002e-06,-3.7,-4.2\n",
        );
        let table = read_sweep(f.path()).unwrap();
        assert_eq!(table.header["WavelengthStart"], ("1.5e-06".into(), "m".into()));
        assert_eq!(table.header["SweepRate"], ("10".into(), "nm/s".into()));
        assert!(!table.header.contains_key("Instrument"));
        assert_eq!(table.len(), 3);
        assert!((table.rows[0][0] - 1500.0).abs() < 1e-9);
        assert!((table.rows[1][0] - 1500.1).abs() < 1e-9);
        assert!(table.rows[1][1].is_nan());
        assert_eq!(table.rows[1][2], -4.1);
        assert_eq!(table.rows[2][1], -3.7);
        assert_eq!(table.channel(1).unwrap(), vec![-4.0, -4.1, -4.2]);
    }

    #[test]
    fn sweep_stops_at_mueller_block() {
        let f = write_temp(
            ".csv",
            "=== Min IL (TLS 0) ===\n\
             1.55e-06,-1\n\
             1.56e-06,-2\n\
             === Mueller Row 1 (TLS 0) ===\n\
             1.55e-06,0.5\n",
        );
        let table = read_sweep(f.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.wavelength_nm().len(), 2);
    }

    #[test]
    fn sweep_without_marker_is_unsupported() {
        let f = write_temp(".csv", "a,b\n1,2\n");
        assert!(matches!(
            read_sweep(f.path()),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn network_params_split_complex_pairs() {
        let f = write_temp(
            ".s2p",
            "! comment\n\
             # Hz S RI R 50\n\
             1e9 0.1 0.2 0.5 -0.5 0.3 0.4 0.6 0.7\n\
             \n\
             2e9 0.1 0.2 x -0.5 0.3 0.4 0.6 0.7 9\n",
        );
        let table = read_network_params(f.path()).unwrap();
        assert_eq!(table.frequency_ghz, vec![1.0, 2.0]);
        assert_eq!(table.s21[0], Complex64::new(0.5, -0.5));
        assert_eq!(table.s22[0], Complex64::new(0.6, 0.7));
        assert!(table.s21[1].re.is_nan());
        assert_eq!(table.rows()[0][0], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn network_params_reject_short_rows() {
        let f = write_temp(".s2p", "# Hz S RI R 50\n1e9 0.1 0.2 0.5\n");
        assert!(matches!(
            read_network_params(f.path()),
            Err(Error::Shape { line: 2, .. })
        ));
    }

    #[test]
    fn dispatch_by_extension() {
        let f = write_temp(".json", "[]");
        assert!(matches!(
            load_trace(f.path()),
            Err(Error::UnsupportedFormat { .. })
        ));
    }
}
