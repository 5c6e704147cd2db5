//! Folder import: scan, plan, read, analyse and record.
//!
//! Per-file failures (unparseable names, unreadable traces, analyses that
//! find no band edge) are logged and counted; they never stop the batch.

use std::path::Path;

use log::{info, warn};

use crate::analysis::{analyze_bandwidth, analyze_valleys, Bandwidth, ValleyAnalysis};
use crate::config::Settings;
use crate::data::catalog::{plan_import, scan_folder};
use crate::data::loader::{load_trace, Trace};
use crate::error::{Error, Result};
use crate::sink::{record_bandwidth, record_measurement, record_valleys, MeasurementSink};

#[derive(Debug, Clone)]
pub enum Analysis {
    Valleys(ValleyAnalysis),
    Bandwidth(Bandwidth),
}

/// Valley scan of the first channel of a sweep, or the S21 bandwidth of a
/// network trace.
pub fn analyze_trace(trace: &Trace, settings: &Settings) -> Result<Analysis> {
    match trace {
        Trace::Sweep(table) => {
            let loss = table
                .channel(0)
                .ok_or_else(|| Error::Input("sweep has no channel column".into()))?;
            analyze_valleys(&table.wavelength_nm(), &loss, &settings.valleys).map(Analysis::Valleys)
        }
        Trace::Network(table) => {
            analyze_bandwidth(&table.frequency_ghz, &table.s21_db(), &settings.bandwidth)
                .map(Analysis::Bandwidth)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub imported: usize,
    pub invalid: Vec<String>,
    pub unreadable: usize,
    pub analysed: usize,
    pub analysis_failed: usize,
}

/// Import every valid file in `dir` into `sink`, placing data paths under
/// `root`. Files are not moved.
pub fn import_folder<S: MeasurementSink + ?Sized>(
    dir: &Path,
    root: &Path,
    settings: &Settings,
    sink: &mut S,
) -> Result<ImportSummary> {
    let scan = scan_folder(dir)?;
    let folder_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("session");
    let plan = plan_import(&scan, folder_name, root);

    let mut summary = ImportSummary {
        invalid: scan.invalid.clone(),
        ..Default::default()
    };

    for entry in &plan {
        let trace = match load_trace(&entry.source) {
            Ok(trace) => Some(trace),
            Err(e) => {
                warn!("{e}");
                summary.unreadable += 1;
                None
            }
        };
        let header = match &trace {
            Some(Trace::Sweep(table)) => Some(&table.header),
            _ => None,
        };
        let ids = record_measurement(sink, entry, header, &settings.import)?;
        summary.imported += 1;

        let Some(trace) = trace else {
            continue;
        };
        match analyze_trace(&trace, settings) {
            Ok(Analysis::Valleys(v)) => {
                record_valleys(sink, ids, &v)?;
                summary.analysed += 1;
            }
            Ok(Analysis::Bandwidth(b)) => {
                record_bandwidth(sink, ids, &b)?;
                summary.analysed += 1;
            }
            Err(e) => {
                warn!("{}: {e}", entry.source.display());
                summary.analysis_failed += 1;
            }
        }
    }

    info!(
        "{}: imported {}, invalid {}, unreadable {}, analysed {}, analysis failed {}",
        dir.display(),
        summary.imported,
        summary.invalid.len(),
        summary.unreadable,
        summary.analysed,
        summary.analysis_failed
    );
    Ok(summary)
}
