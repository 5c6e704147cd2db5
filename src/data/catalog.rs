//! Folder scanning and import planning.
//!
//! A measurement folder is a flat directory of instrument files named by the
//! filename grammar. Scanning parses every supported file; planning decides
//! where each file belongs in the `wafer/doe/cage/device/dieN/session` tree.
//! Nothing here touches the files themselves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{info, warn};

use super::filename::{self, SUPPORTED_EXTENSIONS};
use super::model::FilenameRecord;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct FolderScan {
    pub valid: BTreeMap<PathBuf, FilenameRecord>,
    /// File names that did not parse.
    pub invalid: Vec<String>,
    /// Folder modification time, taken as the measurement time.
    pub modified: Option<SystemTime>,
    /// Modification time of each valid file.
    pub file_modified: BTreeMap<PathBuf, SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Parse every supported file in `dir` (non-recursive). Files that fail to
/// parse are logged and listed in [`FolderScan::invalid`].
pub fn scan_folder(dir: &Path) -> Result<FolderScan> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut scan = FolderScan {
        modified: modified(dir),
        ..Default::default()
    };
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if !path.is_file() || !has_supported_extension(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match filename::parse(name) {
            Ok(record) => {
                if let Some(t) = modified(&path) {
                    scan.file_modified.insert(path.clone(), t);
                }
                scan.valid.insert(path.clone(), record);
            }
            Err(e) => {
                warn!("skipping {name}: {e}");
                scan.invalid.push(name.to_string());
            }
        }
    }
    scan.invalid.sort();

    info!(
        "{}: {} valid, {} invalid",
        dir.display(),
        scan.valid.len(),
        scan.invalid.len()
    );
    Ok(scan)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Session name for a file measured in `folder_name`; repeats other than the
/// first get a `_#N` suffix.
pub fn session_name(folder_name: &str, record: &FilenameRecord) -> String {
    if record.repeat == 1 {
        folder_name.to_string()
    } else {
        format!("{folder_name}_#{}", record.repeat)
    }
}

pub fn target_dir(root: &Path, record: &FilenameRecord, session: &str) -> PathBuf {
    root.join(&record.wafer)
        .join(&record.doe)
        .join(&record.cage)
        .join(&record.device)
        .join(format!("die{}", record.die))
        .join(session)
}

/// One file's place in the measurement tree.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub session: String,
    pub record: FilenameRecord,
    pub measured_at: Option<SystemTime>,
    pub created_at: Option<SystemTime>,
}

/// Compute the destination of every valid file in `scan`.
pub fn plan_import(scan: &FolderScan, folder_name: &str, root: &Path) -> Vec<ImportEntry> {
    scan.valid
        .iter()
        .filter_map(|(source, record)| {
            let name = source.file_name()?;
            let session = session_name(folder_name, record);
            let destination = target_dir(root, record, &session).join(name);
            Some(ImportEntry {
                source: source.clone(),
                destination,
                session,
                record: record.clone(),
                measured_at: scan.modified,
                created_at: scan.file_modified.get(source).copied(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_partitions_valid_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "SPCM_W1_D1_die1_C1_A_25C_rep1_ch_1_2_0dBm.csv",
            "SPCM_W1_D1_die1_C1_A_25C_rep2_ch_1_2_0dBm.csv",
            "notes.txt",
            "SPCM_W1_D1_die1_C1_A_25C_rep1_ch_1_2_0dBm_arg.csv",
            "readme.md",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let scan = scan_folder(dir.path()).unwrap();
        assert_eq!(scan.valid.len(), 2);
        assert!(scan.modified.is_some());
        assert!(scan.valid.keys().all(|p| scan.file_modified.contains_key(p)));
        assert_eq!(
            scan.invalid,
            vec![
                "SPCM_W1_D1_die1_C1_A_25C_rep1_ch_1_2_0dBm_arg.csv".to_string(),
                "notes.txt".to_string(),
            ]
        );
    }

    #[test]
    fn missing_folder_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(scan_folder(&missing), Err(Error::Io { .. })));
    }

    #[test]
    fn plan_places_files_by_dut_and_session() {
        let rec = filename::parse("SPCM_W1_D1_die3_C1_A_25C_rep2_ch_1_2_0dBm.csv").unwrap();
        assert_eq!(session_name("20260202", &rec), "20260202_#2");

        let mut scan = FolderScan::default();
        let source = PathBuf::from("/in/SPCM_W1_D1_die3_C1_A_25C_rep2_ch_1_2_0dBm.csv");
        scan.valid.insert(source.clone(), rec);

        let plan = plan_import(&scan, "20260202", Path::new("/out"));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].source, source);
        assert_eq!(plan[0].measured_at, None);
        assert_eq!(plan[0].created_at, None);
        assert_eq!(
            plan[0].destination,
            PathBuf::from("/out/W1/D1/C1/A/die3/20260202_#2/SPCM_W1_D1_die3_C1_A_25C_rep2_ch_1_2_0dBm.csv")
        );
    }
}
