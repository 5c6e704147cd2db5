//! Persistence boundary.
//!
//! Parsed metadata and analysis results leave the crate through
//! [`MeasurementSink`]. Every write is an upsert on a natural key, so
//! importing the same folder twice leaves the store unchanged.
//! [`MemoryStore`] is an in-process implementation that serializes to JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::analysis::{Bandwidth, ValleyAnalysis};
use crate::config::ImportDefaults;
use crate::data::catalog::ImportEntry;
use crate::data::model::{FilenameRecord, InfoEntry, MetadataValue, SweepHeader};
use crate::error::{Error, Result};

/// Device-under-test identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DutKey {
    pub wafer: String,
    pub doe: String,
    pub die: u32,
    pub cage: String,
    pub device: String,
}

impl From<&FilenameRecord> for DutKey {
    fn from(r: &FilenameRecord) -> Self {
        Self {
            wafer: r.wafer.clone(),
            doe: r.doe.clone(),
            die: r.die,
            cage: r.cage.clone(),
            device: r.device.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub name: String,
    pub operator: String,
    pub system_version: String,
    pub notes: String,
    pub measured_at: Option<SystemTime>,
}

pub trait MeasurementSink {
    fn upsert_dut(&mut self, key: &DutKey) -> Result<u64>;
    fn upsert_session(&mut self, dut: u64, session: &SessionInfo) -> Result<u64>;
    fn upsert_conditions(&mut self, session: u64, conditions: &[InfoEntry]) -> Result<()>;
    fn upsert_measurement_data(
        &mut self,
        session: u64,
        data_type: &str,
        file_path: &Path,
        created_at: Option<SystemTime>,
    ) -> Result<u64>;
    fn upsert_data_info(&mut self, data: u64, info: &[InfoEntry]) -> Result<()>;
    fn upsert_analysis_run(&mut self, session: u64, analysis_type: &str, index: u64)
        -> Result<u64>;
    fn add_analysis_input(&mut self, run: u64, data: u64) -> Result<()>;
    fn upsert_feature(&mut self, run: u64, feature_type: &str, index: u64) -> Result<u64>;
    fn upsert_feature_values(&mut self, feature: u64, values: &[InfoEntry]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Row ids produced by [`record_measurement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementIds {
    pub dut: u64,
    pub session: u64,
    pub data: u64,
}

pub fn record_measurement<S: MeasurementSink + ?Sized>(
    sink: &mut S,
    entry: &ImportEntry,
    header: Option<&SweepHeader>,
    defaults: &ImportDefaults,
) -> Result<MeasurementIds> {
    let record = &entry.record;
    let dut = sink.upsert_dut(&DutKey::from(record))?;
    let session = sink.upsert_session(
        dut,
        &SessionInfo {
            name: entry.session.clone(),
            operator: defaults.operator.clone(),
            system_version: defaults.system_version.clone(),
            notes: defaults.notes.clone(),
            measured_at: entry.measured_at,
        },
    )?;
    sink.upsert_conditions(
        session,
        &[InfoEntry::new(
            "temperature",
            MetadataValue::Integer(record.temperature.into()),
            Some("°C"),
        )],
    )?;
    let data = sink.upsert_measurement_data(
        session,
        &record.datatype,
        &entry.destination,
        entry.created_at,
    )?;
    sink.upsert_data_info(data, &record.info_entries(header))?;
    Ok(MeasurementIds { dut, session, data })
}

fn value(key: &str, v: f64, unit: Option<&str>) -> InfoEntry {
    InfoEntry::new(key, MetadataValue::Float(v), unit)
}

/// One `valley_scan` run per data file, one `valley` feature per resonance.
pub fn record_valleys<S: MeasurementSink + ?Sized>(
    sink: &mut S,
    ids: MeasurementIds,
    analysis: &ValleyAnalysis,
) -> Result<u64> {
    let run = sink.upsert_analysis_run(ids.session, "valley_scan", ids.data)?;
    sink.add_analysis_input(run, ids.data)?;
    for (i, r) in analysis.resonances().iter().enumerate() {
        let feature = sink.upsert_feature(run, "valley", i as u64)?;
        sink.upsert_feature_values(
            feature,
            &[
                value("wavelength", r.wavelength_nm, Some("nm")),
                value("frequency", r.frequency_ghz, Some("GHz")),
                value("extinction_ratio", r.extinction_ratio_db, Some("dB")),
                value("fsr", r.fsr_nm, Some("nm")),
                value("fsr", r.fsr_ghz, Some("GHz")),
                value("fwhm", r.fwhm_nm, Some("nm")),
                value("fwhm", r.fwhm_ghz, Some("GHz")),
                value("q_factor", r.q_factor, None),
            ],
        )?;
    }
    Ok(run)
}

pub fn record_bandwidth<S: MeasurementSink + ?Sized>(
    sink: &mut S,
    ids: MeasurementIds,
    bandwidth: &Bandwidth,
) -> Result<u64> {
    let run = sink.upsert_analysis_run(ids.session, "bandwidth", ids.data)?;
    sink.add_analysis_input(run, ids.data)?;
    let feature = sink.upsert_feature(run, "bandwidth", 0)?;
    sink.upsert_feature_values(
        feature,
        &[
            value("bandwidth", bandwidth.bandwidth_ghz, Some("GHz")),
            value("reference_level", bandwidth.reference_level_db, Some("dB")),
        ],
    )?;
    Ok(run)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DutRow {
    pub id: u64,
    #[serde(flatten)]
    pub key: DutKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub id: u64,
    pub dut_id: u64,
    #[serde(flatten)]
    pub info: SessionInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataRow {
    pub id: u64,
    pub session_id: u64,
    pub data_type: String,
    pub file_path: PathBuf,
    pub created_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRow {
    pub id: u64,
    pub session_id: u64,
    pub analysis_type: String,
    pub index: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureRow {
    pub id: u64,
    pub run_id: u64,
    pub feature_type: String,
    pub index: u64,
}

/// Key/value/unit row owned by a session, data file or feature.
#[derive(Debug, Clone, Serialize)]
pub struct ValueRow {
    pub owner: u64,
    #[serde(flatten)]
    pub entry: InfoEntry,
}

type ValueKey = (u64, String, Option<String>);

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValueTable {
    pub rows: Vec<ValueRow>,
    #[serde(skip)]
    index: BTreeMap<ValueKey, usize>,
}

impl ValueTable {
    fn upsert(&mut self, owner: u64, entries: &[InfoEntry]) {
        for e in entries {
            let key = (owner, e.key.clone(), e.unit.clone());
            match self.index.get(&key) {
                Some(&i) => self.rows[i].entry.value = e.value.clone(),
                None => {
                    self.index.insert(key, self.rows.len());
                    self.rows.push(ValueRow {
                        owner,
                        entry: e.clone(),
                    });
                }
            }
        }
    }

    pub fn for_owner(&self, owner: u64) -> impl Iterator<Item = &InfoEntry> {
        self.rows
            .iter()
            .filter(move |r| r.owner == owner)
            .map(|r| &r.entry)
    }
}

/// Insert-or-get on a natural key; ids start at 1.
fn natural_id<K: Ord>(index: &mut BTreeMap<K, u64>, key: K) -> (u64, bool) {
    let next = index.len() as u64 + 1;
    let mut inserted = false;
    let id = *index.entry(key).or_insert_with(|| {
        inserted = true;
        next
    });
    (id, inserted)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStore {
    pub duts: Vec<DutRow>,
    pub sessions: Vec<SessionRow>,
    pub conditions: ValueTable,
    pub data: Vec<DataRow>,
    pub data_info: ValueTable,
    pub analysis_runs: Vec<RunRow>,
    pub analysis_inputs: BTreeSet<(u64, u64)>,
    pub features: Vec<FeatureRow>,
    pub feature_values: ValueTable,

    #[serde(skip)]
    dut_ids: BTreeMap<DutKey, u64>,
    #[serde(skip)]
    session_ids: BTreeMap<(u64, String), u64>,
    #[serde(skip)]
    data_ids: BTreeMap<(u64, PathBuf), u64>,
    #[serde(skip)]
    run_ids: BTreeMap<(u64, String, u64), u64>,
    #[serde(skip)]
    feature_ids: BTreeMap<(u64, String, u64), u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions_for_dut(&self, dut: u64) -> Vec<&SessionRow> {
        self.sessions.iter().filter(|s| s.dut_id == dut).collect()
    }

    pub fn data_for_session(&self, session: u64) -> Vec<&DataRow> {
        self.data.iter().filter(|d| d.session_id == session).collect()
    }

    pub fn runs_for_session(&self, session: u64) -> Vec<&RunRow> {
        self.analysis_runs
            .iter()
            .filter(|r| r.session_id == session)
            .collect()
    }

    pub fn features_for_run(&self, run: u64) -> Vec<&FeatureRow> {
        self.features.iter().filter(|f| f.run_id == run).collect()
    }

    /// Row count per table.
    pub fn stats(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("duts", self.duts.len()),
            ("sessions", self.sessions.len()),
            ("conditions", self.conditions.rows.len()),
            ("data", self.data.len()),
            ("data_info", self.data_info.rows.len()),
            ("analysis_runs", self.analysis_runs.len()),
            ("analysis_inputs", self.analysis_inputs.len()),
            ("features", self.features.len()),
            ("feature_values", self.feature_values.rows.len()),
        ])
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| Error::io(path, e.into()))?;
        writer.flush().map_err(|e| Error::io(path, e))
    }
}

impl MeasurementSink for MemoryStore {
    fn upsert_dut(&mut self, key: &DutKey) -> Result<u64> {
        let (id, inserted) = natural_id(&mut self.dut_ids, key.clone());
        if inserted {
            self.duts.push(DutRow {
                id,
                key: key.clone(),
            });
        }
        Ok(id)
    }

    fn upsert_session(&mut self, dut: u64, session: &SessionInfo) -> Result<u64> {
        let (id, inserted) = natural_id(&mut self.session_ids, (dut, session.name.clone()));
        if inserted {
            self.sessions.push(SessionRow {
                id,
                dut_id: dut,
                info: session.clone(),
            });
        }
        Ok(id)
    }

    fn upsert_conditions(&mut self, session: u64, conditions: &[InfoEntry]) -> Result<()> {
        self.conditions.upsert(session, conditions);
        Ok(())
    }

    fn upsert_measurement_data(
        &mut self,
        session: u64,
        data_type: &str,
        file_path: &Path,
        created_at: Option<SystemTime>,
    ) -> Result<u64> {
        let (id, inserted) = natural_id(&mut self.data_ids, (session, file_path.to_path_buf()));
        if inserted {
            self.data.push(DataRow {
                id,
                session_id: session,
                data_type: data_type.to_string(),
                file_path: file_path.to_path_buf(),
                created_at,
            });
        }
        Ok(id)
    }

    fn upsert_data_info(&mut self, data: u64, info: &[InfoEntry]) -> Result<()> {
        self.data_info.upsert(data, info);
        Ok(())
    }

    fn upsert_analysis_run(
        &mut self,
        session: u64,
        analysis_type: &str,
        index: u64,
    ) -> Result<u64> {
        let (id, inserted) =
            natural_id(&mut self.run_ids, (session, analysis_type.to_string(), index));
        if inserted {
            self.analysis_runs.push(RunRow {
                id,
                session_id: session,
                analysis_type: analysis_type.to_string(),
                index,
            });
        }
        Ok(id)
    }

    fn add_analysis_input(&mut self, run: u64, data: u64) -> Result<()> {
        self.analysis_inputs.insert((run, data));
        Ok(())
    }

    fn upsert_feature(&mut self, run: u64, feature_type: &str, index: u64) -> Result<u64> {
        let (id, inserted) =
            natural_id(&mut self.feature_ids, (run, feature_type.to_string(), index));
        if inserted {
            self.features.push(FeatureRow {
                id,
                run_id: run,
                feature_type: feature_type.to_string(),
                index,
            });
        }
        Ok(id)
    }

    fn upsert_feature_values(&mut self, feature: u64, values: &[InfoEntry]) -> Result<()> {
        self.feature_values.upsert(feature, values);
        Ok(())
    }
}
