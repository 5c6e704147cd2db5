use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use num_complex::Complex64;
use serde::Serialize;

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a metadata column
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value, used both for record columns and for
/// the key/value rows handed to the persistence layer.
/// Using `BTreeMap` / `BTreeSet` downstream so `MetadataValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Null,
}

// -- Manual Eq/Ord so we can put MetadataValue in BTreeSet --

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn discriminant(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Integer(_) => 1,
                Float(_) => 2,
                String(_) => 3,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for MetadataValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MetadataValue::String(s) => s.hash(state),
            MetadataValue::Integer(i) => i.hash(state),
            MetadataValue::Float(f) => f.to_bits().hash(state),
            MetadataValue::Null => {}
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Parse a command-line style literal (`25`, `-1.5`, `SPCM`) into the
    /// narrowest matching variant.
    pub fn guess(s: &str) -> Self {
        if s.is_empty() {
            return MetadataValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return MetadataValue::Float(f);
        }
        MetadataValue::String(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Filename record
// ---------------------------------------------------------------------------

/// A number with the unit suffix it was written with, e.g. `900mV`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// One source-measure-unit setting from the filename suffix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectricalCondition {
    /// Instrument channel type tag (`pn`, `heater`, ...).
    pub device: String,
    /// Channel label as written; usually a number.
    pub channel: String,
    pub value: Quantity,
}

/// Which top-level filename layout a record was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarVariant {
    /// `TYPE_wafer_doe_dieN_cage_device_25C_repN_ch_I_O_PdBm...`
    Legacy,
    /// `TYPE_wafer_doe_cage_dieN_SUB_25C_#N_device_ch_I_O_PdBm...`
    Extended,
}

/// Metadata decoded from one measurement filename.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilenameRecord {
    pub variant: GrammarVariant,
    pub datatype: String,
    pub wafer: String,
    pub doe: String,
    pub die: u32,
    pub cage: String,
    /// Only present in [`GrammarVariant::Extended`] names.
    pub subdie: Option<u32>,
    pub device: String,
    /// °C
    pub temperature: i32,
    pub repeat: u32,
    pub ch_in: u32,
    pub ch_out: u32,
    /// dBm
    pub power: i32,
    pub electrical: Vec<ElectricalCondition>,
    pub arguments: Vec<Quantity>,
}

/// One key/value/unit row destined for a per-file info table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoEntry {
    pub key: String,
    pub value: MetadataValue,
    pub unit: Option<String>,
}

impl InfoEntry {
    pub fn new(key: impl Into<String>, value: MetadataValue, unit: Option<&str>) -> Self {
        Self {
            key: key.into(),
            value,
            unit: unit.map(str::to_string),
        }
    }
}

impl FilenameRecord {
    /// Fixed fields as metadata columns, keyed by field name.
    pub fn metadata(&self) -> BTreeMap<String, MetadataValue> {
        use MetadataValue::{Integer, Null, String as Text};
        let mut m = BTreeMap::new();
        m.insert("datatype".into(), Text(self.datatype.clone()));
        m.insert("wafer".into(), Text(self.wafer.clone()));
        m.insert("doe".into(), Text(self.doe.clone()));
        m.insert("die".into(), Integer(self.die.into()));
        m.insert("cage".into(), Text(self.cage.clone()));
        m.insert(
            "subdie".into(),
            self.subdie.map_or(Null, |s| Integer(s.into())),
        );
        m.insert("device".into(), Text(self.device.clone()));
        m.insert("temperature".into(), Integer(self.temperature.into()));
        m.insert("repeat".into(), Integer(self.repeat.into()));
        m.insert("ch_in".into(), Integer(self.ch_in.into()));
        m.insert("ch_out".into(), Integer(self.ch_out.into()));
        m.insert("power".into(), Integer(self.power.into()));
        m
    }

    /// Flatten channel routing, SMU settings and arguments into info rows.
    /// Sweep header values are appended when supplied.
    pub fn info_entries(&self, header: Option<&SweepHeader>) -> Vec<InfoEntry> {
        let mut out = vec![
            InfoEntry::new("channel_in", MetadataValue::Integer(self.ch_in.into()), None),
            InfoEntry::new("channel_out", MetadataValue::Integer(self.ch_out.into()), None),
            InfoEntry::new("power", MetadataValue::Integer(self.power.into()), Some("dBm")),
        ];
        for (i, ec) in self.electrical.iter().enumerate() {
            let n = i + 1;
            out.push(InfoEntry::new(
                format!("ec{n} type"),
                MetadataValue::String(ec.device.clone()),
                None,
            ));
            out.push(InfoEntry::new(
                format!("ec{n} channel"),
                MetadataValue::guess(&ec.channel),
                None,
            ));
            out.push(InfoEntry::new(
                format!("ec{n} value"),
                MetadataValue::Float(ec.value.value),
                Some(&ec.value.unit),
            ));
        }
        for (i, arg) in self.arguments.iter().enumerate() {
            out.push(InfoEntry::new(
                format!("arg{}", i + 1),
                MetadataValue::Float(arg.value),
                Some(&arg.unit),
            ));
        }
        if let Some(header) = header {
            for (key, (value, unit)) in header {
                let unit = (!unit.is_empty()).then_some(unit.as_str());
                out.push(InfoEntry::new(key.clone(), MetadataValue::guess(value), unit));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// RecordSet – parsed filenames with pre-computed column indices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordSet {
    pub records: Vec<FilenameRecord>,
    /// Ordered list of metadata column names.
    pub column_names: Vec<String>,
    /// For each metadata column the sorted set of unique values.
    pub unique_values: BTreeMap<String, BTreeSet<MetadataValue>>,
}

impl RecordSet {
    /// Build column indices from the parsed records.
    pub fn from_records(records: Vec<FilenameRecord>) -> Self {
        let mut column_names_set: BTreeSet<String> = BTreeSet::new();
        let mut unique_values: BTreeMap<String, BTreeSet<MetadataValue>> = BTreeMap::new();

        for rec in &records {
            for (col, val) in rec.metadata() {
                column_names_set.insert(col.clone());
                unique_values.entry(col).or_default().insert(val);
            }
        }
        let column_names: Vec<String> = column_names_set.into_iter().collect();
        RecordSet {
            records,
            column_names,
            unique_values,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Traces read from instrument files
// ---------------------------------------------------------------------------

/// Sweep header rows: label → (value, unit), both as written.
pub type SweepHeader = BTreeMap<String, (String, String)>;

/// Wavelength sweep: column 0 is wavelength in nm, the rest are channel
/// readings (insertion loss, dB). Row order is the sweep order.
#[derive(Debug, Clone, Default)]
pub struct SweepTable {
    pub header: SweepHeader,
    pub rows: Vec<Vec<f64>>,
}

impl SweepTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_columns(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn wavelength_nm(&self) -> Vec<f64> {
        self.column(0).unwrap_or_default()
    }

    /// Dependent channel `i` (0-based, i.e. table column `i + 1`).
    pub fn channel(&self, i: usize) -> Option<Vec<f64>> {
        self.column(i + 1)
    }

    fn column(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.n_columns() {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|r| r.get(idx).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }
}

/// Two-port network-analyzer data, frequency in GHz.
#[derive(Debug, Clone, Default)]
pub struct NetworkTable {
    pub frequency_ghz: Vec<f64>,
    pub s11: Vec<Complex64>,
    pub s21: Vec<Complex64>,
    pub s12: Vec<Complex64>,
    pub s22: Vec<Complex64>,
}

impl NetworkTable {
    pub fn len(&self) -> usize {
        self.frequency_ghz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency_ghz.is_empty()
    }

    /// |S21| in dB.
    pub fn s21_db(&self) -> Vec<f64> {
        self.s21.iter().map(|s| 20.0 * s.norm().log10()).collect()
    }

    /// Row-major view: `[f + 0i, s11, s21, s12, s22]` per frequency point.
    pub fn rows(&self) -> Vec<[Complex64; 5]> {
        (0..self.len())
            .map(|i| {
                [
                    Complex64::new(self.frequency_ghz[i], 0.0),
                    self.s11[i],
                    self.s21[i],
                    self.s12[i],
                    self.s22[i],
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FilenameRecord {
        FilenameRecord {
            variant: GrammarVariant::Legacy,
            datatype: "SPCM".into(),
            wafer: "W001".into(),
            doe: "D1".into(),
            die: 2,
            cage: "C1".into(),
            subdie: None,
            device: "Dev1".into(),
            temperature: 25,
            repeat: 1,
            ch_in: 1,
            ch_out: 2,
            power: -10,
            electrical: vec![ElectricalCondition {
                device: "pn".into(),
                channel: "1".into(),
                value: Quantity::new(900.0, "mV"),
            }],
            arguments: vec![Quantity::new(1.5, "V")],
        }
    }

    #[test]
    fn info_entries_follow_importer_layout() {
        let mut header = SweepHeader::new();
        header.insert("SweepRate".into(), ("10".into(), "nm/s".into()));
        let keys: Vec<String> = record()
            .info_entries(Some(&header))
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(
            keys,
            [
                "channel_in",
                "channel_out",
                "power",
                "ec1 type",
                "ec1 channel",
                "ec1 value",
                "arg1",
                "SweepRate"
            ]
        );
    }

    #[test]
    fn record_set_collects_unique_columns() {
        let mut other = record();
        other.die = 7;
        let set = RecordSet::from_records(vec![record(), other, record()]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.unique_values["die"].len(), 2);
        assert_eq!(set.unique_values["subdie"].len(), 1);
        assert!(set.column_names.contains(&"power".to_string()));
    }

    #[test]
    fn metadata_value_orders_across_variants() {
        let mut set = BTreeSet::new();
        set.insert(MetadataValue::String("a".into()));
        set.insert(MetadataValue::Integer(3));
        set.insert(MetadataValue::Null);
        let first = set.iter().next().cloned();
        assert_eq!(first, Some(MetadataValue::Null));
        assert_eq!(MetadataValue::guess("-10"), MetadataValue::Integer(-10));
        assert_eq!(MetadataValue::guess("0.5"), MetadataValue::Float(0.5));
    }
}
