//! Photonic test-data tooling: measurement filename metadata, instrument
//! trace readers, and ring-resonator / S21 feature extraction.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod import;
pub mod sink;

pub use config::Settings;
pub use data::filename::parse;
pub use data::loader::{read_network_params, read_sweep};
pub use data::model::{ElectricalCondition, FilenameRecord, GrammarVariant, Quantity};
pub use error::{Error, Result};
