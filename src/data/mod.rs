/// Data layer: filename metadata, trace loading, filtering and cataloguing.
///
/// Architecture:
/// ```text
///  SPCM_W001_..._900mV.csv            .csv / .s2p contents
///        │                                  │
///        ▼                                  ▼
///   ┌──────────┐                       ┌──────────┐
///   │ filename  │  → FilenameRecord    │  loader   │  → SweepTable / NetworkTable
///   └──────────┘                       └──────────┘
///        │                                  │
///        ▼                                  ▼
///   ┌──────────┐   ┌──────────┐        analysis::{resonance, bandwidth}
///   │  catalog  │   │  filter   │
///   └──────────┘   └──────────┘
/// ```

pub mod catalog;
pub mod filename;
pub mod filter;
pub mod loader;
pub mod model;
