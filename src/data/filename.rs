//! Measurement filename grammar.
//!
//! A filename is a fixed, `_`-separated prefix followed by a free-form
//! suffix and one of the supported extensions:
//!
//! ```text
//! SPCM_W001_D1_die2_C1_Dev1_25C_rep1_ch_1_2_-10dBm_SMU_pn_1_900mV.csv
//! └──────────────── fixed prefix ────────────────┘└─── suffix ───┘
//! ```
//!
//! The prefix is matched against an ordered list of candidate grammars; the
//! first match wins. The suffix is tokenized on `_` and walked by an ordered
//! list of rules, each of which either claims the tokens at the cursor or
//! defers to the next rule.

use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use log::debug;
use regex::{Captures, Regex};

use super::model::{ElectricalCondition, FilenameRecord, GrammarVariant, Quantity};
use crate::error::{Error, Result};

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "txt", "s2p"];

const SEPARATOR: char = '_';
const SMU_MARKER: &str = "SMU";
const ARG_MARKER: &str = "arg";

// ---------------------------------------------------------------------------
// Fixed-prefix grammars
// ---------------------------------------------------------------------------

struct Grammar {
    variant: GrammarVariant,
    pattern: Regex,
}

static GRAMMARS: LazyLock<Vec<Grammar>> = LazyLock::new(|| {
    vec![
        Grammar {
            variant: GrammarVariant::Legacy,
            pattern: Regex::new(
                r"(?x)
                ^(?P<datatype>[^_]+)
                _(?P<wafer>[^_]+)
                _(?P<doe>[^_]+)
                _die(?P<die>\d+)
                _(?P<cage>[^_]+)
                _(?P<device>[^_]+)
                _(?P<temperature>-?\d+)C
                _rep(?P<repeat>\d+)
                _ch_(?P<ch_in>\d+)
                _(?P<ch_out>\d+)
                _(?P<power>-?\d+)dBm
                (?P<rest>.*)
                \.(?:csv|txt|s2p)$",
            )
            .expect("legacy filename pattern is valid"),
        },
        Grammar {
            variant: GrammarVariant::Extended,
            pattern: Regex::new(
                r"(?x)
                ^(?P<datatype>[^_]+)
                _(?P<wafer>[^_]+)
                _(?P<doe>[^_]+)
                _(?P<cage>[^_]+)
                _die(?P<die>\d+)
                _(?P<subdie>\d+)
                _(?P<temperature>-?\d+)C
                _\#(?P<repeat>\d+)
                _(?P<device>[^_]+)
                _ch_(?P<ch_in>\d+)
                _(?P<ch_out>\d+)
                _(?P<power>-?\d+)dBm
                (?P<rest>.*)
                \.(?:csv|txt|s2p)$",
            )
            .expect("extended filename pattern is valid"),
        },
    ]
});

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-+]?\d*\.?\d+)([a-zA-Z%]*)").expect("quantity pattern is valid")
});

/// Parse a measurement filename (any leading directories are ignored).
pub fn parse(filename: &str) -> Result<FilenameRecord> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let format_error = || Error::Format {
        filename: filename.to_string(),
    };

    let (variant, caps) = GRAMMARS
        .iter()
        .find_map(|g| g.pattern.captures(name).map(|c| (g.variant, c)))
        .ok_or_else(format_error)?;

    let text = |key: &str| caps[key].to_string();

    let subdie = match variant {
        GrammarVariant::Legacy => None,
        GrammarVariant::Extended => Some(field(&caps, "subdie", filename)?),
    };

    let (electrical, arguments) =
        parse_suffix(&caps["rest"]).map_err(|token| Error::TokenFormat {
            filename: filename.to_string(),
            token,
        })?;

    let record = FilenameRecord {
        variant,
        datatype: text("datatype"),
        wafer: text("wafer"),
        doe: text("doe"),
        die: field(&caps, "die", filename)?,
        cage: text("cage"),
        subdie,
        device: text("device"),
        temperature: field(&caps, "temperature", filename)?,
        repeat: field(&caps, "repeat", filename)?,
        ch_in: field(&caps, "ch_in", filename)?,
        ch_out: field(&caps, "ch_out", filename)?,
        power: field(&caps, "power", filename)?,
        electrical,
        arguments,
    };
    debug!("{name}: parsed as {variant:?}");
    Ok(record)
}

/// Numeric capture; the grammar guarantees digits, so a failure here is
/// a value too large for the field.
fn field<T: FromStr>(caps: &Captures<'_>, key: &str, filename: &str) -> Result<T> {
    let text = caps.name(key).map_or("", |m| m.as_str());
    text.parse().map_err(|_| Error::FieldRange {
        filename: filename.to_string(),
        field: key.to_string(),
        value: text.to_string(),
    })
}

/// Split `900mV` into `(900.0, "mV")`. Only the leading number and the
/// letter/percent run right after it are read.
pub fn split_quantity(token: &str) -> Option<Quantity> {
    let caps = QUANTITY.captures(token)?;
    let value = caps[1].parse().ok()?;
    Some(Quantity::new(value, &caps[2]))
}

// ---------------------------------------------------------------------------
// Suffix walker
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    tokens: &'a [&'a str],
    pos: usize,
    /// Set once an explicit `arg` block has been seen; disables the
    /// implicit SMU rule for the rest of the walk.
    explicit_args: bool,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a [&'a str] {
        &self.tokens[self.pos..]
    }
}

enum Item {
    Electrical(ElectricalCondition),
    Argument(Quantity),
}

struct Step {
    consumed: usize,
    item: Option<Item>,
    enters_explicit_args: bool,
}

/// `None` = rule does not apply here; `Some(Err(token))` = rule applies but
/// a token is malformed.
type Rule = fn(&Cursor<'_>) -> Option<std::result::Result<Step, String>>;

/// Evaluated in order at every cursor position.
const RULES: [Rule; 4] = [smu_block, implicit_smu_block, arg_block, bare_argument];

/// Walk the free-form suffix into SMU settings and arguments. On failure the
/// offending token is returned.
pub fn parse_suffix(
    rest: &str,
) -> std::result::Result<(Vec<ElectricalCondition>, Vec<Quantity>), String> {
    let mut electrical = Vec::new();
    let mut arguments = Vec::new();
    if rest.is_empty() {
        return Ok((electrical, arguments));
    }

    let tokens: Vec<&str> = rest.trim_matches(SEPARATOR).split(SEPARATOR).collect();
    let mut cursor = Cursor {
        tokens: &tokens,
        pos: 0,
        explicit_args: false,
    };

    while cursor.pos < tokens.len() {
        let step = RULES
            .iter()
            .find_map(|rule| rule(&cursor))
            .unwrap_or_else(|| Err(tokens[cursor.pos].to_string()))?;
        match step.item {
            Some(Item::Electrical(ec)) => electrical.push(ec),
            Some(Item::Argument(q)) => arguments.push(q),
            None => {}
        }
        cursor.explicit_args |= step.enters_explicit_args;
        cursor.pos += step.consumed;
    }
    Ok((electrical, arguments))
}

fn electrical(device: &str, channel: &str, value: &str) -> std::result::Result<Item, String> {
    let value = split_quantity(value).ok_or_else(|| value.to_string())?;
    Ok(Item::Electrical(ElectricalCondition {
        device: device.to_string(),
        channel: channel.to_string(),
        value,
    }))
}

/// `SMU_<type>_<channel>_<value>`
fn smu_block(cursor: &Cursor<'_>) -> Option<std::result::Result<Step, String>> {
    let rest = cursor.rest();
    if rest[0] != SMU_MARKER {
        return None;
    }
    let [_, device, channel, value, ..] = rest else {
        return Some(Err(rest.join("_")));
    };
    Some(electrical(device, channel, value).map(|item| Step {
        consumed: 4,
        item: Some(item),
        enters_explicit_args: false,
    }))
}

/// `<type>_<channel>_<value>` without a marker, only before any `arg` block.
fn implicit_smu_block(cursor: &Cursor<'_>) -> Option<std::result::Result<Step, String>> {
    let rest = cursor.rest();
    if cursor.explicit_args || rest[0] == ARG_MARKER || rest.len() < 3 {
        return None;
    }
    Some(electrical(rest[0], rest[1], rest[2]).map(|item| Step {
        consumed: 3,
        item: Some(item),
        enters_explicit_args: false,
    }))
}

/// `arg_<value>`
fn arg_block(cursor: &Cursor<'_>) -> Option<std::result::Result<Step, String>> {
    let rest = cursor.rest();
    if rest[0] != ARG_MARKER {
        return None;
    }
    let Some(token) = rest.get(1) else {
        return Some(Err(rest[0].to_string()));
    };
    Some(
        split_quantity(token)
            .map(|q| Step {
                consumed: 2,
                item: Some(Item::Argument(q)),
                enters_explicit_args: true,
            })
            .ok_or_else(|| token.to_string()),
    )
}

/// A lone `<value>`; empty tokens are skipped.
fn bare_argument(cursor: &Cursor<'_>) -> Option<std::result::Result<Step, String>> {
    let token = cursor.rest()[0];
    if token.is_empty() {
        return Some(Ok(Step {
            consumed: 1,
            item: None,
            enters_explicit_args: false,
        }));
    }
    Some(
        split_quantity(token)
            .map(|q| Step {
                consumed: 1,
                item: Some(Item::Argument(q)),
                enters_explicit_args: false,
            })
            .ok_or_else(|| token.to_string()),
    )
}

// ---------------------------------------------------------------------------
// Re-synthesis
// ---------------------------------------------------------------------------

impl FilenameRecord {
    /// Rebuild a filename for this record. SMU settings and arguments are
    /// written as explicit `SMU_...` / `arg_...` blocks.
    pub fn file_name(&self, extension: &str) -> String {
        let prefix = match self.variant {
            GrammarVariant::Legacy => format!(
                "{}_{}_{}_die{}_{}_{}_{}C_rep{}_ch_{}_{}_{}dBm",
                self.datatype,
                self.wafer,
                self.doe,
                self.die,
                self.cage,
                self.device,
                self.temperature,
                self.repeat,
                self.ch_in,
                self.ch_out,
                self.power,
            ),
            GrammarVariant::Extended => format!(
                "{}_{}_{}_{}_die{}_{}_{}C_#{}_{}_ch_{}_{}_{}dBm",
                self.datatype,
                self.wafer,
                self.doe,
                self.cage,
                self.die,
                self.subdie.unwrap_or_default(),
                self.temperature,
                self.repeat,
                self.device,
                self.ch_in,
                self.ch_out,
                self.power,
            ),
        };

        let mut name = prefix;
        for ec in &self.electrical {
            name.push_str(&format!(
                "_{SMU_MARKER}_{}_{}_{}",
                ec.device, ec.channel, ec.value
            ));
        }
        for arg in &self.arguments {
            name.push_str(&format!("_{ARG_MARKER}_{arg}"));
        }
        format!("{name}.{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_name_with_smu_block() {
        let rec = parse("SPCM_W001_D1_die2_C1_Dev1_25C_rep1_ch_1_2_-10dBm_SMU_pn_1_900mV.csv")
            .unwrap();
        assert_eq!(rec.variant, GrammarVariant::Legacy);
        assert_eq!(rec.datatype, "SPCM");
        assert_eq!(rec.wafer, "W001");
        assert_eq!(rec.doe, "D1");
        assert_eq!(rec.die, 2);
        assert_eq!(rec.cage, "C1");
        assert_eq!(rec.subdie, None);
        assert_eq!(rec.device, "Dev1");
        assert_eq!(rec.temperature, 25);
        assert_eq!(rec.repeat, 1);
        assert_eq!((rec.ch_in, rec.ch_out), (1, 2));
        assert_eq!(rec.power, -10);
        assert_eq!(
            rec.electrical,
            vec![ElectricalCondition {
                device: "pn".into(),
                channel: "1".into(),
                value: Quantity::new(900.0, "mV"),
            }]
        );
        assert!(rec.arguments.is_empty());
    }

    #[test]
    fn parses_extended_name() {
        let rec = parse("DCIV_PIC9-FPN3_DOE1_MRM158_die1_3_-40C_#2_D4_ch_9_9_5dBm_SMU_pn_1_900mV.csv")
            .unwrap();
        assert_eq!(rec.variant, GrammarVariant::Extended);
        assert_eq!(rec.wafer, "PIC9-FPN3");
        assert_eq!(rec.cage, "MRM158");
        assert_eq!(rec.die, 1);
        assert_eq!(rec.subdie, Some(3));
        assert_eq!(rec.temperature, -40);
        assert_eq!(rec.repeat, 2);
        assert_eq!(rec.device, "D4");
        assert_eq!(rec.power, 5);
        assert_eq!(rec.electrical.len(), 1);
    }

    #[test]
    fn strips_directories_and_accepts_empty_suffix() {
        let rec = parse("/data/run/SPCM_W1_D1_die0_C1_X_25C_rep3_ch_1_2_0dBm.s2p").unwrap();
        assert_eq!(rec.repeat, 3);
        assert!(rec.electrical.is_empty());
        assert!(rec.arguments.is_empty());
    }

    #[test]
    fn rejects_unmatched_names() {
        for bad in [
            "SPCM_W001_D1_die2_C1_Dev1_25C_rep1_ch_1_2_-10dBm.json",
            "SPCM_W001_D1_die2_C1_Dev1_25C_ch_1_2_-10dBm.csv",
            "spcm.csv",
            "",
        ] {
            assert!(matches!(parse(bad), Err(Error::Format { .. })), "{bad}");
        }
    }

    #[test]
    fn oversized_number_is_range_error() {
        let err = parse("SPCM_W1_D1_die99999999999_C1_X_25C_rep1_ch_1_2_0dBm.csv").unwrap_err();
        assert!(
            matches!(err, Error::FieldRange { ref field, ref value, .. } if field == "die" && value == "99999999999"),
            "{err}"
        );
        assert!(!err.to_string().contains("grammar"));
    }

    #[test]
    fn explicit_arg_disables_implicit_smu() {
        let (ec, args) = parse_suffix("_heater_2_10mA_arg_5V_3_7nm_1%").unwrap();
        assert_eq!(ec.len(), 1);
        assert_eq!(ec[0].device, "heater");
        assert_eq!(ec[0].value, Quantity::new(10.0, "mA"));
        assert_eq!(
            args,
            vec![
                Quantity::new(5.0, "V"),
                Quantity::new(3.0, ""),
                Quantity::new(7.0, "nm"),
                Quantity::new(1.0, "%"),
            ]
        );
    }

    #[test]
    fn smu_marker_applies_after_arg_block() {
        let (ec, args) = parse_suffix("_arg_2V_SMU_pn_1_-1.5V").unwrap();
        assert_eq!(args, vec![Quantity::new(2.0, "V")]);
        assert_eq!(ec[0].value, Quantity::new(-1.5, "V"));
    }

    #[test]
    fn three_bare_tokens_read_as_implicit_smu() {
        let (ec, args) = parse_suffix("_1V_2V_3V").unwrap();
        assert_eq!(ec.len(), 1);
        assert_eq!(ec[0].device, "1V");
        assert!(args.is_empty());
    }

    #[test]
    fn short_bare_suffix_keeps_order() {
        let (ec, args) = parse_suffix("_0.5V_+2nm").unwrap();
        assert!(ec.is_empty());
        assert_eq!(args, vec![Quantity::new(0.5, "V"), Quantity::new(2.0, "nm")]);
    }

    #[test]
    fn malformed_tokens_fail() {
        assert_eq!(parse_suffix("_SMU_pn_1_abc").unwrap_err(), "abc");
        assert!(parse_suffix("_SMU_pn_1").is_err());
        assert_eq!(parse_suffix("_arg").unwrap_err(), "arg");
        assert_eq!(parse_suffix("_V").unwrap_err(), "V");

        let err = parse("SPCM_W1_D1_die0_C1_X_25C_rep1_ch_1_2_0dBm_arg_x.csv").unwrap_err();
        assert!(matches!(err, Error::TokenFormat { ref token, .. } if token == "x"));
    }

    #[test]
    fn split_quantity_reads_prefix() {
        assert_eq!(split_quantity("-.5dB"), Some(Quantity::new(-0.5, "dB")));
        assert_eq!(split_quantity("12"), Some(Quantity::new(12.0, "")));
        assert_eq!(split_quantity("mV"), None);
    }

    #[test]
    fn file_name_round_trips() {
        for name in [
            "SPCM_W001_D1_die2_C1_Dev1_25C_rep1_ch_1_2_-10dBm_SMU_pn_1_900mV_arg_2.5V.csv",
            "DCIV_PIC9_DOE1_MRM158_die1_1_85C_#4_D4_ch_9_9_5dBm.s2p",
        ] {
            let rec = parse(name).unwrap();
            let ext = name.rsplit('.').next().unwrap();
            let again = parse(&rec.file_name(ext)).unwrap();
            assert_eq!(rec, again);
            assert_eq!(rec.file_name(ext), name);
        }
    }
}
