//! Immutable telemetry readings and the line parser that produces them.
//!
//! A producer line such as
//!
//! ```text
//! RAM 2262/3956MB (lfb 2x4MB) CPU [12%@102,off] GR3D_FREQ 0%@76 CPU@26C VDD_IN 3000/2980
//! ```
//!
//! becomes a flat map of metric names to typed [`Metric`] values:
//! `RAM`, `RAM.total`, `CPU.0`, `CPU.0.freq`, `CPU.1`, `GR3D_FREQ`,
//! `GR3D_FREQ.freq`, `TEMP.CPU`, `VDD_IN`, `VDD_IN.avg`.
//!
//! Parsing is pure. The reader stamps the sequence number and capture time
//! when it wraps the parsed fields in a [`Snapshot`].

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{ParseError, ParseErrorKind};

/// Metric map carried by a snapshot, ordered by name.
pub type Fields = BTreeMap<String, Metric>;

/// Fields every tegrastats line is expected to report.
pub const TEGRASTATS_FIELDS: &[&str] = &["RAM", "SWAP", "CPU", "EMC_FREQ", "GR3D_FREQ"];

/// Prefix under which `NAME@<temp>` thermal tokens are stored.
pub const THERMAL_PREFIX: &str = "TEMP";

// ---------------------------------------------------------------------------
// Metric values
// ---------------------------------------------------------------------------

/// Physical unit attached to a numeric metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    None,
    Percent,
    MegaHertz,
    MilliVolt,
    MilliWatt,
    MilliAmp,
    Celsius,
    KiloByte,
    MegaByte,
    GigaByte,
}

impl Unit {
    fn from_suffix(suffix: &str) -> Option<Self> {
        let unit = match suffix {
            "" => Self::None,
            "%" => Self::Percent,
            "MHz" => Self::MegaHertz,
            "mV" => Self::MilliVolt,
            "mW" => Self::MilliWatt,
            "mA" => Self::MilliAmp,
            "C" => Self::Celsius,
            "kB" | "KB" => Self::KiloByte,
            "MB" => Self::MegaByte,
            "GB" => Self::GigaByte,
            _ => return None,
        };
        Some(unit)
    }

    /// Memory units pair as `used/total`; everything else as `current/average`.
    fn is_memory(self) -> bool {
        matches!(self, Self::KiloByte | Self::MegaByte | Self::GigaByte)
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Percent => write!(f, "%"),
            Self::MegaHertz => write!(f, "MHz"),
            Self::MilliVolt => write!(f, "mV"),
            Self::MilliWatt => write!(f, "mW"),
            Self::MilliAmp => write!(f, "mA"),
            Self::Celsius => write!(f, "C"),
            Self::KiloByte => write!(f, "kB"),
            Self::MegaByte => write!(f, "MB"),
            Self::GigaByte => write!(f, "GB"),
        }
    }
}

/// Enumerated on/off state, e.g. a parked CPU core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    On,
    Off,
}

impl std::fmt::Display for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// A single typed metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Integer { value: i64, unit: Unit },
    Float { value: f64, unit: Unit },
    State(Switch),
    /// Expected by the schema but absent from this reading.
    Unknown,
}

impl Metric {
    /// Numeric value, if this metric carries one.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Integer { value, .. } => Some(value as f64),
            Self::Float { value, .. } => Some(value),
            Self::State(_) | Self::Unknown => None,
        }
    }

    pub fn unit(&self) -> Unit {
        match *self {
            Self::Integer { unit, .. } | Self::Float { unit, .. } => unit,
            Self::State(_) | Self::Unknown => Unit::None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer { value, unit } => write!(f, "{value}{unit}"),
            Self::Float { value, unit } => write!(f, "{value:.1}{unit}"),
            Self::State(state) => write!(f, "{state}"),
            Self::Unknown => write!(f, "?"),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One immutable, fully parsed telemetry reading.
///
/// There are no mutating methods: a new reading is a new `Snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    sequence: u64,
    captured_unix_ms: u64,
    fields: Fields,
}

impl Snapshot {
    /// Wrap parsed fields, stamping the capture time.
    pub fn new(sequence: u64, fields: Fields) -> Self {
        let captured_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            sequence,
            captured_unix_ms,
            fields,
        }
    }

    /// Position of this reading in the reader's publish order, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_unix_ms(&self) -> u64 {
        self.captured_unix_ms
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.fields.get(name)
    }

    /// Numeric value of `name`, if present and known.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Metric::as_f64)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Children of `prefix` (`prefix.<child>`), excluding nested grandchildren.
    ///
    /// For `CPU` this yields `CPU.0`, `CPU.1`, ... but not `CPU.0.freq`.
    pub fn children<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Metric)> + 'a {
        self.fields
            .range(format!("{prefix}.")..)
            .map_while(move |(name, metric)| {
                let child = name.strip_prefix(prefix)?.strip_prefix('.')?;
                Some((child, metric))
            })
            .filter(|(child, _)| !child.contains('.'))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Stateless line parser with a set of fields every line should carry.
#[derive(Debug, Clone, Default)]
pub struct SnapshotParser {
    expected: Vec<String>,
}

impl SnapshotParser {
    pub fn new<I, S>(expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: expected.into_iter().map(Into::into).collect(),
        }
    }

    /// Parser for stock tegrastats output.
    pub fn tegrastats() -> Self {
        Self::new(TEGRASTATS_FIELDS.iter().copied())
    }

    pub fn expected(&self) -> &[String] {
        &self.expected
    }

    /// Parse one producer line into its metric map.
    ///
    /// Expected fields missing from the line come back as [`Metric::Unknown`].
    pub fn parse(&self, line: &str) -> Result<Fields, ParseError> {
        let mut fields = parse_tokens(line)?;
        for name in &self.expected {
            if !has_field(&fields, name) {
                fields.insert(name.clone(), Metric::Unknown);
            }
        }
        Ok(fields)
    }
}

fn has_field(fields: &Fields, name: &str) -> bool {
    if fields.contains_key(name) {
        return true;
    }
    fields
        .range(format!("{name}.")..)
        .next()
        .is_some_and(|(k, _)| k.strip_prefix(name).is_some_and(|rest| rest.starts_with('.')))
}

fn parse_tokens(line: &str) -> Result<Fields, ParseError> {
    let mut fields = Fields::new();
    let mut tokens = strip_annotations(line).into_iter().peekable();

    while let Some(token) = tokens.next() {
        if let Some((key, raw)) = token.split_once('=') {
            check_key(key, token)?;
            insert_value(&mut fields, key, raw)?;
            continue;
        }

        if looks_like_value(token) {
            return Err(ParseError::new(token, ParseErrorKind::MissingKey));
        }

        if let Some((name, raw)) = token.split_once('@') {
            check_key(name, token)?;
            let key = format!("{THERMAL_PREFIX}.{name}");
            fields.insert(key, parse_scalar(raw, token)?);
            continue;
        }

        check_key(token, token)?;
        match tokens.peek() {
            Some(next) if looks_like_value(next) => {
                let raw = tokens.next().unwrap_or_default();
                insert_value(&mut fields, token, raw)?;
            }
            _ => {
                fields.insert(token.to_string(), Metric::Unknown);
            }
        }
    }

    Ok(fields)
}

/// Whitespace tokens with `(`...`)` vendor annotations removed.
///
/// An annotation may stand alone (`(lfb 2x4MB)`) or hang off a value
/// (`0/252kB(lfb 252kB)`); in the second case the value part is kept.
fn strip_annotations(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut in_annotation = false;
    for token in line.split_whitespace() {
        if in_annotation {
            in_annotation = !token.contains(')');
            continue;
        }
        match token.split_once('(') {
            Some((head, rest)) => {
                in_annotation = !rest.contains(')');
                if !head.is_empty() {
                    tokens.push(head);
                }
            }
            None => tokens.push(token),
        }
    }
    tokens
}

fn looks_like_value(token: &str) -> bool {
    token.eq_ignore_ascii_case("on")
        || token.eq_ignore_ascii_case("off")
        || token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | '['))
}

fn check_key(key: &str, token: &str) -> Result<(), ParseError> {
    let valid = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ParseError::new(token, ParseErrorKind::InvalidKey))
    }
}

fn insert_value(fields: &mut Fields, key: &str, raw: &str) -> Result<(), ParseError> {
    if let Some(list) = raw.strip_prefix('[') {
        let inner = list.strip_suffix(']').unwrap_or(list);
        for (i, item) in inner.split(',').enumerate() {
            if item.is_empty() {
                return Err(ParseError::new(raw, ParseErrorKind::EmptyListItem));
            }
            insert_value(fields, &format!("{key}.{i}"), item)?;
        }
        return Ok(());
    }

    if let Some((current, other)) = raw.split_once('/') {
        let (other_value, unit) = parse_number(other, raw)?;
        let (current_value, current_unit) = parse_number(current, raw)?;
        if current_unit != Unit::None && current_unit != unit {
            return Err(ParseError::new(raw, ParseErrorKind::UnknownUnit));
        }
        let suffix = if unit.is_memory() { "total" } else { "avg" };
        fields.insert(key.to_string(), current_value.with_unit(unit));
        fields.insert(format!("{key}.{suffix}"), other_value.with_unit(unit));
        return Ok(());
    }

    if let Some((value, freq)) = raw.split_once('@') {
        fields.insert(key.to_string(), parse_scalar(value, raw)?);
        let freq = match parse_scalar(freq, raw)? {
            Metric::Integer { value, unit: Unit::None } => Metric::Integer {
                value,
                unit: Unit::MegaHertz,
            },
            Metric::Float { value, unit: Unit::None } => Metric::Float {
                value,
                unit: Unit::MegaHertz,
            },
            other => other,
        };
        fields.insert(format!("{key}.freq"), freq);
        return Ok(());
    }

    fields.insert(key.to_string(), parse_scalar(raw, raw)?);
    Ok(())
}

/// Parse a single value: `on`/`off` or a number with an optional unit.
fn parse_scalar(raw: &str, token: &str) -> Result<Metric, ParseError> {
    if raw.eq_ignore_ascii_case("on") {
        return Ok(Metric::State(Switch::On));
    }
    if raw.eq_ignore_ascii_case("off") {
        return Ok(Metric::State(Switch::Off));
    }
    let (number, unit) = parse_number(raw, token)?;
    Ok(number.with_unit(unit))
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    fn with_unit(self, unit: Unit) -> Metric {
        match self {
            Self::Integer(value) => Metric::Integer { value, unit },
            Self::Float(value) => Metric::Float { value, unit },
        }
    }
}

fn parse_number(raw: &str, token: &str) -> Result<(Number, Unit), ParseError> {
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.')))
        .unwrap_or(raw.len());
    let (digits, suffix) = raw.split_at(split);
    if digits.is_empty() {
        return Err(ParseError::new(token, ParseErrorKind::InvalidNumber));
    }
    let unit = Unit::from_suffix(suffix)
        .ok_or_else(|| ParseError::new(token, ParseErrorKind::UnknownUnit))?;
    let number = if digits.contains('.') {
        digits
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Number::Float)
    } else {
        digits.parse::<i64>().ok().map(Number::Integer)
    };
    let number = number.ok_or_else(|| ParseError::new(token, ParseErrorKind::InvalidNumber))?;
    Ok((number, unit))
}
