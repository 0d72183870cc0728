//! Value parser chain.
//!
//! Raw command output is turned into a typed [`SensorValue`] by running it through an
//! ordered list of parsers. Parsers are described declaratively by [`ParserSpec`]
//! (straight from configuration) and resolved once into a [`Parser`]; every
//! configuration mistake surfaces as a [`ConstructionError`] at that point, never
//! while polling.

use std::cmp::Ordering;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use super::error::ConstructionError;
use super::error::ParseFailure;
use super::value::SensorValue;

/// Texts the bool parser treats as `true` (compared lowercase). Anything else is `false`.
const TRUTHY: [&str; 5] = ["true", "1", "t", "y", "yes"];

/// Parser kinds accepted in the `type` field of a parser spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ParserKind {
    Identity,
    Int,
    Float,
    Bool,
    String,
    Compare,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum CompareOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

/// Capture group selector for the regex parser: by position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CaptureGroup {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for CaptureGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{}", i),
            Self::Name(n) => write!(f, "'{}'", n),
        }
    }
}

/// Declarative parser description as it appears in configuration, e.g.
/// `{ type = "compare", operator = ">", value = 10 }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParserSpec {
    #[serde(rename = "type")]
    pub kind: String,

    /// Operator for `compare`
    #[serde(default)]
    pub operator: Option<String>,

    /// Literal for `compare`
    #[serde(default)]
    pub value: Option<SensorValue>,

    /// Pattern for `regex`
    #[serde(default)]
    pub regex: Option<String>,

    /// Capture group for `regex`; the whole match when absent
    #[serde(default)]
    pub group: Option<CaptureGroup>,
}

impl ParserSpec {
    pub fn of(kind: ParserKind) -> Self {
        Self {
            kind: kind.to_string(),
            ..Default::default()
        }
    }
}

/// A single resolved parser stage.
#[derive(Debug, Clone)]
pub enum Parser {
    Identity,
    Int,
    Float,
    Bool,
    String,
    Compare {
        op: CompareOp,
        literal: SensorValue,
    },
    Regex {
        regex: Regex,
        group: Option<CaptureGroup>,
    },
}

impl Parser {
    /// Resolve a spec into a parser, validating everything that can be validated
    /// without input.
    pub fn build(spec: &ParserSpec) -> Result<Self, ConstructionError> {
        let kind = ParserKind::from_str(&spec.kind)
            .map_err(|_| ConstructionError::UnknownParser(spec.kind.clone()))?;

        let parser = match kind {
            ParserKind::Identity => Self::Identity,
            ParserKind::Int => Self::Int,
            ParserKind::Float => Self::Float,
            ParserKind::Bool => Self::Bool,
            ParserKind::String => Self::String,
            ParserKind::Compare => {
                let operator = spec
                    .operator
                    .as_deref()
                    .ok_or(ConstructionError::MissingParserField {
                        parser: "compare",
                        field: "operator",
                    })?;
                let op = CompareOp::from_str(operator)
                    .map_err(|_| ConstructionError::InvalidOperator(operator.to_string()))?;
                let literal = spec
                    .value
                    .clone()
                    .ok_or(ConstructionError::MissingParserField {
                        parser: "compare",
                        field: "value",
                    })?;
                Self::Compare { op, literal }
            }
            ParserKind::Regex => {
                let pattern = spec
                    .regex
                    .as_deref()
                    .ok_or(ConstructionError::MissingParserField {
                        parser: "regex",
                        field: "regex",
                    })?;
                let regex =
                    Regex::new(pattern).map_err(|source| ConstructionError::InvalidRegex {
                        pattern: pattern.to_string(),
                        source,
                    })?;

                if let Some(group) = &spec.group {
                    let known = match group {
                        CaptureGroup::Index(i) => *i < regex.captures_len(),
                        CaptureGroup::Name(name) => {
                            regex.capture_names().flatten().any(|n| n == name)
                        }
                    };
                    if !known {
                        return Err(ConstructionError::UnknownGroup {
                            pattern: pattern.to_string(),
                            group: group.to_string(),
                        });
                    }
                }

                Self::Regex {
                    regex,
                    group: spec.group.clone(),
                }
            }
        };

        Ok(parser)
    }

    pub fn kind(&self) -> ParserKind {
        match self {
            Self::Identity => ParserKind::Identity,
            Self::Int => ParserKind::Int,
            Self::Float => ParserKind::Float,
            Self::Bool => ParserKind::Bool,
            Self::String => ParserKind::String,
            Self::Compare { .. } => ParserKind::Compare,
            Self::Regex { .. } => ParserKind::Regex,
        }
    }

    /// Apply this stage. Pure: the same input always gives the same result.
    pub fn parse(&self, input: SensorValue) -> Result<SensorValue, ParseFailure> {
        match self {
            Self::Identity => Ok(input),
            Self::Int => parse_int(input),
            Self::Float => parse_float(input),
            Self::Bool => {
                let text = input.to_string().to_lowercase();
                Ok(SensorValue::Bool(TRUTHY.contains(&text.as_str())))
            }
            Self::String => match input {
                SensorValue::String(_) => Ok(input),
                other => Ok(SensorValue::String(other.to_string())),
            },
            Self::Compare { op, literal } => compare(*op, &input, literal).map(SensorValue::Bool),
            Self::Regex { regex, group } => {
                let text = input.to_string();
                let found = regex.captures(&text).and_then(|caps| {
                    let m = match group {
                        None => caps.get(0),
                        Some(CaptureGroup::Index(i)) => caps.get(*i),
                        Some(CaptureGroup::Name(name)) => caps.name(name),
                    };
                    m.map(|m| m.as_str().to_string())
                });
                Ok(found.map(SensorValue::String).unwrap_or(SensorValue::None))
            }
        }
    }
}

fn parse_int(input: SensorValue) -> Result<SensorValue, ParseFailure> {
    match &input {
        SensorValue::Int(_) => Ok(input),
        SensorValue::Bool(b) => Ok(SensorValue::Int(i64::from(*b))),
        SensorValue::Float(x) if x.is_finite() => Ok(SensorValue::Int(x.trunc() as i64)),
        SensorValue::String(s) => {
            let cleaned = strip_digit_separators(s.trim()).ok_or_else(|| {
                ParseFailure::new("int", &input, "misplaced digit separator")
            })?;
            cleaned
                .parse::<i64>()
                .map(SensorValue::Int)
                .map_err(|e| ParseFailure::new("int", &input, e.to_string()))
        }
        _ => Err(ParseFailure::new("int", &input, "not an integer")),
    }
}

/// Drop `_` separators, which may only sit between two digits (`1_000`, not `_5` or `1__0`).
fn strip_digit_separators(text: &str) -> Option<String> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text).as_bytes();
    let well_placed = digits.iter().enumerate().all(|(i, &b)| {
        b != b'_'
            || (i > 0
                && i + 1 < digits.len()
                && digits[i - 1].is_ascii_digit()
                && digits[i + 1].is_ascii_digit())
    });
    well_placed.then(|| text.replace('_', ""))
}

fn parse_float(input: SensorValue) -> Result<SensorValue, ParseFailure> {
    match &input {
        SensorValue::Float(_) => Ok(input),
        SensorValue::Int(i) => Ok(SensorValue::Float(*i as f64)),
        SensorValue::Bool(b) => Ok(SensorValue::Float(if *b { 1.0 } else { 0.0 })),
        SensorValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map(SensorValue::Float)
            .map_err(|e| ParseFailure::new("float", &input, e.to_string())),
        SensorValue::None => Err(ParseFailure::new("float", &input, "not a number")),
    }
}

fn compare(op: CompareOp, value: &SensorValue, literal: &SensorValue) -> Result<bool, ParseFailure> {
    let ordering = value.partial_cmp_value(literal);

    // Equality across mismatched kinds is well defined: they are never equal
    match op {
        CompareOp::Eq => return Ok(ordering == Some(Ordering::Equal)),
        CompareOp::Ne => return Ok(ordering != Some(Ordering::Equal)),
        _ => {}
    }

    let ordering = ordering.ok_or_else(|| {
        ParseFailure::new(
            "compare",
            value,
            format!("cannot order {} against {} {}", value.kind(), literal.kind(), literal),
        )
    })?;

    Ok(match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
    })
}

/// Ordered parser stages applied left to right.
#[derive(Debug, Clone, Default)]
pub struct ParserChain {
    stages: Vec<Parser>,
}

impl ParserChain {
    pub fn new(stages: Vec<Parser>) -> Self {
        Self { stages }
    }

    /// Build every stage from its spec; the first invalid spec fails the whole chain.
    pub fn from_specs(specs: &[ParserSpec]) -> Result<Self, ConstructionError> {
        specs
            .iter()
            .map(Parser::build)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run raw command output through every stage. The first failure aborts the chain.
    pub fn apply(&self, raw: &str) -> Result<SensorValue, ParseFailure> {
        self.stages
            .iter()
            .try_fold(SensorValue::String(raw.to_string()), |value, stage| {
                stage.parse(value)
            })
    }
}
