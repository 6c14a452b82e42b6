//! Source references used by parameter mappings
//!
//! A mapping names the step whose output feeds a parameter, optionally
//! followed by a path into that output: `fetch`, `fetch.body.items.0` or the
//! interpolation form `${fetch.body}`. The step id is parsed once here so
//! dependency extraction and lookup never re-split strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ChainError, Result};

/// How a mapped value is taken from the source step's output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// The entire output of the source step, path ignored
    #[default]
    WholeOutput,
    /// Walk the path through objects (by key) and arrays (by index)
    NestedPath,
}

/// Parsed `stepId[.path...]` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceRef {
    step_id: String,
    path: Vec<String>,
}

impl SourceRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = match trimmed.strip_prefix("${") {
            Some(rest) => rest
                .strip_suffix('}')
                .ok_or_else(|| ChainError::invalid_reference(raw, "unterminated '${'"))?,
            None => trimmed,
        };

        let mut segments = body.split('.');
        let step_id = segments.next().unwrap_or_default().trim();
        if step_id.is_empty() {
            return Err(ChainError::invalid_reference(raw, "missing step id"));
        }

        let path = segments
            .map(|segment| {
                let segment = segment.trim();
                if segment.is_empty() {
                    Err(ChainError::invalid_reference(raw, "empty path segment"))
                } else {
                    Ok(segment.to_string())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            step_id: step_id.to_string(),
            path,
        })
    }

    /// Reference to the whole output of a step
    pub fn step(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            path: Vec::new(),
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Pick the referenced value out of the source step's output
    pub fn select<'a>(&self, output: &'a Value, mode: MappingMode) -> Option<&'a Value> {
        match mode {
            MappingMode::WholeOutput => Some(output),
            MappingMode::NestedPath => self.path.iter().try_fold(output, |current, segment| {
                match current {
                    Value::Object(map) => map.get(segment),
                    Value::Array(items) => segment
                        .parse::<usize>()
                        .ok()
                        .and_then(|index| items.get(index)),
                    _ => None,
                }
            }),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.step_id)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for SourceRef {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SourceRef {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SourceRef> for String {
    fn from(value: SourceRef) -> Self {
        value.to_string()
    }
}
