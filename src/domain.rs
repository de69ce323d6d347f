use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CollateError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetName(String);

impl TargetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetName {
    type Err = CollateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$").expect("target name pattern is valid")
        });
        let trimmed = value.trim();
        if trimmed.len() < 4 || !pattern.is_match(trimmed) {
            return Err(CollateError::InvalidTargetName(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XtalStatus {
    New,
    Unchanged,
    Supersedes,
    Deprecated,
}

impl XtalStatus {
    pub fn needs_alignment(self) -> bool {
        matches!(self, XtalStatus::New | XtalStatus::Supersedes)
    }
}

impl fmt::Display for XtalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XtalStatus::New => write!(f, "new"),
            XtalStatus::Unchanged => write!(f, "unchanged"),
            XtalStatus::Supersedes => write!(f, "supersedes"),
            XtalStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XtalFileKind {
    Structure,
    Reflections,
    LigandDescription,
}

impl XtalFileKind {
    pub const ALL: [XtalFileKind; 3] = [
        XtalFileKind::Structure,
        XtalFileKind::Reflections,
        XtalFileKind::LigandDescription,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            XtalFileKind::Structure => "pdb",
            XtalFileKind::Reflections => "mtz",
            XtalFileKind::LigandDescription => "cif",
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            XtalFileKind::Structure => "xtal_pdb",
            XtalFileKind::Reflections => "xtal_mtz",
            XtalFileKind::LigandDescription => "ligand_cif",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LigandId {
    pub dtag: String,
    pub chain: String,
    pub residue: String,
}

impl LigandId {
    pub fn new(dtag: impl Into<String>, chain: impl Into<String>, residue: impl Into<String>) -> Self {
        Self {
            dtag: dtag.into(),
            chain: chain.into(),
            residue: residue.into(),
        }
    }
}

impl fmt::Display for LigandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dtag, self.chain, self.residue)
    }
}

/// Parses a `last_updated` value. Returns `None` for anything that cannot be
/// compared, which callers treat the same as a missing timestamp.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
