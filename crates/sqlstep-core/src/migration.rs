//! Migration entry types and the filename grammar

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which way a migration entry moves the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// The token used in migration file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Down => write!(f, "Down"),
        }
    }
}

/// A single discovered migration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    /// Version number this entry belongs to
    pub number: u32,

    /// Up or down
    pub direction: Direction,

    /// Entry name within its source (the file name for directories)
    pub name: String,
}

impl MigrationFile {
    /// Parse an entry name of the form `<number>[-<description>].<up|down>.sql`.
    ///
    /// Returns `Ok(None)` for names that do not have the three-segment
    /// `*.*.sql` shape; those are not migrations and are ignored by the
    /// loader. A shaped name with a non-numeric prefix is `InvalidFilename`,
    /// and one with an unknown direction token is `BadFilename`.
    pub fn parse(name: &str) -> Result<Option<Self>> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 3 || parts[2] != "sql" {
            return Ok(None);
        }

        let number_part = parts[0].split('-').next().unwrap_or_default();
        if !number_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidFilename(name.to_string()));
        }
        let number: u32 = number_part
            .parse()
            .map_err(|_| Error::InvalidFilename(name.to_string()))?;

        let direction =
            Direction::from_token(parts[1]).ok_or_else(|| Error::BadFilename(name.to_string()))?;

        Ok(Some(Self {
            number,
            direction,
            name: name.to_string(),
        }))
    }
}

/// The version a run should finish at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The highest discovered migration number
    Latest,
    /// An explicit version
    Version(u32),
}

impl Target {
    /// Raw value callers use to ask for the latest version
    pub const LATEST: i64 = -1;

    /// Convert the raw integer form, where `-1` means latest
    pub fn from_raw(raw: i64) -> Result<Self> {
        if raw == Self::LATEST {
            return Ok(Target::Latest);
        }
        u32::try_from(raw)
            .map(Target::Version)
            .map_err(|_| Error::InvalidTarget(raw))
    }

    /// Resolve to a concrete version given the highest known migration
    pub fn resolve(self, latest: u32) -> Result<u32> {
        match self {
            Target::Latest => Ok(latest),
            Target::Version(v) if v > latest => Err(Error::TargetOutOfRange { target: v, latest }),
            Target::Version(v) => Ok(v),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Latest => write!(f, "latest"),
            Target::Version(v) => write!(f, "{}", v),
        }
    }
}
