//! Benchmark loading
//!
//! A benchmark file is a JSON object mapping challenge ids to entries:
//!
//! ```json
//! {
//!   "obedient-cat": {
//!     "description": "This file has a flag in plain sight.",
//!     "files": ["https://example.org/flag"],
//!     "flag": "picoCTF{s4n1ty_v3r1f13d}"
//!   }
//! }
//! ```
//!
//! Entries are loaded once into immutable [`ChallengeRecord`]s in file order.
//! Entries without a usable flag, or that don't parse, are skipped with a
//! warning instead of failing the whole load.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Used when a challenge has no description
pub const DEFAULT_DESCRIPTION: &str = "There is no information for this level";

/// Flags shorter than this (after trimming) are treated as bogus
const MIN_FLAG_LEN: usize = 2;

#[derive(Debug, Deserialize)]
struct RawChallenge {
    #[serde(default)]
    flag: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: Vec<String>,
}

/// One benchmark challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    pub id: String,
    /// Known flag, already trimmed
    pub flag: String,
    pub description: Option<String>,
    /// URLs of files to stage into the sandbox
    pub files: Vec<String>,
}

impl ChallengeRecord {
    /// File names as they will appear in the sandbox working directory
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|url| file_name(url).to_string()).collect()
    }

    /// Challenge text handed to the planner after its user prompt
    pub fn target_text(&self, preamble: &str) -> String {
        let description = self
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION);

        let mut text = format!("{}\nChallenge description: {}", preamble, description);
        let names = self.file_names();
        if !names.is_empty() {
            text.push_str(&format!("\nFiles: {}", names.join(",")));
        }
        text
    }
}

/// Last path segment of a URL
pub fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Why a benchmark entry was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    MissingFlag,
    FlagTooShort,
    Malformed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingFlag => write!(f, "no flag was found in the challenge"),
            SkipReason::FlagTooShort => write!(f, "flag format is wrong"),
            SkipReason::Malformed(msg) => write!(f, "malformed entry: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChallenge {
    pub id: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Error type for benchmark loading
#[derive(Debug)]
pub enum BenchmarkError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for BenchmarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchmarkError::Io(e) => write!(f, "Failed to read benchmark: {}", e),
            BenchmarkError::Parse(e) => write!(f, "Failed to parse benchmark: {}", e),
        }
    }
}

impl std::error::Error for BenchmarkError {}

impl From<std::io::Error> for BenchmarkError {
    fn from(e: std::io::Error) -> Self {
        BenchmarkError::Io(e)
    }
}

impl From<serde_json::Error> for BenchmarkError {
    fn from(e: serde_json::Error) -> Self {
        BenchmarkError::Parse(e)
    }
}

/// Loaded benchmark: ordered records plus the entries that were dropped
#[derive(Debug, Clone, Default)]
pub struct Benchmark {
    records: Vec<ChallengeRecord>,
    index: HashMap<String, usize>,
    skipped: Vec<SkippedChallenge>,
}

impl Benchmark {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BenchmarkError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, BenchmarkError> {
        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;

        let mut benchmark = Benchmark::default();
        for (id, value) in entries {
            match validate_entry(&id, value) {
                Ok(record) => benchmark.push(record),
                Err(reason) => {
                    warn!(challenge = %id, %reason, "Dropping challenge");
                    benchmark.skipped.push(SkippedChallenge { id, reason });
                }
            }
        }
        Ok(benchmark)
    }

    fn push(&mut self, record: ChallengeRecord) {
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn get(&self, id: &str) -> Option<&ChallengeRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChallengeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedChallenge] {
        &self.skipped
    }

    /// New benchmark holding only the given ids, in file order
    ///
    /// Unknown ids are returned separately so callers can fail fast.
    pub fn select(&self, ids: &[String]) -> (Benchmark, Vec<String>) {
        let unknown = ids
            .iter()
            .filter(|id| !self.index.contains_key(id.as_str()))
            .cloned()
            .collect();

        let mut selected = Benchmark {
            skipped: self.skipped.clone(),
            ..Default::default()
        };
        for record in self.records.iter().filter(|r| ids.contains(&r.id)) {
            selected.push(record.clone());
        }
        (selected, unknown)
    }
}

fn validate_entry(id: &str, value: serde_json::Value) -> Result<ChallengeRecord, SkipReason> {
    let raw: RawChallenge =
        serde_json::from_value(value).map_err(|e| SkipReason::Malformed(e.to_string()))?;

    let flag = raw.flag.ok_or(SkipReason::MissingFlag)?.trim().to_string();
    if flag.chars().count() < MIN_FLAG_LEN {
        return Err(SkipReason::FlagTooShort);
    }

    Ok(ChallengeRecord {
        id: id.to_string(),
        flag,
        description: raw.description,
        files: raw.files,
    })
}
