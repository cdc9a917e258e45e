use indexmap::IndexMap;
use log::{info, warn};
use std::path::Path;

use crate::csv::parse_line;
use crate::error::{MigrateError, Result};

/// Attribution used when the source record carries no identity at all.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Translates source usernames into destination usernames.
///
/// Unmapped identities pass through unchanged: best-effort attribution is
/// preferred over failing the record.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    entries: IndexMap<String, String>,
}

impl IdentityMap {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load a mapping table.
    ///
    /// `.json` files hold an object of `source: destination` pairs; anything
    /// else is read as two-column CSV (first column source, second
    /// destination, extra columns ignored). A missing file yields an empty
    /// table.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.is_file() {
            warn!("User map {} not found, using pass-through mapping", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let map = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&content)?,
            _ => Self::parse_csv(&content),
        };

        info!("Loaded {} user mappings from {}", map.len(), path.display());
        Ok(map)
    }

    fn parse_csv(content: &str) -> Self {
        Self::from_pairs(content.lines().filter_map(|line| {
            let fields = parse_line(line);
            match fields.as_slice() {
                [source, destination, ..] => {
                    Some((source.trim().to_string(), destination.trim().to_string()))
                }
                _ => None,
            }
        }))
    }

    fn parse_json(content: &str) -> Result<Self> {
        let entries: IndexMap<String, String> = serde_json::from_str(content).map_err(|e| {
            MigrateError::Config(format!("User map must be a JSON object of strings: {e}"))
        })?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map a source identity, never returning an empty string.
    pub fn map(&self, source: Option<&str>) -> String {
        match source.map(str::trim) {
            None | Some("") => UNKNOWN_IDENTITY.to_string(),
            Some(name) => self.lookup(name).unwrap_or(name).to_string(),
        }
    }

    /// Explicit table entry only, without pass-through.
    pub fn lookup(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }
}
