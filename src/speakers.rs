//! Speaker table: language / voice code → backend speaker id.
//!
//! Parsed from the model's `config.json`.  Two layouts are accepted:
//!
//! ```json
//! { "data": { "spk2id": { "ZH": 1, "EN": 0 } } }   // MeloTTS hyper-parameters
//! { "spk2id": { "ZH": 1, "EN": 0 } }               // flat
//! ```

use std::{collections::BTreeMap, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Backend-internal speaker identifier.
pub type SpeakerId = u32;

/// Read-only mapping from language code to [`SpeakerId`].
///
/// Lookups are exact and case-sensitive: `"EN-US"` and `"en-us"` are
/// different keys, as they are in the model's own config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerTable {
    entries: BTreeMap<String, SpeakerId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// config.json schema (only the parts we read)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ModelConfig {
    #[serde(default)]
    data: Option<DataSection>,
    #[serde(default)]
    spk2id: Option<BTreeMap<String, SpeakerId>>,
}

#[derive(Debug, Deserialize)]
struct DataSection {
    #[serde(default)]
    spk2id: Option<BTreeMap<String, SpeakerId>>,
}

impl SpeakerTable {
    pub fn new(entries: impl IntoIterator<Item = (String, SpeakerId)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    /// Parse a model `config.json` document.
    pub fn from_config_json(bytes: &[u8]) -> Result<Self> {
        let config: ModelConfig =
            serde_json::from_slice(bytes).context("Failed to parse model config.json")?;

        let entries = config
            .data
            .and_then(|d| d.spk2id)
            .or(config.spk2id)
            .context("config.json has no `data.spk2id` or `spk2id` speaker table")?;

        if entries.is_empty() {
            bail!("config.json speaker table is empty");
        }
        Ok(Self { entries })
    }

    /// Read and parse a model `config.json` from disk.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read speaker config: {}", path.display()))?;
        Self::from_config_json(&bytes)
            .with_context(|| format!("Invalid speaker config: {}", path.display()))
    }

    pub fn get(&self, language: &str) -> Option<SpeakerId> {
        self.entries.get(language).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Language codes, sorted.
    pub fn languages(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Speaker ids in language order.
    pub fn speaker_ids(&self) -> Vec<SpeakerId> {
        self.entries.values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_melo_layout() {
        let json = br#"{"data": {"sampling_rate": 44100, "spk2id": {"ZH": 1, "EN": 0}}, "model": {}}"#;
        let table = SpeakerTable::from_config_json(json).unwrap();
        assert_eq!(table.get("ZH"), Some(1));
        assert_eq!(table.get("EN"), Some(0));
        assert_eq!(table.languages(), vec!["EN", "ZH"]);
        assert_eq!(table.speaker_ids(), vec![0, 1]);
    }

    #[test]
    fn test_parse_flat_layout() {
        let table = SpeakerTable::from_config_json(br#"{"spk2id": {"EN-US": 3}}"#).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("EN-US"), Some(3));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let table = SpeakerTable::new([("ZH".to_string(), 1)]);
        assert_eq!(table.get("zh"), None);
        assert_eq!(table.get(" ZH"), None);
    }

    #[test]
    fn test_missing_or_empty_table_is_an_error() {
        assert!(SpeakerTable::from_config_json(br#"{"data": {}}"#).is_err());
        assert!(SpeakerTable::from_config_json(br#"{"spk2id": {}}"#).is_err());
        assert!(SpeakerTable::from_config_json(b"not json").is_err());
    }

    #[test]
    fn test_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data": {"spk2id": {"ZH": 1}}}"#).unwrap();
        assert_eq!(SpeakerTable::from_config_file(&path).unwrap().get("ZH"), Some(1));
        assert!(SpeakerTable::from_config_file(&dir.path().join("missing.json")).is_err());
    }
}
