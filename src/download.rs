//! HuggingFace Hub download of the model's `config.json`.
//!
//! Only the speaker table is needed in-process; weights and dictionaries are
//! the backend's business.  Files are cached in the hub cache directory
//! (`~/.cache/huggingface/hub` by default), so only the first start needs the
//! network.  Set `HF_ENDPOINT` (or `--hub-endpoint`) to go through a mirror.

use std::path::PathBuf;

use anyhow::{Context, Result};
use hf_hub::api::sync::ApiBuilder;

use crate::speakers::SpeakerTable;

/// Default organisation for bare repository names.
const DEFAULT_ORG: &str = "myshell-ai";

/// Expand bare model names (e.g. `"MeloTTS-Chinese"` → `"myshell-ai/MeloTTS-Chinese"`).
fn qualify_repo_id(repo_id: &str) -> String {
    if repo_id.contains('/') {
        repo_id.to_string()
    } else {
        format!("{DEFAULT_ORG}/{repo_id}")
    }
}

/// Download (or reuse the cached) `config.json` of `repo_id`.
pub fn fetch_model_config(repo_id: &str, endpoint: Option<&str>) -> Result<PathBuf> {
    let repo_id = qualify_repo_id(repo_id);

    let mut builder = ApiBuilder::new().with_progress(false);
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint.trim_end_matches('/').to_string());
    }
    let api = builder.build().context("Failed to initialise HuggingFace Hub client")?;

    tracing::info!(repo = %repo_id, endpoint = endpoint.unwrap_or("default"), "fetching model config");
    api.model(repo_id.clone())
        .get("config.json")
        .with_context(|| format!("Failed to download 'config.json' from '{repo_id}'"))
}

/// Download `config.json` of `repo_id` and parse its speaker table.
pub fn load_speakers_from_hub(repo_id: &str, endpoint: Option<&str>) -> Result<SpeakerTable> {
    let path = fetch_model_config(repo_id, endpoint)?;
    SpeakerTable::from_config_file(&path)
}
