//! Model file resolution: a local directory or a HuggingFace Hub repo
//!
//! Weights and tokenizer files are resolved independently so each can be
//! pinned to its own revision. Hub files land in the standard HF cache and
//! are addressed through their snapshot directory.

use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use hfserve_types::{ModelLoadConfig, Result, ServeError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_REVISION: &str = "main";

/// Tokenizer files, fetched when present
const TOKENIZER_FILES: &[&str] = &["tokenizer.json", "tokenizer_config.json"];

/// Optional metadata next to `config.json`
const OPTIONAL_MODEL_FILES: &[&str] = &["generation_config.json", "modules.json"];

/// Where each part of a model lives on disk
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// Directory holding `config.json` (and weights when fetched)
    pub model_dir: PathBuf,
    /// Directory holding `tokenizer.json`
    pub tokenizer_dir: PathBuf,
    pub model_revision: Option<String>,
    pub tokenizer_revision: Option<String>,
}

impl ModelFiles {
    /// Use a local directory for everything
    pub fn local<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            model_dir: dir.clone(),
            tokenizer_dir: dir,
            model_revision: None,
            tokenizer_revision: None,
        }
    }

    /// Resolve the files for `config`. Weights are only fetched when
    /// `with_weights` is set, i.e. when inference runs in-process.
    pub fn resolve(config: &ModelLoadConfig, with_weights: bool) -> Result<Self> {
        let local = Path::new(&config.model_id_or_path);
        if local.is_dir() {
            debug!("Using local model directory {}", local.display());
            let mut files = Self::local(local);
            files.model_revision = config.model_revision.clone();
            files.tokenizer_revision = config.tokenizer_revision.clone();
            return Ok(files);
        }

        let api = hub_api()?;
        let model_id = config.model_id_or_path.as_str();
        let model_revision = config
            .model_revision
            .clone()
            .unwrap_or_else(|| DEFAULT_REVISION.to_string());
        let tokenizer_revision = config
            .tokenizer_revision
            .clone()
            .unwrap_or_else(|| model_revision.clone());

        info!(
            model_id,
            model_revision = %model_revision,
            tokenizer_revision = %tokenizer_revision,
            "Resolving model from the Hub"
        );

        let model_repo = hub_repo(&api, model_id, &model_revision);
        let config_path = fetch(&model_repo, model_id, "config.json")?;
        let model_dir = snapshot_dir(&config_path)?;

        for file in OPTIONAL_MODEL_FILES {
            fetch_optional(&model_repo, file);
        }
        if let Some(pooling_dir) = crate::pooling::pooling_module_path(&model_dir)? {
            fetch_optional(&model_repo, &format!("{}/config.json", pooling_dir));
        }
        if with_weights {
            fetch_weights(&model_repo, model_id)?;
        }

        let tokenizer_repo = hub_repo(&api, model_id, &tokenizer_revision);
        let tokenizer_path = fetch(&tokenizer_repo, model_id, TOKENIZER_FILES[0])?;
        for file in &TOKENIZER_FILES[1..] {
            fetch_optional(&tokenizer_repo, file);
        }
        let tokenizer_dir = snapshot_dir(&tokenizer_path)?;

        Ok(Self {
            model_dir,
            tokenizer_dir,
            model_revision: Some(model_revision),
            tokenizer_revision: Some(tokenizer_revision),
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.model_dir.join("config.json")
    }
}

fn hub_api() -> Result<Api> {
    let token = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());
    ApiBuilder::new()
        .with_token(token)
        .build()
        .map_err(|e| ServeError::network(format!("Failed to create HF API: {}", e)))
}

fn hub_repo(api: &Api, model_id: &str, revision: &str) -> ApiRepo {
    api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ))
}

fn fetch(repo: &ApiRepo, model_id: &str, file: &str) -> Result<PathBuf> {
    repo.get(file).map_err(|e| {
        ServeError::model(format!("Failed to fetch {} from {}: {}", file, model_id, e))
    })
}

fn fetch_optional(repo: &ApiRepo, file: &str) -> Option<PathBuf> {
    match repo.get(file) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("Optional file {} not available: {}", file, e);
            None
        }
    }
}

/// Fetch `model.safetensors`, or every shard listed in the index
fn fetch_weights(repo: &ApiRepo, model_id: &str) -> Result<()> {
    if let Some(index) = fetch_optional(repo, "model.safetensors.index.json") {
        let shards = crate::weights::shard_files(&index)?;
        info!("Fetching {} weight shards", shards.len());
        for shard in shards {
            fetch(repo, model_id, &shard)?;
        }
        return Ok(());
    }
    fetch(repo, model_id, "model.safetensors").map(|_| ())
}

/// Directory a fetched file was materialised in
fn snapshot_dir(file: &Path) -> Result<PathBuf> {
    file.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ServeError::internal(format!("{} has no parent", file.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_directory_is_used_as_is() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().to_string_lossy().to_string();
        let config = ModelLoadConfig::new("bert", &path).with_tokenizer_revision("v1");

        let files = ModelFiles::resolve(&config, true).unwrap();
        assert_eq!(files.model_dir, temp.path());
        assert_eq!(files.tokenizer_dir, temp.path());
        assert_eq!(files.tokenizer_revision.as_deref(), Some("v1"));
        assert_eq!(files.config_path(), temp.path().join("config.json"));
    }
}
