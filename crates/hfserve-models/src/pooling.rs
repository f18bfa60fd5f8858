//! Embedding pooling from a sentence-transformers model layout
//!
//! `modules.json` lists the pipeline modules; the `Pooling` module's
//! directory holds a `config.json` with `pooling_mode_*` flags.

use hfserve_types::{PoolingStrategy, Result, ServeError};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    #[serde(default)]
    path: String,
    #[serde(rename = "type", default)]
    module_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PoolingConfig {
    pooling_mode_cls_token: bool,
    pooling_mode_mean_tokens: bool,
    pooling_mode_max_tokens: bool,
    pooling_mode_mean_sqrt_len_tokens: bool,
    pooling_mode_weightedmean_tokens: bool,
    pooling_mode_lasttoken: bool,
}

/// Relative directory of the pooling module, if `modules.json` declares one
pub fn pooling_module_path(model_dir: &Path) -> Result<Option<String>> {
    let modules_path = model_dir.join("modules.json");
    if !modules_path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&modules_path)?;
    let modules: Vec<ModuleEntry> = serde_json::from_str(&content)
        .map_err(|e| ServeError::model(format!("Invalid modules.json: {}", e)))?;

    Ok(modules
        .into_iter()
        .find(|m| m.module_type.ends_with("Pooling"))
        .map(|m| m.path)
        .filter(|p| !p.is_empty()))
}

/// Pooling declared by the model, `None` when it ships no pooling config
pub fn detect_pooling(model_dir: &Path) -> Result<Option<PoolingStrategy>> {
    let Some(module_path) = pooling_module_path(model_dir)? else {
        return Ok(None);
    };
    let config_path = model_dir.join(&module_path).join("config.json");
    if !config_path.exists() {
        warn!(
            "modules.json references {} but {} is missing",
            module_path,
            config_path.display()
        );
        return Ok(None);
    }

    let content = std::fs::read_to_string(&config_path)?;
    let config: PoolingConfig = serde_json::from_str(&content)
        .map_err(|e| ServeError::model(format!("Invalid pooling config: {}", e)))?;

    let strategy = if config.pooling_mode_cls_token {
        PoolingStrategy::Cls
    } else if config.pooling_mode_mean_tokens {
        PoolingStrategy::Mean
    } else {
        if config.pooling_mode_max_tokens
            || config.pooling_mode_mean_sqrt_len_tokens
            || config.pooling_mode_weightedmean_tokens
            || config.pooling_mode_lasttoken
        {
            warn!("Unsupported pooling mode in {}; using mean pooling", config_path.display());
        }
        PoolingStrategy::Mean
    };
    debug!(?strategy, "Detected pooling from sentence-transformers config");
    Ok(Some(strategy))
}
