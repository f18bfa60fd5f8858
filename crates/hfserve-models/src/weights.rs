//! SafeTensors weight loading and candle device/dtype selection

use candle_core::{DType, Device as CandleDevice};
use candle_nn::VarBuilder;
use hfserve_types::{Device, Result, ServeError, WeightDType};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SafeTensors weight loader
pub struct SafeTensorsLoader {
    model_dir: PathBuf,
}

impl SafeTensorsLoader {
    pub fn new(model_dir: impl AsRef<Path>) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
        }
    }

    /// Weight files in load order: the sharded index wins, then
    /// `model.safetensors`, then any `*.safetensors` in the directory.
    pub fn weight_files(&self) -> Result<Vec<PathBuf>> {
        let index_file = self.model_dir.join("model.safetensors.index.json");
        if index_file.exists() {
            let shards: Vec<PathBuf> = shard_files(&index_file)?
                .iter()
                .map(|f| self.model_dir.join(f))
                .collect();
            if let Some(missing) = shards.iter().find(|p| !p.exists()) {
                return Err(ServeError::model(format!(
                    "Missing shard file: {}",
                    missing.display()
                )));
            }
            return Ok(shards);
        }

        let single_file = self.model_dir.join("model.safetensors");
        if single_file.exists() {
            return Ok(vec![single_file]);
        }

        let mut any: Vec<PathBuf> = std::fs::read_dir(&self.model_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "safetensors"))
            .collect();
        any.sort();
        if !any.is_empty() {
            return Ok(any);
        }

        if self.model_dir.join("pytorch_model.bin").exists() {
            return Err(ServeError::model(
                "PyTorch .bin format is not supported. Please use SafeTensors format.",
            ));
        }
        Err(ServeError::model(format!(
            "No SafeTensors files found in model directory: {}",
            self.model_dir.display()
        )))
    }

    /// Memory-map the weights into a VarBuilder
    pub fn load_varbuilder(&self, device: &CandleDevice, dtype: DType) -> Result<VarBuilder<'static>> {
        let files = self.weight_files()?;
        info!(
            "Loading {} weight file(s) from {:?} as {:?}",
            files.len(),
            self.model_dir,
            dtype
        );
        // Safety: the files are not modified while mapped
        unsafe {
            VarBuilder::from_mmaped_safetensors(&files, dtype, device)
                .map_err(|e| ServeError::model(format!("Failed to load SafeTensors: {}", e)))
        }
    }
}

/// Unique shard file names referenced by `model.safetensors.index.json`
pub fn shard_files(index_file: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(index_file)
        .map_err(|e| ServeError::model(format!("Failed to read index file: {}", e)))?;
    let index: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| ServeError::model(format!("Failed to parse index JSON: {}", e)))?;

    let weight_map = index
        .get("weight_map")
        .and_then(|w| w.as_object())
        .ok_or_else(|| ServeError::model("Invalid index: missing 'weight_map'"))?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect();
    if shards.is_empty() {
        return Err(ServeError::model("No shards found in index file"));
    }
    debug!("Shards to load: {:?}", shards);
    Ok(shards.into_iter().collect())
}

/// Map the configured device onto a candle device
pub fn candle_device(device: &Device) -> Result<CandleDevice> {
    match device {
        Device::CPU => Ok(CandleDevice::Cpu),
        Device::CUDA(ordinal) => CandleDevice::new_cuda(*ordinal)
            .map_err(|e| ServeError::config(format!("CUDA device {} unavailable: {}", ordinal, e))),
        Device::Metal => CandleDevice::new_metal(0)
            .map_err(|e| ServeError::config(format!("Metal device unavailable: {}", e))),
    }
}

/// Pick the weight dtype. `Auto` keeps f32 on CPU and otherwise follows
/// the checkpoint's `torch_dtype`.
pub fn candle_dtype(dtype: WeightDType, torch_dtype: Option<&str>, device: &CandleDevice) -> DType {
    match dtype {
        WeightDType::F32 => DType::F32,
        WeightDType::F16 => DType::F16,
        WeightDType::BF16 => DType::BF16,
        WeightDType::Auto if device.is_cpu() => DType::F32,
        WeightDType::Auto => match torch_dtype {
            Some("float16") => DType::F16,
            Some("bfloat16") => DType::BF16,
            _ => DType::F32,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharded_index_lists_unique_sorted_shards() {
        let temp = tempfile::TempDir::new().unwrap();
        let index = temp.path().join("model.safetensors.index.json");
        std::fs::write(
            &index,
            r#"{"weight_map": {
                "a": "model-00002-of-00002.safetensors",
                "b": "model-00001-of-00002.safetensors",
                "c": "model-00001-of-00002.safetensors"
            }}"#,
        )
        .unwrap();
        assert_eq!(
            shard_files(&index).unwrap(),
            vec![
                "model-00001-of-00002.safetensors",
                "model-00002-of-00002.safetensors"
            ]
        );

        let err = SafeTensorsLoader::new(temp.path()).weight_files().unwrap_err();
        assert!(err.to_string().contains("Missing shard file"));
    }

    #[test]
    fn falls_back_to_any_safetensors_file() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("weights.safetensors"), b"").unwrap();
        let files = SafeTensorsLoader::new(temp.path()).weight_files().unwrap();
        assert_eq!(files, vec![temp.path().join("weights.safetensors")]);
    }

    #[test]
    fn pytorch_checkpoints_are_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("pytorch_model.bin"), b"").unwrap();
        let err = SafeTensorsLoader::new(temp.path()).weight_files().unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn auto_dtype_is_f32_on_cpu() {
        let cpu = CandleDevice::Cpu;
        assert_eq!(candle_dtype(WeightDType::Auto, Some("bfloat16"), &cpu), DType::F32);
        assert_eq!(candle_dtype(WeightDType::F16, None, &cpu), DType::F16);
    }
}
