use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::ModelError;
use crate::types::FEATURE_NAMES;

/// A trained regression function. Implementations are immutable after load,
/// so one handle can serve any number of concurrent requests.
pub trait Regressor: Send + Sync {
    /// One output per input row.
    fn predict(&self, batch: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Expected row width, if the artifact records it.
    fn input_dim(&self) -> Option<usize> {
        None
    }
}

// ---------- Linear backend ----------

#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

impl LinearModel {
    pub fn from_path(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read model at {}", path.display()))?;
        Self::from_json(&txt).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_json(txt: &str) -> Result<Self> {
        let model: LinearModel = serde_json::from_str(txt)?;
        if model.coefficients.is_empty() {
            bail!("model has no coefficients");
        }
        if !model.feature_names.is_empty() && model.feature_names.len() != model.coefficients.len()
        {
            bail!(
                "feature_names has {} entries but there are {} coefficients",
                model.feature_names.len(),
                model.coefficients.len()
            );
        }
        // Coefficients are applied positionally, so recorded names must match
        // the order the service assembles.
        if !model.feature_names.is_empty() && model.feature_names != FEATURE_NAMES {
            bail!(
                "model was trained on features [{}] but the service sends [{}]",
                model.feature_names.join(", "),
                FEATURE_NAMES.join(", ")
            );
        }
        Ok(model)
    }
}

impl Regressor for LinearModel {
    fn predict(&self, batch: &[Vec<f64>]) -> Result<Vec<f64>> {
        batch
            .iter()
            .map(|row| {
                if row.len() != self.coefficients.len() {
                    bail!(
                        "feature length mismatch: got {}, expected {}",
                        row.len(),
                        self.coefficients.len()
                    );
                }
                Ok(self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(x, w)| x * w)
                        .sum::<f64>())
            })
            .collect()
    }

    fn input_dim(&self) -> Option<usize> {
        Some(self.coefficients.len())
    }
}

// ---------- TorchScript backend ----------

#[cfg(feature = "torch")]
pub use torch::TorchScriptModel;

#[cfg(feature = "torch")]
mod torch {
    use super::Regressor;
    use anyhow::{Context, Result};
    use parking_lot::Mutex;
    use std::path::Path;
    use tch::{kind::Kind, CModule, Device, Tensor};

    pub struct TorchScriptModel {
        model: Mutex<CModule>,
        device: Device,
    }

    impl TorchScriptModel {
        pub fn load(path: &Path) -> Result<Self> {
            let device = Device::Cpu;
            let model = CModule::load_on_device(path, device)
                .with_context(|| format!("failed to load TorchScript {}", path.display()))?;
            Ok(Self {
                model: Mutex::new(model),
                device,
            })
        }
    }

    impl Regressor for TorchScriptModel {
        fn predict(&self, batch: &[Vec<f64>]) -> Result<Vec<f64>> {
            let rows = batch.len() as i64;
            let cols = batch.first().map_or(0, Vec::len) as i64;
            let flat: Vec<f32> = batch.iter().flatten().map(|&x| x as f32).collect();

            let input = Tensor::from_slice(&flat)
                .reshape([rows, cols])
                .to_device(self.device);

            // Forward: [B] or [B, 1]
            let out = self.model.lock().forward_ts(&[input])?;
            let out = out.to_kind(Kind::Double).reshape([-1]);
            Ok(Vec::<f64>::try_from(&out)?)
        }
    }
}

// ---------- Loading ----------

/// Load a model, picking the backend from the file extension.
pub fn load_model(path: &Path) -> Result<Arc<dyn Regressor>, ModelError> {
    if !path.exists() {
        return Err(ModelError::Unavailable(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => Ok(Arc::new(LinearModel::from_path(path)?)),
        #[cfg(feature = "torch")]
        Some("pt") | Some("ts") => Ok(Arc::new(TorchScriptModel::load(path)?)),
        _ => Err(ModelError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Where a [`ModelStore`] gets its model from.
pub trait ModelSource: Send + Sync {
    fn load(&self) -> Result<Arc<dyn Regressor>, ModelError>;
    fn describe(&self) -> String;
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelSource for FileSource {
    fn load(&self) -> Result<Arc<dyn Regressor>, ModelError> {
        load_model(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Lazily loaded, process-wide model handle.
///
/// The first successful load is cached. While the artifact is missing every
/// lookup retries the load, so a model dropped in later is picked up without
/// a restart. `reload` swaps the cached handle under the write lock;
/// predictions already holding an `Arc` finish on the old model.
pub struct ModelStore {
    source: Box<dyn ModelSource>,
    slot: RwLock<Option<Arc<dyn Regressor>>>,
}

impl ModelStore {
    pub fn new(source: impl ModelSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            slot: RwLock::new(None),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSource::new(path))
    }

    pub fn get(&self) -> Result<Arc<dyn Regressor>, ModelError> {
        if let Some(model) = self.slot.read().as_ref() {
            return Ok(Arc::clone(model));
        }
        let mut slot = self.slot.write();
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = self.source.load()?;
        tracing::info!(
            "loaded model from {}; input_dim={:?}",
            self.source.describe(),
            model.input_dim()
        );
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn reload(&self) -> Result<(), ModelError> {
        let model = self.source.load()?;
        *self.slot.write() = Some(model);
        tracing::info!("reloaded model from {}", self.source.describe());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }
}
