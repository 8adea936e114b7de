//! Persistence of fitted models
//!
//! Artifacts are a bincode envelope carrying a magic tag, a format version
//! and a SHA-256 checksum of the bincode-encoded [`FittedModel`]. Any failure
//! to read, verify or decode an artifact surfaces as `ModelLoad`.

use super::FittedModel;
use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MAGIC: [u8; 4] = *b"INSM";
const FORMAT_VERSION: u32 = 1;
const EXTENSION: &str = "model";

/// Storage backend for fitted models
pub trait ModelStore: Send + Sync {
    /// Persist a model under `id`, replacing any previous artifact
    fn save(&self, id: &str, model: &FittedModel) -> Result<()>;

    /// Load and verify the model stored under `id`
    fn load(&self, id: &str) -> Result<FittedModel>;

    /// Ids of every stored model, sorted
    fn list(&self) -> Result<Vec<String>>;

    fn exists(&self, id: &str) -> bool;
}

/// Serialized envelope around a model payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    magic: [u8; 4],
    version: u32,
    checksum: String,
    payload: Vec<u8>,
}

impl ModelArtifact {
    pub fn from_model(model: &FittedModel) -> Result<Self> {
        let payload = bincode::serialize(model)?;
        Ok(Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            checksum: checksum(&payload),
            payload,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| InsightError::ModelLoad(format!("unreadable artifact: {}", e)))
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Verify the envelope and decode the model it carries
    pub fn into_model(self) -> Result<FittedModel> {
        if self.magic != MAGIC {
            return Err(InsightError::ModelLoad("not a model artifact".to_string()));
        }
        if self.version != FORMAT_VERSION {
            return Err(InsightError::ModelLoad(format!(
                "unsupported artifact version {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        if checksum(&self.payload) != self.checksum {
            return Err(InsightError::ModelLoad("checksum mismatch".to_string()));
        }

        let decoded: FittedModel = bincode::deserialize(&self.payload)
            .map_err(|e| InsightError::ModelLoad(format!("corrupt model payload: {}", e)))?;

        // Re-run construction checks so a stored model never bypasses them
        FittedModel::new(
            decoded.metadata,
            decoded.schema,
            decoded.labels,
            decoded.estimator,
        )
        .map_err(|e| InsightError::ModelLoad(e.to_string()))
    }
}

fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Directory of `<id>.model` artifacts
#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
}

impl FileModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !id.starts_with('.');
        if !valid {
            return Err(InsightError::InvalidParameter {
                name: "model_id".to_string(),
                value: id.to_string(),
                reason: "use letters, digits, '-', '_' or '.'".to_string(),
            });
        }
        Ok(self.root.join(format!("{}.{}", id, EXTENSION)))
    }
}

impl ModelStore for FileModelStore {
    fn save(&self, id: &str, model: &FittedModel) -> Result<()> {
        let path = self.path_for(id)?;
        fs::create_dir_all(&self.root)?;

        let artifact = ModelArtifact::from_model(model)?;
        let bytes = artifact.to_bytes()?;

        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;

        info!(
            id,
            path = %path.display(),
            bytes = bytes.len(),
            checksum = artifact.checksum(),
            "model saved"
        );
        Ok(())
    }

    fn load(&self, id: &str) -> Result<FittedModel> {
        let path = self
            .path_for(id)
            .map_err(|e| InsightError::ModelLoad(e.to_string()))?;
        let bytes = fs::read(&path).map_err(|e| {
            InsightError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        debug!(id, bytes = bytes.len(), "model artifact read");

        let model = ModelArtifact::from_bytes(&bytes)?.into_model()?;
        info!(id, model = %model.metadata().name, "model loaded");
        Ok(model)
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }
}
