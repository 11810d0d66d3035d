//! Versioned on-disk bundle tying the ensemble to the zone encoding, residual
//! split and fare schedule it was trained with.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::PredictionError;
use super::ensemble::{Ensemble, EnsembleError};
use super::features::{
    FeatureVector, SplitFeatures, ZoneEncoding, FEATURE_COUNT, FEATURE_NAMES, SPLIT_FEATURE_NAMES,
};
use super::model::FareModel;
use super::recompose::ResidualSplit;
use super::rules::FareSchedule;
use super::split::SplitModel;

pub const BUNDLE_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub split_feature_names: Vec<String>,
    pub training_rows: usize,
    /// BLAKE3 hex digest of the serialized payload.
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlePayload {
    pub schedule: FareSchedule,
    pub zone_encoding: ZoneEncoding,
    pub ensemble: Ensemble,
    pub split_model: SplitModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    manifest: BundleManifest,
    payload: BundlePayload,
}

impl ModelBundle {
    pub fn new(
        payload: BundlePayload,
        trained_at: DateTime<Utc>,
        training_rows: usize,
    ) -> Result<Self, ArtifactError> {
        let checksum = payload_checksum(&payload)?;
        let model_version = format!(
            "fare-{}-{}",
            trained_at.format("%Y%m%d%H%M%S"),
            &checksum[..8]
        );

        let bundle = Self {
            manifest: BundleManifest {
                format_version: BUNDLE_FORMAT_VERSION,
                model_version,
                trained_at,
                feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
                split_feature_names: SPLIT_FEATURE_NAMES
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
                training_rows,
                checksum,
            },
            payload,
        };
        bundle.verify()?;
        Ok(bundle)
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn payload(&self) -> &BundlePayload {
        &self.payload
    }

    pub fn schedule(&self) -> &FareSchedule {
        &self.payload.schedule
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.payload.ensemble
    }

    pub fn split_model(&self) -> &SplitModel {
        &self.payload.split_model
    }

    /// Write through a temporary file so readers never see a partial bundle.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ArtifactError::io(parent, source))?;
        }

        let bytes = serde_json::to_vec_pretty(self)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, bytes).map_err(|source| ArtifactError::io(&staging, source))?;
        fs::rename(&staging, path).map_err(|source| ArtifactError::io(path, source))?;

        info!(
            path = %path.display(),
            model_version = %self.manifest.model_version,
            "saved fare model bundle"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = fs::read_to_string(path).map_err(|source| ArtifactError::io(path, source))?;
        let bundle = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            model_version = %bundle.manifest.model_version,
            members = bundle.payload.ensemble.members().len(),
            "loaded fare model bundle"
        );
        Ok(bundle)
    }

    pub fn from_json(raw: &str) -> Result<Self, ArtifactError> {
        let bundle: Self = serde_json::from_str(raw)?;
        bundle.verify()?;
        Ok(bundle)
    }

    pub fn verify(&self) -> Result<(), ArtifactError> {
        let manifest = &self.manifest;
        if manifest.format_version != BUNDLE_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: manifest.format_version,
                supported: BUNDLE_FORMAT_VERSION,
            });
        }
        if manifest.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ArtifactError::FeatureSchema {
                found: manifest.feature_names.clone(),
            });
        }
        if manifest
            .split_feature_names
            .iter()
            .map(String::as_str)
            .ne(SPLIT_FEATURE_NAMES)
        {
            return Err(ArtifactError::FeatureSchema {
                found: manifest.split_feature_names.clone(),
            });
        }

        let actual = payload_checksum(&self.payload)?;
        if actual != manifest.checksum {
            return Err(ArtifactError::ChecksumMismatch {
                expected: manifest.checksum.clone(),
                actual,
            });
        }

        self.payload
            .zone_encoding
            .validate()
            .map_err(ArtifactError::InvalidEncoding)?;

        let ensemble = &self.payload.ensemble;
        if ensemble.feature_count() != FEATURE_COUNT {
            return Err(ArtifactError::FeatureSchema {
                found: manifest.feature_names.clone(),
            });
        }
        ensemble.validate()?;
        self.payload.split_model.validate()?;
        Ok(())
    }

    /// A bundle is only meaningful against the schedule its residuals were
    /// computed with.
    pub fn ensure_schedule(&self, schedule: &FareSchedule) -> Result<(), ArtifactError> {
        if &self.payload.schedule == schedule {
            Ok(())
        } else {
            Err(ArtifactError::ScheduleMismatch)
        }
    }
}

impl FareModel for ModelBundle {
    fn version(&self) -> &str {
        &self.manifest.model_version
    }

    fn zone_encoding(&self) -> &ZoneEncoding {
        &self.payload.zone_encoding
    }

    fn predict_residual(&self, features: &FeatureVector) -> Result<f64, PredictionError> {
        self.payload.ensemble.predict(features.as_slice())
    }

    fn residual_split(&self, features: &SplitFeatures) -> Result<ResidualSplit, PredictionError> {
        self.payload.split_model.predict(features)
    }
}

fn payload_checksum(payload: &BundlePayload) -> Result<String, ArtifactError> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bundle is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bundle format version {found} is not supported (expected {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("bundle feature schema {found:?} does not match this build")]
    FeatureSchema { found: Vec<String> },
    #[error("bundle checksum mismatch (manifest {expected}, payload {actual})")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("bundle was trained against a different fare schedule")]
    ScheduleMismatch,
    #[error("bundle encoding is invalid: {0}")]
    InvalidEncoding(String),
    #[error("bundle ensemble is invalid: {0}")]
    InvalidEnsemble(#[from] EnsembleError),
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
