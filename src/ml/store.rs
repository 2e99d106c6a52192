//! Binary model artifact on disk.
//!
//! The file starts with a magic tag and a format version so that a foreign or
//! outdated file is rejected before the model body is decoded.

use crate::error::{AppError, Result};
use crate::ml::service::TrainedModel;
use bincode::Options;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Leading bytes of every model file
pub const MAGIC: [u8; 4] = *b"FXML";

/// Bumped whenever the serialized layout changes
pub const FORMAT_VERSION: u32 = 1;

/// Refuse to decode bodies larger than this
const MAX_MODEL_BYTES: u64 = 512 * 1024 * 1024;

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MODEL_BYTES)
}

/// Reads and writes a [`TrainedModel`] at a fixed path
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the model, replacing any previous file
    ///
    /// The body goes to a sibling `.tmp` file first and is renamed over the
    /// target, so a failed write leaves the previous model intact.
    pub fn save(&self, model: &TrainedModel) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.temp_path();
        let written = Self::write_to(&tmp, model).and_then(|_| {
            std::fs::rename(&tmp, &self.path)?;
            Ok(())
        });
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                debug!(path = %tmp.display(), error = %cleanup, "Temporary model file not removed");
            }
            return Err(e);
        }

        info!(path = %self.path.display(), fingerprint = %model.fingerprint, "Saved model");
        Ok(())
    }

    fn write_to(path: &Path, model: &TrainedModel) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        codec()
            .serialize_into(&mut writer, model)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize model: {}", e)))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the model back and check that its pipeline is usable
    pub fn load(&self) -> Result<TrainedModel> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::ModelNotFound(self.path.clone()),
            _ => AppError::Io(e),
        })?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        let mut version = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .and_then(|_| reader.read_exact(&mut version))
            .map_err(|e| self.corrupt(format!("truncated header: {}", e)))?;

        if magic != MAGIC {
            return Err(self.corrupt("not a model file".to_string()));
        }
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let model: TrainedModel = codec()
            .deserialize_from(&mut reader)
            .map_err(|e| self.corrupt(e.to_string()))?;

        model.pipeline.validate().map_err(|reason| self.corrupt(reason))?;

        debug!(
            path = %self.path.display(),
            fingerprint = %model.fingerprint,
            classes = model.metadata.n_classes,
            "Loaded model"
        );
        Ok(model)
    }

    fn corrupt(&self, reason: String) -> AppError {
        AppError::ModelFileCorrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::TrainingConfig;
    use crate::ml::service::{ModelTrainer, PipelineTrainer};
    use crate::models::TrainingInput;
    use tempfile::TempDir;

    fn trained() -> TrainedModel {
        let inputs: Vec<TrainingInput> = [
            ("Login broken", "Cannot log in", "Alice"),
            ("Export slow", "CSV export takes minutes", "Bob"),
        ]
        .iter()
        .map(|(title, description, fixer)| TrainingInput {
            title: title.to_string(),
            description: description.to_string(),
            fixer: fixer.to_string(),
        })
        .collect();

        PipelineTrainer::new(TrainingConfig::default(), 3)
            .train(&inputs)
            .unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("nested").join("dd.ml"));
        assert!(!store.exists());

        let model = trained();
        store.save(&model).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.fingerprint, model.fingerprint);
        assert_eq!(
            loaded.pipeline.label_dictionary(),
            model.pipeline.label_dictionary()
        );
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("dd.ml"));
        store.save(&trained()).unwrap();
        store.save(&trained()).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["dd.ml".to_string()]);
        assert!(store.load().is_ok());
    }

    #[test]
    fn test_failed_save_keeps_previous_model() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("dd.ml"));
        let first = trained();
        store.save(&first).unwrap();

        // A directory in the way makes the temporary file impossible to create
        std::fs::create_dir(dir.path().join("dd.ml.tmp")).unwrap();
        assert!(store.save(&trained()).is_err());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.fingerprint, first.fingerprint);
        assert_eq!(loaded.metadata.trained_at, first.metadata.trained_at);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("absent.ml"));

        assert!(matches!(store.load(), Err(AppError::ModelNotFound(_))));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dd.ml");
        std::fs::write(&path, b"Title,Description\n").unwrap();

        let err = ModelStore::new(&path).load().unwrap_err();
        assert!(matches!(err, AppError::ModelFileCorrupt { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_truncated_body_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("dd.ml"));
        store.save(&trained()).unwrap();

        let bytes = std::fs::read(store.path()).unwrap();
        std::fs::write(store.path(), &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            store.load(),
            Err(AppError::ModelFileCorrupt { .. })
        ));
    }

    #[test]
    fn test_wrong_version_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("dd.ml"));
        store.save(&trained()).unwrap();

        let mut bytes = std::fs::read(store.path()).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        std::fs::write(store.path(), &bytes).unwrap();

        match store.load() {
            Err(AppError::ModelFileCorrupt { reason, .. }) => {
                assert!(reason.contains("version 99"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
