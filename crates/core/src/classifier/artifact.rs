use crate::classifier::{EmotionModel, ModelError, MODEL_FORMAT_VERSION};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

impl EmotionModel {
    /// Reads a model artifact. Missing, unreadable, corrupt or
    /// version-mismatched artifacts are all errors.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::Missing {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: EmotionModel =
            serde_json::from_str(&raw).map_err(|e| ModelError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if model.version != MODEL_FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: model.version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        model
            .check_consistency()
            .map_err(|reason| ModelError::Corrupt {
                path: path.to_path_buf(),
                reason,
            })?;

        tracing::info!(
            path = %path.display(),
            labels = model.labels.len(),
            dimension = model.dimension(),
            "voice emotion model loaded"
        );
        Ok(model)
    }

    /// Writes the artifact to a temp file beside `path`, syncs it and renames
    /// it into place, so readers see either the old file or the complete new one.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let write_err = |reason: String| ModelError::Write {
            path: path.to_path_buf(),
            reason,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| write_err(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| write_err(e.to_string()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, self).map_err(|e| write_err(e.to_string()))?;
            writer.flush().map_err(|e| write_err(e.to_string()))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| write_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;

        tracing::info!(path = %path.display(), "voice emotion model saved");
        Ok(())
    }
}
