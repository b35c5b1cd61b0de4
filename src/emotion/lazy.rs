//! Load-once model holder
//!
//! The model file is read on first use and then shared. A failed load is
//! not remembered, so a model dropped into place later is picked up by the
//! next request.

use super::DetectionError;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

pub struct LazyModel<T> {
    path: PathBuf,
    cell: OnceCell<T>,
    loader: fn(&Path) -> Result<T, DetectionError>,
}

impl<T> LazyModel<T> {
    pub fn new(path: impl Into<PathBuf>, loader: fn(&Path) -> Result<T, DetectionError>) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
            loader,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The loaded model, loading it first if needed.
    ///
    /// Concurrent first callers block until one load finishes.
    pub fn get(&self) -> Result<&T, DetectionError> {
        self.cell.get_or_try_init(|| {
            if !self.path.exists() {
                return Err(DetectionError::ModelUnavailable(format!(
                    "model file not found: {}",
                    self.path.display()
                )));
            }
            match (self.loader)(&self.path) {
                Ok(model) => {
                    tracing::info!(path = %self.path.display(), "model loaded");
                    Ok(model)
                }
                Err(e) => {
                    tracing::error!(path = %self.path.display(), error = %e, "failed to load model");
                    Err(DetectionError::ModelUnavailable(e.to_string()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn read_len(path: &Path) -> Result<usize, DetectionError> {
        let bytes = std::fs::read(path).map_err(|e| DetectionError::Inference(e.to_string()))?;
        if bytes.is_empty() {
            return Err(DetectionError::Inference("empty model".to_string()));
        }
        Ok(bytes.len())
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let model = LazyModel::new("/nonexistent/model.onnx", read_len);
        assert!(matches!(model.get(), Err(DetectionError::ModelUnavailable(_))));
        assert!(!model.is_loaded());
    }

    #[test]
    fn test_failed_load_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::File::create(&path).unwrap();

        let model = LazyModel::new(&path, read_len);
        assert!(matches!(model.get(), Err(DetectionError::ModelUnavailable(_))));

        std::fs::File::create(&path).unwrap().write_all(b"weights").unwrap();
        assert_eq!(*model.get().unwrap(), 7);
        assert!(model.is_loaded());

        // Later changes are not re-read
        std::fs::remove_file(&path).unwrap();
        assert_eq!(*model.get().unwrap(), 7);
    }
}
