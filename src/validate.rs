// Pre-upload checks for model and module artifacts.

use std::path::Path;

use tracing::debug;

use crate::archive::extract_archive;
use crate::error::{Error, IoContext, Result};

pub const README_FILE: &str = "README.md";

/// Decides whether a directory holds a loadable model or module. The error
/// string is reported verbatim inside `Error::Validation`.
pub trait ModelLoader {
    fn load(&self, path: &Path) -> std::result::Result<(), String>;
}

/// Accepts directories laid out as a TensorFlow SavedModel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedModelLoader;

impl ModelLoader for SavedModelLoader {
    fn load(&self, path: &Path) -> std::result::Result<(), String> {
        let found = ["saved_model.pb", "saved_model.pbtxt"]
            .iter()
            .any(|file| path.join(file).is_file());
        if found {
            Ok(())
        } else {
            Err(format!(
                "SavedModel file does not exist at: {}/{{saved_model.pbtxt|saved_model.pb}}",
                path.display()
            ))
        }
    }
}

pub fn validate_artifact(loader: &dyn ModelLoader, path: &Path) -> Result<()> {
    debug!(path = %path.display(), "model validation");
    loader.load(path).map_err(Error::Validation)?;
    if !path.join(README_FILE).exists() {
        return Err(Error::MissingReadme);
    }
    debug!("model validation PASS");
    Ok(())
}

/// Unpack the archive into a scratch directory and validate its content.
/// The scratch directory is removed whatever the result.
pub fn validate_archived_artifact(loader: &dyn ModelLoader, path: &Path) -> Result<()> {
    debug!(path = %path.display(), "validating model archive");
    let scratch = tempfile::Builder::new()
        .prefix("tmp_dir_")
        .tempdir()
        .io_context(|| "create temporary extraction directory")?;
    debug!(tmp = %scratch.path().display(), "temporary directory for model");

    extract_archive(path, scratch.path())?;
    validate_artifact(loader, scratch.path())?;

    debug!("validation of model in archive PASS");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Reject;

    impl ModelLoader for Reject {
        fn load(&self, _path: &Path) -> std::result::Result<(), String> {
            Err("graph is corrupted".into())
        }
    }

    #[test]
    fn saved_model_with_readme_passes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("saved_model.pb"), b"graph").unwrap();
        fs::write(dir.path().join(README_FILE), b"docs").unwrap();
        validate_artifact(&SavedModelLoader, dir.path()).unwrap();
    }

    #[test]
    fn missing_readme_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("saved_model.pbtxt"), b"graph").unwrap();
        let err = validate_artifact(&SavedModelLoader, dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Directory without README.md file!");
    }

    #[test]
    fn loader_message_is_carried() {
        let err = validate_artifact(&SavedModelLoader, Path::new("/path/to/file")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TensorFlow model validation failed! Error: SavedModel file does not exist at: \
             /path/to/file/{saved_model.pbtxt|saved_model.pb}"
        );

        let dir = tempfile::tempdir().unwrap();
        let err = validate_artifact(&Reject, dir.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TensorFlow model validation failed! Error: graph is corrupted"
        );
    }
}
