// Error module: the crate reports problems on two tiers.
//
// - `Error` is raised when the caller misused the API or the environment
//   is broken (bad identity, missing version, unreachable host, I/O).
//   These are meant to abort the calling script.
// - `Failure` is returned inside an `Outcome` when the operation itself
//   did not succeed (non-200 response, wrong file extension, bad
//   destination). These are meant to be shown to the user.

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Operation-level result: a success value or a displayable `Failure`.
pub type Outcome<T = String> = std::result::Result<T, Failure>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parameter {field} has invalid format: {value}!")]
    InvalidParameter { field: &'static str, value: String },

    #[error("{0}")]
    MissingParameter(&'static str),

    #[error("TensorFlow Deploy on http://{host}:{port} address is NOT available")]
    Unreachable { host: String, port: u16 },

    #[error("TensorFlow model validation failed! Error: {0}")]
    Validation(String),

    #[error("Directory without README.md file!")]
    MissingReadme,

    #[error("archive entry {} escapes the extraction directory", .0.display())]
    UnsafeArchiveEntry(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("unexpected response payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("malformed listing: {0}")]
    MalformedListing(String),

    #[error("confirmation prompt failed: {0}")]
    Prompt(#[source] io::Error),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

/// Extension used to attach a context message to `io::Result`s.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::io(context(), source))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The service answered a plain REST call with a non-200 status.
    Rejected { operation: &'static str },
    UploadRejected,
    DownloadRejected,
    NotADirectory,
    UnexpectedExtension,
    /// The upload step of a deploy failed, so no reload was attempted.
    DeployAborted { upload: Box<Failure> },
    /// Every attempt of a retried call failed; one message per attempt.
    AttemptsExhausted { errors: Vec<String> },
}

/// A structured operation failure, optionally carrying the body the
/// service answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub response: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind) -> Self {
        Failure {
            kind,
            response: None,
        }
    }

    pub fn with_response(kind: FailureKind, response: impl Into<String>) -> Self {
        Failure {
            kind,
            response: Some(response.into()),
        }
    }

    pub(crate) fn rejected(operation: &'static str, response: impl Into<String>) -> Self {
        Failure::with_response(FailureKind::Rejected { operation }, response)
    }

    fn body(&self) -> &str {
        self.response.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Rejected { operation } => write!(f, "{} error: {}", operation, self.body()),
            FailureKind::UploadRejected => {
                write!(f, "Upload failed!\nServer response: {}", self.body())
            }
            FailureKind::DownloadRejected => write!(f, "Connection error: {}", self.body()),
            FailureKind::NotADirectory => f.write_str("ERROR: dst_path is not dir"),
            FailureKind::UnexpectedExtension => {
                f.write_str("Unexpected file extension. src_path must be a tar archive")
            }
            FailureKind::DeployAborted { upload } => {
                write!(f, "Deploy failed. Upload error: {}", upload)
            }
            FailureKind::AttemptsExhausted { errors } => {
                write!(f, "set_stable error! Errors from all attempts: {:?}", errors)
            }
        }
    }
}

impl std::error::Error for Failure {}

/// Render an outcome the way the CLI prints it: the success value, or the
/// failure message.
pub fn render<T: fmt::Display>(outcome: &Outcome<T>) -> String {
    match outcome {
        Ok(value) => value.to_string(),
        Err(failure) => failure.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_failure_embeds_server_body() {
        let failure = Failure::rejected("delete_label", "error msg");
        assert_eq!(failure.to_string(), "delete_label error: error msg");
    }

    #[test]
    fn upload_failure_is_multiline() {
        let failure = Failure::with_response(FailureKind::UploadRejected, "bad hash");
        assert_eq!(failure.to_string(), "Upload failed!\nServer response: bad hash");
    }

    #[test]
    fn deploy_failure_wraps_upload_failure() {
        let upload = Failure::new(FailureKind::UnexpectedExtension);
        let deploy = Failure::new(FailureKind::DeployAborted {
            upload: Box::new(upload),
        });
        assert_eq!(
            deploy.to_string(),
            "Deploy failed. Upload error: Unexpected file extension. src_path must be a tar archive"
        );
    }

    #[test]
    fn exhausted_attempts_are_listed_in_order() {
        let failure = Failure::new(FailureKind::AttemptsExhausted {
            errors: vec!["#0 error: a".into(), "#1 error: b".into()],
        });
        assert_eq!(
            failure.to_string(),
            r##"set_stable error! Errors from all attempts: ["#0 error: a", "#1 error: b"]"##
        );
    }

    #[test]
    fn invalid_parameter_names_field_and_value() {
        let err = Error::InvalidParameter {
            field: "TEAM",
            value: "t@est".into(),
        };
        assert_eq!(err.to_string(), "Parameter TEAM has invalid format: t@est!");
    }
}
