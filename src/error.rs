use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can go wrong while loading or exporting registrations
#[derive(Debug, Error)]
pub enum ExportError {
    /// The batch is empty, or the store holds nothing under the prefix
    #[error("no registrations found using: {prefix}")]
    RegistrationsNotFound { prefix: String },

    /// No attachment objects matched the prefix
    #[error("no attachments found using: {prefix}")]
    AttachmentsNotFound { prefix: String },

    /// A temporary artifact could not be created, appended or rewritten
    #[error("artifact i/o failed for {}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A document did not have the shape the export expects
    #[error("malformed document: {context}")]
    Malformed {
        context: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ExportError {
    pub fn registrations_not_found(prefix: impl Into<String>) -> Self {
        ExportError::RegistrationsNotFound {
            prefix: prefix.into(),
        }
    }

    pub fn attachments_not_found(prefix: impl Into<String>) -> Self {
        ExportError::AttachmentsNotFound {
            prefix: prefix.into(),
        }
    }

    pub fn malformed(context: impl Into<String>) -> Self {
        ExportError::Malformed {
            context: context.into(),
            source: None,
        }
    }

    pub fn malformed_with<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ExportError::Malformed {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Attach the artifact path to an I/O failure
pub(crate) trait ArtifactContext<T> {
    fn artifact(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ArtifactContext<T> for std::io::Result<T> {
    fn artifact(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| ExportError::Artifact {
            path: path.into(),
            source,
        })
    }
}
