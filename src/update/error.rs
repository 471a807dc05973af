use crate::schema::IntrospectionError;
use thiserror::Error;

/// Failure raised inside a single update step
#[derive(Debug, Error)]
pub enum StepError {
    /// The database is in a state this step refuses to upgrade from
    #[error("{0}")]
    UnsupportedUpgradePath(String),

    #[error(transparent)]
    Introspection(#[from] IntrospectionError),

    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl StepError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        StepError::UnsupportedUpgradePath(message.into())
    }
}

/// Fatal outcome of an update run. Every variant that concerns a revision names it.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(
        "A downgrade attempt has been detected: the database is at revision {watermark} but this release only knows revisions up to {target}. Downgrading is not supported."
    )]
    Downgrade { watermark: u32, target: u32 },

    #[error("Database update r{revision} cannot be applied: {message}")]
    UnsupportedUpgradePath { revision: u32, message: String },

    #[error("Database update r{revision} failed")]
    StatementExecution {
        revision: u32,
        /// Statement being executed, when the failure came from one the runner issued
        statement: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Database update r{revision} failed")]
    Introspection {
        revision: u32,
        #[source]
        source: IntrospectionError,
    },

    #[error("Database update r{revision} was applied but its revision could not be recorded")]
    WatermarkPersist {
        revision: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Could not read the database revision")]
    WatermarkRead {
        #[source]
        source: anyhow::Error,
    },
}

impl UpdateError {
    /// Map a step failure to the run-level error for `revision`
    pub fn from_step(revision: u32, error: StepError) -> Self {
        match error {
            StepError::UnsupportedUpgradePath(message) => {
                UpdateError::UnsupportedUpgradePath { revision, message }
            }
            StepError::Introspection(source) => UpdateError::Introspection { revision, source },
            StepError::Execution(source) => UpdateError::StatementExecution {
                revision,
                statement: None,
                source,
            },
        }
    }

    /// Revision the failure belongs to, if any
    pub fn revision(&self) -> Option<u32> {
        match self {
            UpdateError::UnsupportedUpgradePath { revision, .. }
            | UpdateError::StatementExecution { revision, .. }
            | UpdateError::Introspection { revision, .. }
            | UpdateError::WatermarkPersist { revision, .. } => Some(*revision),
            UpdateError::Downgrade { .. } | UpdateError::WatermarkRead { .. } => None,
        }
    }
}
