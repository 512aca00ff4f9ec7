use std::fmt;

/// Failures a fetch can classify. Everything else travels as a plain
/// `anyhow::Error` and is treated as transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The source reported that the requested page holds no records.
    NoData,
    /// The request or the response cannot be interpreted; retrying will not help.
    Malformed { reason: String },
    /// The surrounding run was cancelled.
    Cancelled,
}

impl FetchError {
    pub fn is_no_data(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<FetchError>(), Some(FetchError::NoData))
    }

    pub fn is_malformed(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::Malformed { .. })
        )
    }

    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<FetchError>(),
                Some(FetchError::Cancelled)
            )
        })
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        FetchError::Malformed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NoData => write!(f, "no data for the requested range"),
            FetchError::Malformed { reason } => write!(f, "malformed fetch: {reason}"),
            FetchError::Cancelled => write!(f, "fetch cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}
