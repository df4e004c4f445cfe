use crate::model::TaskSummary;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("invalid_input - {0}")]
    InvalidInput(String),
    #[error("invalid_format - {0}")]
    InvalidFormat(String),
    #[error("invalid_range - {0}")]
    InvalidRange(String),
    #[error("overlap_conflict - {}", conflict_message(.0))]
    OverlapConflict(Vec<TaskSummary>),
    #[error("not_found - {0}")]
    NotFound(String),
    #[error("already_completed - {0}")]
    AlreadyCompleted(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("storage_unavailable - {0}")]
    StorageUnavailable(String),
}

fn conflict_message(conflicts: &[TaskSummary]) -> String {
    let listed = conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("overlaps with {listed}")
}

impl AppError {
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_format<M: Into<String>>(message: M) -> Self {
        Self::InvalidFormat(message.into())
    }

    pub fn invalid_range<M: Into<String>>(message: M) -> Self {
        Self::InvalidRange(message.into())
    }

    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound(message.into())
    }

    pub fn already_completed<M: Into<String>>(message: M) -> Self {
        Self::AlreadyCompleted(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn storage<M: Into<String>>(message: M) -> Self {
        Self::StorageUnavailable(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidFormat(_) => "invalid_format",
            Self::InvalidRange(_) => "invalid_range",
            Self::OverlapConflict(_) => "overlap_conflict",
            Self::NotFound(_) => "not_found",
            Self::AlreadyCompleted(_) => "already_completed",
            Self::InvalidData(_) => "invalid_data",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::OverlapConflict(conflicts) => conflict_message(conflicts),
            Self::InvalidInput(message)
            | Self::InvalidFormat(message)
            | Self::InvalidRange(message)
            | Self::NotFound(message)
            | Self::AlreadyCompleted(message)
            | Self::InvalidData(message)
            | Self::StorageUnavailable(message) => message.clone(),
        }
    }

    /// Tasks an overlap was detected against; empty for every other error.
    pub fn conflicts(&self) -> &[TaskSummary] {
        match self {
            Self::OverlapConflict(conflicts) => conflicts,
            _ => &[],
        }
    }

    /// Caller mistakes, as opposed to faults of the store itself.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::InvalidData(_) | Self::StorageUnavailable(_))
    }
}
