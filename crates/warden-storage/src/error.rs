use warden_core::event::UnknownStatus;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// A requested resource code does not exist. Invalid input, not a
    /// denial.
    #[error("unknown resource code: {0}")]
    UnknownResourceCode(String),

    /// A requested action code does not exist under its resource.
    #[error("unknown action code: {action} for resource: {resource}")]
    UnknownActionCode { resource: String, action: String },

    /// An audit row was inserted twice under the same event id.
    #[error("duplicate event id in ledger: {0}")]
    DuplicateEvent(String),

    /// No ledger row exists for the event id.
    #[error("no consumed event with id: {0}")]
    EventNotFound(String),

    #[error("internal storage error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Internal(e.to_string())
    }
}

impl From<UnknownStatus> for StorageError {
    fn from(e: UnknownStatus) -> Self {
        StorageError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_code_errors_name_the_code() {
        let err = StorageError::UnknownActionCode {
            resource: "doc".into(),
            action: "fly".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fly") && msg.contains("doc"), "{msg}");
    }
}
