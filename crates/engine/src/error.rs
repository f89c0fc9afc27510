use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy surfaced to callers. Every engine operation maps each
/// failure onto exactly one of these kinds.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input, rejected before any state is touched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not legal from the entity's current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A uniqueness or already-exists rule was hit.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A numeric cap (participants, teams, team size) is already reached.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The caller's role or identity does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The operation would orphan other records that must be detached first.
    #[error("dependency conflict: {0}")]
    DependencyConflict(String),

    /// The unit of work rolled back for a reason outside the taxonomy above.
    /// Nothing was applied; the store is unchanged.
    #[error("operation {op} aborted: {reason}")]
    TransactionAborted { op: &'static str, reason: String },
}

impl EngineError {
    pub(crate) fn not_found(entity: &str, id: Uuid) -> Self {
        EngineError::NotFound(format!("{entity} {id} does not exist"))
    }

    /// Lost a compare-and-set inside a transaction. With the serialized pool
    /// this signals an external writer rather than an engine race.
    pub(crate) fn concurrent_change(op: &'static str) -> Self {
        EngineError::TransactionAborted {
            op,
            reason: "row changed underneath the transaction".to_string(),
        }
    }

    pub(crate) fn from_op(op: &'static str, err: OpError) -> Self {
        match err {
            OpError::Domain(e) => e,
            OpError::Storage(e) => Self::from_storage(op, e),
        }
    }

    /// Single translation point from storage failures to the public
    /// taxonomy. Services below this line return raw `sqlx::Error`.
    fn from_storage(op: &'static str, err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match &err {
            sqlx::Error::RowNotFound => {
                EngineError::NotFound("record vanished mid-operation".to_string())
            }
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation => {
                    EngineError::Conflict(format!("uniqueness rule violated: {}", db.message()))
                }
                ErrorKind::ForeignKeyViolation => EngineError::DependencyConflict(format!(
                    "dependent records still reference this row: {}",
                    db.message()
                )),
                ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                    EngineError::Validation(format!("stored value rejected: {}", db.message()))
                }
                _ => EngineError::TransactionAborted {
                    op,
                    reason: db.message().to_string(),
                },
            },
            other => EngineError::TransactionAborted {
                op,
                reason: other.to_string(),
            },
        }
    }
}

/// Internal result of a service call: a domain failure that is already part
/// of the public taxonomy, or an untranslated storage error. Only the
/// controller converts the latter.
#[derive(Debug, Error)]
pub(crate) enum OpError {
    #[error(transparent)]
    Domain(#[from] EngineError),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Storage failures worth retrying with a fresh transaction: pool or I/O
/// hiccups and the SQLITE_BUSY family (5, 261, 517) plus SQLITE_LOCKED (6).
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("5") | Some("6") | Some("261") | Some("517")
        ),
        _ => false,
    }
}
