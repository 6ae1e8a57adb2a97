/// Error enum for failures that reach the run boundary.
///
/// Categories:
/// - Precondition: raised before the pipeline starts, aborts the run, never
///   recorded into the state document
/// - Runtime: state persistence that failed outside a single item's boundary
///
/// Per-item stage failures are not represented here; they are recorded into
/// the item's stage state and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    // Precondition
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection {0} has no items")]
    EmptyCollection(String),

    #[error("Invalid configuration:\n{0}")]
    InvalidConfig(String),

    #[error("Preflight failed:\n{0}")]
    Preflight(String),

    #[error("Another run holds the lock: {0}")]
    LockHeld(String),

    // Runtime
    #[error("State error: {0}")]
    State(String),
}

impl DigestError {
    /// Returns true for errors raised before entering the pipeline.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            DigestError::CollectionNotFound(_)
                | DigestError::EmptyCollection(_)
                | DigestError::InvalidConfig(_)
                | DigestError::Preflight(_)
                | DigestError::LockHeld(_)
        )
    }

    /// Returns true if the run must stop. State errors only reach the caller
    /// from the best-effort read after the pipeline, so they are tolerated.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DigestError::State(_))
    }
}

/// Allows `?` to convert `DigestError` to `String` at the CLI boundary, which
/// like the rest of the internals reports errors as plain messages.
impl From<DigestError> for String {
    fn from(err: DigestError) -> String {
        err.to_string()
    }
}
