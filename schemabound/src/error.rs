use thiserror::Error;

/// The schema only admits instances of unbounded depth.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InfiniteRecursionError {
    message: String,
    reference: Option<String>,
}

impl InfiniteRecursionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        self.message = format!("{} (reference: {reference})", self.message);
        self.reference = Some(reference);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The reference that could not be bounded, when known.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unresolvable reference: {reference}")]
    Unresolvable { reference: String },
    #[error("Unable to retrieve {uri}: {reason}")]
    Unretrievable { uri: String, reason: String },
}

impl ResolveError {
    pub fn unresolvable(reference: impl Into<String>) -> Self {
        ResolveError::Unresolvable {
            reference: reference.into(),
        }
    }

    pub fn unretrievable(uri: impl Into<String>, reason: impl ToString) -> Self {
        ResolveError::Unretrievable {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    InfiniteRecursion(#[from] InfiniteRecursionError),
}
