use std::fmt;
use thiserror::Error;

/// A malformed task graph, detected before any task body runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphDefinitionError {
    #[error("Task graph contains no tasks")]
    Empty,

    #[error("Task already declared: {task}")]
    DuplicateTask { task: String },

    #[error("Dependency '{dependency}' for task '{task}' not found")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task graph is not acyclic: cycle through '{task}'")]
    Cycle { task: String },
}

/// Executor-level failures that are not produced by a task body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("Invalid graph: {0}")]
    Definition(#[from] GraphDefinitionError),

    #[error("Task '{task}' read '{dependency}', which it does not depend on")]
    UndeclaredDependency { task: String, dependency: String },

    #[error("Task '{task}' requires a value from '{dependency}', which produced nothing")]
    AbsentDependency { task: String, dependency: String },

    #[error("Output of task '{task}' could not be converted: {message}")]
    Serialization { task: String, message: String },

    #[error("Task '{task}' could not decode the output of '{dependency}': {message}")]
    DependencyDecode {
        task: String,
        dependency: String,
        message: String,
    },
}

impl DagError {
    pub fn is_graph_definition(&self) -> bool {
        matches!(self, Self::Definition(_))
    }
}

/// Malformed top-level input to the paid service flow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    MissingPrompt,
    MissingLnd,
    MissingLogger,
    MissingNetwork,
    InvalidNodeIdentity,
}

impl ValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingPrompt => "ExpectedAskFunctionToUsePaidService",
            Self::MissingLnd => "ExpectedLndToUsePaidService",
            Self::MissingLogger => "ExpectedLoggerToUsePaidService",
            Self::MissingNetwork => "ExpectedNetworkNameToUsePaidService",
            Self::InvalidNodeIdentity => "ExpectedNodePublicKeyToUsePaidService",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Failures reported by the external collaborators (catalog and payments).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("CatalogUnavailable: {0}")]
    CatalogUnavailable(String),

    #[error("ServiceNotFound: {0}")]
    ServiceNotFound(String),

    #[error("ServiceRequestFailed: {0}")]
    ServiceRequestFailed(String),

    #[error("MalformedPaymentRequest: {0}")]
    MalformedPaymentRequest(String),

    #[error("PaymentFailed: {0}")]
    PaymentFailed(String),
}

impl CapabilityError {
    pub fn code(&self) -> u16 {
        match self {
            Self::ServiceNotFound(_) => 404,
            Self::MalformedPaymentRequest(_) => 400,
            Self::CatalogUnavailable(_) | Self::ServiceRequestFailed(_) | Self::PaymentFailed(_) => {
                503
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::CatalogUnavailable(_) => "CatalogUnavailable",
            Self::ServiceNotFound(_) => "ServiceNotFound",
            Self::ServiceRequestFailed(_) => "ServiceRequestFailed",
            Self::MalformedPaymentRequest(_) => "MalformedPaymentRequest",
            Self::PaymentFailed(_) => "PaymentFailed",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::CatalogUnavailable(detail)
            | Self::ServiceNotFound(detail)
            | Self::ServiceRequestFailed(detail)
            | Self::MalformedPaymentRequest(detail)
            | Self::PaymentFailed(detail) => detail,
        }
    }
}

/// Terminal error of a paid service run.
///
/// Callers branch on [`PaidServiceError::as_pair`], a numeric class plus a
/// stable machine-readable message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaidServiceError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

impl PaidServiceError {
    pub fn code(&self) -> u16 {
        match self {
            Self::Dag(_) => 500,
            Self::Validation(_) => 400,
            Self::Capability(err) => err.code(),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Dag(DagError::Definition(_)) => "UnexpectedTaskGraphDefinition",
            Self::Dag(DagError::UndeclaredDependency { .. }) => "UnexpectedUndeclaredDependency",
            Self::Dag(DagError::AbsentDependency { .. }) => "UnexpectedAbsentDependency",
            Self::Dag(DagError::Serialization { .. }) => "UnexpectedTaskOutputEncoding",
            Self::Dag(DagError::DependencyDecode { .. }) => "UnexpectedDependencyEncoding",
            Self::Validation(err) => err.message(),
            Self::Capability(err) => err.message(),
        }
    }

    pub fn as_pair(&self) -> (u16, String) {
        (self.code(), self.message().to_string())
    }
}

impl From<GraphDefinitionError> for PaidServiceError {
    fn from(err: GraphDefinitionError) -> Self {
        Self::Dag(DagError::Definition(err))
    }
}

pub type Result<T, E = PaidServiceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_stable() {
        let err = PaidServiceError::from(ValidationError::InvalidNodeIdentity);
        assert_eq!(
            err.as_pair(),
            (400, "ExpectedNodePublicKeyToUsePaidService".to_string())
        );

        let err = PaidServiceError::from(CapabilityError::ServiceNotFound("gamma".into()));
        assert_eq!(err.as_pair(), (404, "ServiceNotFound".to_string()));
        assert_eq!(err.to_string(), "ServiceNotFound: gamma");

        let err = PaidServiceError::from(GraphDefinitionError::Empty);
        assert_eq!(err.code(), 500);
        assert!(matches!(err, PaidServiceError::Dag(ref dag) if dag.is_graph_definition()));
    }

    #[test]
    fn validation_display_matches_message() {
        for err in [
            ValidationError::MissingPrompt,
            ValidationError::MissingLnd,
            ValidationError::MissingLogger,
            ValidationError::MissingNetwork,
            ValidationError::InvalidNodeIdentity,
        ] {
            assert_eq!(err.to_string(), err.message());
        }
        assert_eq!(
            ValidationError::MissingLogger.to_string(),
            "ExpectedLoggerToUsePaidService"
        );
    }

    #[test]
    fn capability_detail_is_preserved() {
        let err = CapabilityError::PaymentFailed("fee exceeds ceiling".into());
        assert_eq!(err.detail(), "fee exceeds ceiling");
        assert_eq!(err.code(), 503);
    }
}
