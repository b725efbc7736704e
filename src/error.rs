use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Why the transition calculator refused a request.
///
/// Permanent: retrying the same action against the same state fails again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum InvalidTransition {
    #[error("annul only from stage 1")]
    AnnulOnlyFromStageOne,

    #[error("correction only from stage 1")]
    CorrectionOnlyFromStageOne,

    #[error("approve not permitted in this state")]
    ApproveNotPermitted,

    #[error("reject only permitted in stages 2, 3, 4")]
    RejectOnlyFromReviewStages,

    #[error("pay only permitted in stage 4")]
    PayOnlyFromStageFour,

    #[error("unrecognized action")]
    UnrecognizedAction,
}

impl InvalidTransition {
    /// Stable machine-readable reason code.
    pub fn code(self) -> &'static str {
        match self {
            InvalidTransition::AnnulOnlyFromStageOne => "ANNUL_ONLY_FROM_STAGE_1",
            InvalidTransition::CorrectionOnlyFromStageOne => "CORRECT_ONLY_FROM_STAGE_1",
            InvalidTransition::ApproveNotPermitted => "APPROVE_NOT_PERMITTED",
            InvalidTransition::RejectOnlyFromReviewStages => "REJECT_ONLY_FROM_STAGES_2_3_4",
            InvalidTransition::PayOnlyFromStageFour => "PAY_ONLY_FROM_STAGE_4",
            InvalidTransition::UnrecognizedAction => "UNRECOGNIZED_ACTION",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("unknown workflow state: {0}")]
    UnknownState(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown document kind: {0}")]
    UnknownDocumentKind(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("payment evidence must be attached before the invoice is marked as paid")]
    MissingPaymentEvidence,

    #[error("document not allowed: {0}")]
    DocumentNotAllowed(String),

    #[error("invalid invoice: {0}")]
    InvalidInvoice(String),

    #[error("invoice {number} from provider {provider_nit} is already active")]
    DuplicateInvoice { number: String, provider_nit: String },

    #[error("invoice not found: {0}")]
    InvoiceNotFound(Uuid),

    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Coarse classification callers switch on to pick a response, instead of
/// inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The request cannot succeed in the invoice's current state or shape.
    InvalidRequest,
    /// The acting user lacks the role for this operation.
    Forbidden,
    NotFound,
    Conflict,
    /// Storage or serialization failure; the only retryable kind.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidRequest => write!(f, "InvalidRequest"),
            ErrorKind::Forbidden => write!(f, "Forbidden"),
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidTransition(_)
            | WorkflowError::UnknownState(_)
            | WorkflowError::UnknownRole(_)
            | WorkflowError::UnknownDocumentKind(_)
            | WorkflowError::MissingPaymentEvidence
            | WorkflowError::DocumentNotAllowed(_)
            | WorkflowError::InvalidInvoice(_) => ErrorKind::InvalidRequest,
            WorkflowError::PermissionDenied(_) => ErrorKind::Forbidden,
            WorkflowError::InvoiceNotFound(_) | WorkflowError::DocumentNotFound(_) => {
                ErrorKind::NotFound
            }
            WorkflowError::DuplicateInvoice { .. } => ErrorKind::Conflict,
            WorkflowError::Io(_) | WorkflowError::Json(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }

    /// The calculator's reason, when this error came from it.
    pub fn transition_reason(&self) -> Option<InvalidTransition> {
        match self {
            WorkflowError::InvalidTransition(reason) => Some(*reason),
            _ => None,
        }
    }
}
