use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidTransition, WorkflowError};

/// Something a user asks to do with an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Initial load. Handled at creation, never by the transition calculator.
    #[serde(rename = "CARGAR", alias = "SUBMIT")]
    Submit,
    #[serde(rename = "APROBAR", alias = "APPROVE")]
    Approve,
    #[serde(rename = "RECHAZAR", alias = "REJECT")]
    Reject,
    #[serde(rename = "CORREGIR", alias = "CORRECT")]
    Correct,
    #[serde(rename = "ANULAR", alias = "ANNUL")]
    Annul,
    #[serde(rename = "PAGAR", alias = "PAY")]
    Pay,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Submit,
        Action::Approve,
        Action::Reject,
        Action::Correct,
        Action::Annul,
        Action::Pay,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Action::Submit => "CARGAR",
            Action::Approve => "APROBAR",
            Action::Reject => "RECHAZAR",
            Action::Correct => "CORREGIR",
            Action::Annul => "ANULAR",
            Action::Pay => "PAGAR",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Submit => "SUBMIT",
            Action::Approve => "APPROVE",
            Action::Reject => "REJECT",
            Action::Correct => "CORRECT",
            Action::Annul => "ANNUL",
            Action::Pay => "PAY",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts either the historical code (`APROBAR`) or the English name
/// (`approve`). Anything else is an unrecognized action.
impl FromStr for Action {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Action::ALL
            .into_iter()
            .find(|a| a.code() == wanted || a.name() == wanted)
            .ok_or(WorkflowError::InvalidTransition(
                InvalidTransition::UnrecognizedAction,
            ))
    }
}
