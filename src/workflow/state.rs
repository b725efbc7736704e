use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Departments that can own the second approval stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    InternalControl,
    MedicalDirection,
    FinancialDirection,
    AdministrativeDirection,
    GeneralDirection,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::InternalControl,
        Department::MedicalDirection,
        Department::FinancialDirection,
        Department::AdministrativeDirection,
        Department::GeneralDirection,
    ];

    /// Role tag of the approvers for this department. Doubles as the code of
    /// the matching second-stage state.
    pub fn role_tag(self) -> &'static str {
        match self {
            Department::InternalControl => "RUTA_2_CONTROL_INTERNO",
            Department::MedicalDirection => "RUTA_2_DIRECCION_MEDICA",
            Department::FinancialDirection => "RUTA_2_DIRECCION_FINANCIERA",
            Department::AdministrativeDirection => "RUTA_2_DIRECCION_ADMINISTRATIVA",
            Department::GeneralDirection => "RUTA_2_DIRECCION_GENERAL",
        }
    }

    pub fn from_role_tag(tag: &str) -> Option<Department> {
        Department::ALL.into_iter().find(|d| d.role_tag() == tag)
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Department::InternalControl => "Internal Control",
            Department::MedicalDirection => "Medical Direction",
            Department::FinancialDirection => "Financial Direction",
            Department::AdministrativeDirection => "Administrative Direction",
            Department::GeneralDirection => "General Direction",
        };
        f.write_str(name)
    }
}

/// Where an invoice sits in the approval pipeline.
///
/// The pipeline is a four-rung ladder (originator, department review,
/// accounting, treasury) ending in one of two terminal states. The second rung
/// has a legacy undifferentiated member plus one member per [`Department`];
/// all six count as the same rung for approve/reject purposes.
///
/// Serialized with the clinic's historical state codes (`RUTA_1`, `FINALIZADA`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WorkflowState {
    /// Originator; invoices come back here to be corrected or annulled.
    Stage1,
    /// Legacy second stage with no department attached.
    Stage2Generic,
    /// Second stage owned by a specific department.
    Stage2(Department),
    /// Accounting.
    Stage3,
    /// Treasury.
    Stage4,
    /// Paid. Terminal.
    Finalized,
    /// Cancelled by the originator. Terminal.
    Annulled,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 11] = [
        WorkflowState::Stage1,
        WorkflowState::Stage2Generic,
        WorkflowState::Stage2(Department::InternalControl),
        WorkflowState::Stage2(Department::MedicalDirection),
        WorkflowState::Stage2(Department::FinancialDirection),
        WorkflowState::Stage2(Department::AdministrativeDirection),
        WorkflowState::Stage2(Department::GeneralDirection),
        WorkflowState::Stage3,
        WorkflowState::Stage4,
        WorkflowState::Finalized,
        WorkflowState::Annulled,
    ];

    pub fn code(self) -> &'static str {
        match self {
            WorkflowState::Stage1 => "RUTA_1",
            WorkflowState::Stage2Generic => "RUTA_2",
            WorkflowState::Stage2(department) => department.role_tag(),
            WorkflowState::Stage3 => "RUTA_3",
            WorkflowState::Stage4 => "RUTA_4",
            WorkflowState::Finalized => "FINALIZADA",
            WorkflowState::Annulled => "ANULADA",
        }
    }

    /// True for the generic second stage and every department variant.
    pub fn is_second_stage(self) -> bool {
        matches!(self, WorkflowState::Stage2Generic | WorkflowState::Stage2(_))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Finalized | WorkflowState::Annulled)
    }

    /// The department owning this state, if it is a department second stage.
    pub fn department(self) -> Option<Department> {
        match self {
            WorkflowState::Stage2(department) => Some(department),
            _ => None,
        }
    }

    /// Rung on the approval ladder (1..=4). Terminal states have none.
    pub fn rung(self) -> Option<u8> {
        match self {
            WorkflowState::Stage1 => Some(1),
            WorkflowState::Stage2Generic | WorkflowState::Stage2(_) => Some(2),
            WorkflowState::Stage3 => Some(3),
            WorkflowState::Stage4 => Some(4),
            WorkflowState::Finalized | WorkflowState::Annulled => None,
        }
    }

    /// The rung immediately below this one. The second rung is represented by
    /// its generic member since the department is not restored on the way down.
    pub fn preceding_stage(self) -> Option<WorkflowState> {
        match self {
            WorkflowState::Stage2Generic | WorkflowState::Stage2(_) => Some(WorkflowState::Stage1),
            WorkflowState::Stage3 => Some(WorkflowState::Stage2Generic),
            WorkflowState::Stage4 => Some(WorkflowState::Stage3),
            WorkflowState::Stage1 | WorkflowState::Finalized | WorkflowState::Annulled => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for WorkflowState {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        WorkflowState::ALL
            .into_iter()
            .find(|state| state.code() == code)
            .ok_or_else(|| WorkflowError::UnknownState(s.to_string()))
    }
}

impl TryFrom<String> for WorkflowState {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkflowState> for String {
    fn from(state: WorkflowState) -> Self {
        state.code().to_string()
    }
}
