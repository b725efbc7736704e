use super::state::{Department, WorkflowState};

/// Role tag of the legacy second-stage approvers, who are not tied to a department.
pub const LEGACY_SECOND_STAGE_TAG: &str = "RUTA_2";

/// Map an approver role tag to the second-stage state it operates.
///
/// Unknown tags yield `None`, which callers treat as the generic second stage.
/// Invoices loaded before departments existed carry no tag at all.
pub fn map_role_to_state(role_tag: &str) -> Option<WorkflowState> {
    if role_tag == LEGACY_SECOND_STAGE_TAG {
        return Some(WorkflowState::Stage2Generic);
    }
    Department::from_role_tag(role_tag).map(WorkflowState::Stage2)
}

/// State a freshly loaded invoice starts in given the chosen approver tag.
pub fn initial_state_for(role_tag: Option<&str>) -> WorkflowState {
    role_tag
        .and_then(map_role_to_state)
        .unwrap_or(WorkflowState::Stage2Generic)
}
