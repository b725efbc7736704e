use serde::{Deserialize, Serialize};

use super::action::Action;
use super::state::WorkflowState;
use crate::error::InvalidTransition;

/// Outcome of a legal transition.
///
/// `rejected_from` is set only for rejections and is the value the caller
/// stores as the invoice's return state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub next_state: WorkflowState,
    pub is_rejection: bool,
    pub rejected_from: Option<WorkflowState>,
}

impl TransitionResult {
    fn forward(next_state: WorkflowState) -> Self {
        Self {
            next_state,
            is_rejection: false,
            rejected_from: None,
        }
    }

    fn rejection(from: WorkflowState, to: WorkflowState) -> Self {
        Self {
            next_state: to,
            is_rejection: true,
            rejected_from: Some(from),
        }
    }
}

/// Compute where `action` takes an invoice currently in `current`.
///
/// `pending_return_state` is only consulted for [`Action::Correct`]: it is the
/// stored return state of a previously rejected invoice and is used verbatim as
/// the destination. Without it a correction re-enters the generic second stage.
///
/// - `Annul` and `Correct` are only legal from `Stage1`.
/// - `Approve` moves any second-stage member to `Stage3`, then `Stage4`, then
///   `Finalized`.
/// - `Reject` moves exactly one rung down from stages 2, 3 and 4 and reports
///   the rejecting state.
/// - `Pay` finalizes from `Stage4` only.
/// - `Submit` is not a transition; invoices are created in their initial state.
///
/// Applying a `Correct` result obliges the caller to clear the invoice's
/// stored return state.
pub fn compute_transition(
    current: WorkflowState,
    action: Action,
    pending_return_state: Option<WorkflowState>,
) -> Result<TransitionResult, InvalidTransition> {
    match action {
        Action::Annul => match current {
            WorkflowState::Stage1 => Ok(TransitionResult::forward(WorkflowState::Annulled)),
            _ => Err(InvalidTransition::AnnulOnlyFromStageOne),
        },
        Action::Correct => match current {
            WorkflowState::Stage1 => Ok(TransitionResult::forward(
                pending_return_state.unwrap_or(WorkflowState::Stage2Generic),
            )),
            _ => Err(InvalidTransition::CorrectionOnlyFromStageOne),
        },
        Action::Approve => match current {
            s if s.is_second_stage() => Ok(TransitionResult::forward(WorkflowState::Stage3)),
            WorkflowState::Stage3 => Ok(TransitionResult::forward(WorkflowState::Stage4)),
            WorkflowState::Stage4 => Ok(TransitionResult::forward(WorkflowState::Finalized)),
            _ => Err(InvalidTransition::ApproveNotPermitted),
        },
        Action::Reject => match current {
            WorkflowState::Stage1 | WorkflowState::Finalized | WorkflowState::Annulled => {
                Err(InvalidTransition::RejectOnlyFromReviewStages)
            }
            _ => current
                .preceding_stage()
                .map(|to| TransitionResult::rejection(current, to))
                .ok_or(InvalidTransition::RejectOnlyFromReviewStages),
        },
        Action::Pay => match current {
            WorkflowState::Stage4 => Ok(TransitionResult::forward(WorkflowState::Finalized)),
            _ => Err(InvalidTransition::PayOnlyFromStageFour),
        },
        Action::Submit => Err(InvalidTransition::UnrecognizedAction),
    }
}
