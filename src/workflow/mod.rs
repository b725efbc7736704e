mod action;
mod role;
mod state;
mod transition;


pub use action::Action;
pub use role::{LEGACY_SECOND_STAGE_TAG, initial_state_for, map_role_to_state};
pub use state::{Department, WorkflowState};
pub use transition::{TransitionResult, compute_transition};
