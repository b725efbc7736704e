//! Approval workflow for clinic supplier invoices.
//!
//! Invoices move from the originator through department review, accounting
//! and treasury until they are paid or annulled. The crate provides:
//! - the pure transition calculator and role-to-stage mapping ([`workflow`])
//! - the invoice aggregate that applies transitions and keeps return-state and
//!   history bookkeeping ([`invoice`])
//! - role checks, working-list visibility and document rules
//!   ([`permissions`], [`documents`])
//! - working-list filters, archive search and counts ([`search`])
//! - a JSON-backed ledger and an async service that serializes transitions
//!   ([`ledger`], [`service`])

pub mod config;
pub mod documents;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod logging;
pub mod permissions;
pub mod search;
pub mod service;
pub mod workflow;

pub use error::{ErrorKind, InvalidTransition, Result, WorkflowError};
pub use invoice::{HistoryEntry, Invoice, NewInvoice};
pub use workflow::{
    Action, Department, TransitionResult, WorkflowState, compute_transition, map_role_to_state,
};
