//! Rules for which documents may be attached to or removed from an invoice.
//!
//! Only metadata lives here; where the bytes are stored is the caller's business.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::invoice::Invoice;
use crate::permissions::{Actor, Role};
use crate::workflow::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "FACTURA")]
    Invoice,
    #[serde(rename = "SOPORTE")]
    Support,
    #[serde(rename = "EVIDENCIA_PAGO")]
    PaymentEvidence,
    #[serde(rename = "CORRECCION")]
    Correction,
    #[serde(rename = "OTRO")]
    Other,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::Invoice,
        DocumentKind::Support,
        DocumentKind::PaymentEvidence,
        DocumentKind::Correction,
        DocumentKind::Other,
    ];

    pub fn code(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "FACTURA",
            DocumentKind::Support => "SOPORTE",
            DocumentKind::PaymentEvidence => "EVIDENCIA_PAGO",
            DocumentKind::Correction => "CORRECCION",
            DocumentKind::Other => "OTRO",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DocumentKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        DocumentKind::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| WorkflowError::UnknownDocumentKind(s.to_string()))
    }
}

/// A document as supplied by the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub file_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewDocument {
    pub fn new(kind: DocumentKind, file_name: impl Into<String>) -> Self {
        Self {
            kind,
            file_name: file_name.into(),
            display_name: None,
            note: None,
        }
    }
}

/// A document attached to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub file_name: String,
    pub display_name: String,
    pub uploaded_by: Uuid,
    pub note: Option<String>,
    /// Part of the initial load rather than added along the way.
    pub initial: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub(crate) fn from_new(new: NewDocument, uploaded_by: Uuid, initial: bool) -> Self {
        let display_name = new.display_name.unwrap_or_else(|| new.file_name.clone());
        Self {
            id: Uuid::new_v4(),
            kind: new.kind,
            file_name: new.file_name,
            display_name,
            uploaded_by,
            note: new.note,
            initial,
            uploaded_at: Utc::now(),
        }
    }
}

/// May `actor` attach a document of `kind` to `invoice` after the initial load?
pub fn check_attachment(invoice: &Invoice, actor: &Actor, kind: DocumentKind) -> Result<()> {
    if invoice.is_annulled {
        return Err(WorkflowError::DocumentNotAllowed(
            "the invoice has been annulled".into(),
        ));
    }

    match kind {
        DocumentKind::Support => require_role(
            actor,
            Role::Accounting,
            "only accounting (stage 3) users may attach support documents",
        ),
        DocumentKind::PaymentEvidence => require_role(
            actor,
            Role::Treasury,
            "only treasury (stage 4) users may attach payment evidence",
        ),
        DocumentKind::Correction => check_correction(invoice, actor),
        DocumentKind::Invoice | DocumentKind::Other => Err(WorkflowError::DocumentNotAllowed(
            format!("{kind} documents are only accepted at initial load"),
        )),
    }
}

fn require_role(actor: &Actor, role: Role, denial: &str) -> Result<()> {
    if actor.has(role) {
        Ok(())
    } else {
        Err(WorkflowError::PermissionDenied(denial.to_string()))
    }
}

// Correction documents are only accepted where a returned invoice is being fixed.
fn check_correction(invoice: &Invoice, actor: &Actor) -> Result<()> {
    match invoice.current_state {
        WorkflowState::Stage1 => {
            if invoice.created_by != actor.id {
                return Err(WorkflowError::PermissionDenied(
                    "only the creator may attach documents in stage 1".into(),
                ));
            }
            require_returned(invoice)
        }
        s if s.is_second_stage() => Err(WorkflowError::DocumentNotAllowed(
            "second-stage reviewers can only approve or reject with a note".into(),
        )),
        WorkflowState::Stage3 => {
            require_role(
                actor,
                Role::Accounting,
                "only accounting (stage 3) users may attach documents in this state",
            )?;
            require_returned(invoice)
        }
        state => Err(WorkflowError::DocumentNotAllowed(format!(
            "correction documents are not accepted in {state}"
        ))),
    }
}

fn require_returned(invoice: &Invoice) -> Result<()> {
    if invoice.return_state.is_some() {
        Ok(())
    } else {
        Err(WorkflowError::DocumentNotAllowed(
            "only invoices returned for correction accept correction documents".into(),
        ))
    }
}

/// May `actor` remove `document` from `invoice`?
///
/// Super admins may remove anything but the invoice file from the initial
/// load. The creator may remove any document while fixing a returned invoice.
pub fn check_removal(invoice: &Invoice, actor: &Actor, document: &Document) -> Result<()> {
    if actor.is_super_admin() {
        if document.initial && document.kind == DocumentKind::Invoice {
            return Err(WorkflowError::DocumentNotAllowed(
                "the initially loaded invoice file cannot be removed".into(),
            ));
        }
        return Ok(());
    }

    let correcting = invoice.current_state == WorkflowState::Stage1
        && invoice.created_by == actor.id
        && invoice.return_state.is_some();
    if correcting {
        Ok(())
    } else {
        Err(WorkflowError::PermissionDenied(
            "only super admins may remove documents outside a correction".into(),
        ))
    }
}

pub fn has_payment_evidence(invoice: &Invoice) -> bool {
    invoice
        .documents
        .iter()
        .any(|d| d.kind == DocumentKind::PaymentEvidence)
}

/// Gate for marking an invoice paid by a user flagged to require evidence.
pub fn check_payment_evidence(invoice: &Invoice, actor: &Actor) -> Result<()> {
    if actor.requires_payment_evidence && !has_payment_evidence(invoice) {
        return Err(WorkflowError::MissingPaymentEvidence);
    }
    Ok(())
}
