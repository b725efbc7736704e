use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::{self, Document, DocumentKind, NewDocument};
use crate::error::{InvalidTransition, Result, WorkflowError};
use crate::permissions::Actor;
use crate::workflow::{
    Action, TransitionResult, WorkflowState, compute_transition, initial_state_for,
    map_role_to_state,
};

/// Data supplied when an invoice is first loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub number: String,
    pub provider_nit: String,
    #[serde(default)]
    pub provider_name: Option<String>,
    pub issued_on: NaiveDate,
    /// Amount in cents.
    pub amount_cents: u64,
    #[serde(default)]
    pub concept: Option<String>,
    /// Second-stage approver chosen by the originator.
    #[serde(default)]
    pub approver_role_tag: Option<String>,
    pub documents: Vec<NewDocument>,
}

/// Fields the originator may change while fixing a returned invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceAmendment {
    pub number: Option<String>,
    pub provider_nit: Option<String>,
    pub provider_name: Option<String>,
    pub issued_on: Option<NaiveDate>,
    pub amount_cents: Option<u64>,
    pub concept: Option<String>,
}

/// A supplier invoice moving through the approval workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub provider_nit: String,
    #[serde(default)]
    pub provider_name: Option<String>,
    pub issued_on: NaiveDate,
    pub amount_cents: u64,
    pub concept: Option<String>,
    pub current_state: WorkflowState,
    /// State that last rejected the invoice; a correction sends it back there.
    pub return_state: Option<WorkflowState>,
    pub is_annulled: bool,
    /// Department approver tag, kept only when it names a department.
    pub approver_role_tag: Option<String>,
    pub created_by: Uuid,
    /// Name of the user who loaded the invoice, kept for searches.
    #[serde(default)]
    pub created_by_name: String,
    pub documents: Vec<Document>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Performed(Action),
    /// Invoice data edited during a correction; the state does not change.
    Amended,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Performed(action) => write!(f, "{action}"),
            Activity::Amended => write!(f, "AMEND"),
        }
    }
}

/// One audit row per successful operation on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub invoice_id: Uuid,
    /// `None` for the initial load.
    pub from: Option<WorkflowState>,
    pub to: WorkflowState,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub activity: Activity,
    pub note: String,
    pub is_rejection: bool,
    pub at: DateTime<Utc>,
}

impl Invoice {
    /// Load a new invoice. It starts in the second stage picked by the
    /// approver tag, or the generic one when the tag is missing or unknown.
    pub fn submit(new: NewInvoice, actor: &Actor) -> Result<(Self, HistoryEntry)> {
        if new.number.trim().is_empty() {
            return Err(WorkflowError::InvalidInvoice("invoice number is required".into()));
        }
        if new.provider_nit.trim().is_empty() {
            return Err(WorkflowError::InvalidInvoice("provider NIT is required".into()));
        }
        if new.amount_cents == 0 {
            return Err(WorkflowError::InvalidInvoice("amount must be positive".into()));
        }
        if !new.documents.iter().any(|d| d.kind == DocumentKind::Invoice) {
            return Err(WorkflowError::InvalidInvoice(
                "at least one FACTURA document is required".into(),
            ));
        }

        let state = initial_state_for(new.approver_role_tag.as_deref());
        let approver_role_tag = new
            .approver_role_tag
            .filter(|tag| map_role_to_state(tag).and_then(WorkflowState::department).is_some());

        let document_count = new.documents.len();
        let documents = new
            .documents
            .into_iter()
            .map(|d| Document::from_new(d, actor.id, true))
            .collect();

        let now = Utc::now();
        let invoice = Self {
            id: Uuid::new_v4(),
            number: new.number.trim().to_string(),
            provider_nit: new.provider_nit.trim().to_string(),
            provider_name: new.provider_name.filter(|n| !n.trim().is_empty()),
            issued_on: new.issued_on,
            amount_cents: new.amount_cents,
            concept: new.concept,
            current_state: state,
            return_state: None,
            is_annulled: false,
            approver_role_tag,
            created_by: actor.id,
            created_by_name: actor.name.clone(),
            documents,
            created_at: now,
            updated_at: now,
        };

        let entry = HistoryEntry {
            invoice_id: invoice.id,
            from: None,
            to: state,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            activity: Activity::Performed(Action::Submit),
            note: format!("Initial load with {document_count} documents"),
            is_rejection: false,
            at: now,
        };

        Ok((invoice, entry))
    }

    /// Ask the calculator where `action` would take this invoice. The stored
    /// return state is only handed over for corrections.
    pub fn plan(&self, action: Action) -> std::result::Result<TransitionResult, InvalidTransition> {
        let pending_return = match action {
            Action::Correct => self.return_state,
            _ => None,
        };
        compute_transition(self.current_state, action, pending_return)
    }

    /// Apply a planned transition and the bookkeeping that goes with it:
    /// rejections store the rejecting state, every other transition clears it,
    /// and annulment marks the invoice.
    pub fn commit(
        &mut self,
        action: Action,
        result: TransitionResult,
        actor: &Actor,
        note: impl Into<String>,
    ) -> HistoryEntry {
        let from = self.current_state;
        self.current_state = result.next_state;
        self.return_state = if result.is_rejection {
            result.rejected_from
        } else {
            None
        };
        if action == Action::Annul {
            self.is_annulled = true;
        }
        self.updated_at = Utc::now();

        HistoryEntry {
            invoice_id: self.id,
            from: Some(from),
            to: result.next_state,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            activity: Activity::Performed(action),
            note: note.into(),
            is_rejection: result.is_rejection,
            at: self.updated_at,
        }
    }

    /// Plan and commit in one step. No permission checks.
    pub fn apply(
        &mut self,
        action: Action,
        actor: &Actor,
        note: impl Into<String>,
    ) -> Result<HistoryEntry> {
        let result = self.plan(action)?;
        Ok(self.commit(action, result, actor, note))
    }

    pub fn is_awaiting_correction(&self) -> bool {
        self.current_state == WorkflowState::Stage1 && self.return_state.is_some()
    }

    /// Edit invoice data while it sits in stage 1 after a rejection. Only the
    /// creator may do this.
    pub fn amend(&mut self, changes: InvoiceAmendment, actor: &Actor) -> Result<HistoryEntry> {
        if self.current_state != WorkflowState::Stage1 {
            return Err(WorkflowError::InvalidInvoice(
                "invoice data can only be edited in stage 1".into(),
            ));
        }
        if self.created_by != actor.id {
            return Err(WorkflowError::PermissionDenied(
                "only the creator may edit the invoice".into(),
            ));
        }
        if self.return_state.is_none() {
            return Err(WorkflowError::InvalidInvoice(
                "only invoices returned for correction can be edited".into(),
            ));
        }
        if changes.amount_cents == Some(0) {
            return Err(WorkflowError::InvalidInvoice("amount must be positive".into()));
        }

        if let Some(number) = changes.number.filter(|n| !n.trim().is_empty()) {
            self.number = number.trim().to_string();
        }
        if let Some(nit) = changes.provider_nit.filter(|n| !n.trim().is_empty()) {
            self.provider_nit = nit.trim().to_string();
        }
        if let Some(name) = changes.provider_name.filter(|n| !n.trim().is_empty()) {
            self.provider_name = Some(name.trim().to_string());
        }
        if let Some(issued_on) = changes.issued_on {
            self.issued_on = issued_on;
        }
        if let Some(amount) = changes.amount_cents {
            self.amount_cents = amount;
        }
        if changes.concept.is_some() {
            self.concept = changes.concept;
        }
        self.updated_at = Utc::now();

        Ok(HistoryEntry {
            invoice_id: self.id,
            from: Some(self.current_state),
            to: self.current_state,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            activity: Activity::Amended,
            note: "Invoice data updated during correction".into(),
            is_rejection: false,
            at: self.updated_at,
        })
    }

    pub fn attach(&mut self, document: NewDocument, actor: &Actor) -> Result<&Document> {
        documents::check_attachment(self, actor, document.kind)?;
        let index = self.documents.len();
        self.documents.push(Document::from_new(document, actor.id, false));
        self.updated_at = Utc::now();
        Ok(&self.documents[index])
    }

    pub fn remove_document(&mut self, document_id: Uuid, actor: &Actor) -> Result<Document> {
        let index = self
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or(WorkflowError::DocumentNotFound(document_id))?;
        documents::check_removal(self, actor, &self.documents[index])?;
        self.updated_at = Utc::now();
        Ok(self.documents.remove(index))
    }
}

/// Parse an amount such as `1500`, `1500.5`, `1.500,50` or `4.250.000` into
/// cents. Without a comma, a dot followed by three digits groups thousands.
pub fn parse_amount(text: &str) -> Result<u64> {
    let invalid = || WorkflowError::InvalidInvoice(format!("invalid amount: {text}"));
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| !matches!(c, '_' | ' '))
        .collect();

    let (whole, frac) = match cleaned.rsplit_once(',') {
        // Decimal comma; dots group thousands.
        Some((whole, frac)) if (1..=2).contains(&frac.len()) => (ungroup(whole, '.'), frac),
        // Commas group thousands; a dot, if any, is decimal.
        Some(_) => {
            let (whole, frac) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
            (ungroup(whole, ','), frac)
        }
        None => match cleaned.rsplit_once('.') {
            Some((head, tail)) if tail.len() == 3 || head.contains('.') => {
                (ungroup(&cleaned, '.'), "")
            }
            Some((whole, frac)) => (Some(whole.to_string()), frac),
            None => (Some(cleaned.clone()), ""),
        },
    };

    let whole = whole.ok_or_else(invalid)?;
    if whole.is_empty() || frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    let frac: u64 = format!("{frac:0<2}").parse().map_err(|_| invalid())?;
    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(invalid)
}

/// Drop thousands separators: `4.250.000` becomes `4250000`. `None` when the
/// groups after the first are not exactly three digits.
fn ungroup(text: &str, separator: char) -> Option<String> {
    let mut groups = text.split(separator);
    let first = groups.next()?;
    let mut digits = first.to_string();
    for group in groups {
        if first.is_empty() || first.len() > 3 || group.len() != 3 {
            return None;
        }
        digits.push_str(group);
    }
    Some(digits)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// An invoice sitting in `state`, created by `creator`, with no documents.
    pub fn invoice_in(state: WorkflowState, creator: &Actor) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            number: "FE-1001".into(),
            provider_nit: "900123456-1".into(),
            provider_name: Some("Laboratorios Andinos".into()),
            issued_on: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            amount_cents: 15_000_000,
            concept: Some("Insumos de laboratorio".into()),
            current_state: state,
            return_state: None,
            is_annulled: state == WorkflowState::Annulled,
            approver_role_tag: state.department().map(|d| d.role_tag().to_string()),
            created_by: creator.id,
            created_by_name: creator.name.clone(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_invoice(approver_role_tag: Option<&str>) -> NewInvoice {
        NewInvoice {
            number: "FE-1001".into(),
            provider_nit: "900123456-1".into(),
            provider_name: Some("Laboratorios Andinos".into()),
            issued_on: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            amount_cents: 15_000_000,
            concept: None,
            approver_role_tag: approver_role_tag.map(str::to_string),
            documents: vec![NewDocument::new(DocumentKind::Invoice, "FE-1001.pdf")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::new_invoice;
    use super::*;
    use crate::permissions::Role;
    use crate::workflow::Department;

    fn originator() -> Actor {
        Actor::new("Ana", vec![Role::Originator])
    }

    #[test]
    fn submit_routes_to_department() {
        let ana = originator();
        let (invoice, entry) =
            Invoice::submit(new_invoice(Some("RUTA_2_DIRECCION_FINANCIERA")), &ana).unwrap();

        assert_eq!(
            invoice.current_state,
            WorkflowState::Stage2(Department::FinancialDirection)
        );
        assert_eq!(
            invoice.approver_role_tag.as_deref(),
            Some("RUTA_2_DIRECCION_FINANCIERA")
        );
        assert_eq!(invoice.created_by, ana.id);
        assert!(invoice.documents.iter().all(|d| d.initial));
        assert_eq!(entry.from, None);
        assert_eq!(entry.to, invoice.current_state);
        assert_eq!(entry.activity, Activity::Performed(Action::Submit));
        assert_eq!(entry.note, "Initial load with 1 documents");
    }

    #[test]
    fn submit_without_known_tag_uses_generic_stage() {
        for tag in [None, Some("RUTA_2"), Some("DESCONOCIDO")] {
            let (invoice, _) = Invoice::submit(new_invoice(tag), &originator()).unwrap();
            assert_eq!(invoice.current_state, WorkflowState::Stage2Generic);
            assert_eq!(invoice.approver_role_tag, None);
        }
    }

    #[test]
    fn submit_requires_invoice_document() {
        let mut new = new_invoice(None);
        new.documents = vec![NewDocument::new(DocumentKind::Support, "anexo.pdf")];
        let err = Invoice::submit(new, &originator()).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInvoice(_)));
    }

    #[test]
    fn submit_rejects_zero_amount() {
        let mut new = new_invoice(None);
        new.amount_cents = 0;
        assert!(Invoice::submit(new, &originator()).is_err());
    }

    #[test]
    fn rejection_then_correction_round_trip() {
        let ana = originator();
        let (mut invoice, _) =
            Invoice::submit(new_invoice(Some("RUTA_2_CONTROL_INTERNO")), &ana).unwrap();
        let reviewer = Actor::new(
            "Control",
            vec![Role::DepartmentApprover(Department::InternalControl)],
        );

        let entry = invoice.apply(Action::Reject, &reviewer, "Falta RUT").unwrap();
        assert!(entry.is_rejection);
        assert_eq!(invoice.current_state, WorkflowState::Stage1);
        assert_eq!(
            invoice.return_state,
            Some(WorkflowState::Stage2(Department::InternalControl))
        );
        assert!(invoice.is_awaiting_correction());

        let entry = invoice.apply(Action::Correct, &ana, "RUT adjunto").unwrap();
        assert!(!entry.is_rejection);
        assert_eq!(
            invoice.current_state,
            WorkflowState::Stage2(Department::InternalControl)
        );
        assert_eq!(invoice.return_state, None);
    }

    #[test]
    fn return_state_cleared_after_any_forward_move() {
        let ana = originator();
        let mut invoice = test_support::invoice_in(WorkflowState::Stage4, &ana);
        invoice.apply(Action::Reject, &ana, "").unwrap();
        assert_eq!(invoice.current_state, WorkflowState::Stage3);
        assert_eq!(invoice.return_state, Some(WorkflowState::Stage4));

        invoice.apply(Action::Approve, &ana, "").unwrap();
        assert_eq!(invoice.current_state, WorkflowState::Stage4);
        assert_eq!(invoice.return_state, None);
    }

    #[test]
    fn annul_marks_invoice() {
        let ana = originator();
        let mut invoice = test_support::invoice_in(WorkflowState::Stage1, &ana);
        invoice.apply(Action::Annul, &ana, "Duplicada").unwrap();
        assert!(invoice.is_annulled);
        assert_eq!(invoice.current_state, WorkflowState::Annulled);
        assert!(invoice.apply(Action::Correct, &ana, "").is_err());
    }

    #[test]
    fn failed_apply_leaves_invoice_untouched() {
        let ana = originator();
        let mut invoice = test_support::invoice_in(WorkflowState::Stage3, &ana);
        let before = invoice.updated_at;
        let err = invoice.apply(Action::Pay, &ana, "").unwrap_err();
        assert_eq!(err.transition_reason(), Some(InvalidTransition::PayOnlyFromStageFour));
        assert_eq!(invoice.current_state, WorkflowState::Stage3);
        assert_eq!(invoice.updated_at, before);
    }

    #[test]
    fn amend_only_while_correcting() {
        let ana = originator();
        let mut invoice = test_support::invoice_in(WorkflowState::Stage1, &ana);
        let changes = InvoiceAmendment {
            amount_cents: Some(12_000_000),
            ..Default::default()
        };
        assert!(invoice.amend(changes.clone(), &ana).is_err());

        invoice.return_state = Some(WorkflowState::Stage3);
        let entry = invoice.amend(changes.clone(), &ana).unwrap();
        assert_eq!(entry.activity, Activity::Amended);
        assert_eq!(entry.from, Some(WorkflowState::Stage1));
        assert_eq!(invoice.amount_cents, 12_000_000);

        let luis = Actor::new("Luis", vec![Role::Originator]);
        assert!(matches!(
            invoice.amend(changes, &luis),
            Err(WorkflowError::PermissionDenied(_))
        ));
    }

    #[test]
    fn attach_and_remove_documents() {
        let ana = originator();
        let treasurer = Actor::new("Tesorero", vec![Role::Treasury]);
        let mut invoice = test_support::invoice_in(WorkflowState::Stage4, &ana);

        let id = invoice
            .attach(NewDocument::new(DocumentKind::PaymentEvidence, "pago.pdf"), &treasurer)
            .unwrap()
            .id;
        assert_eq!(invoice.documents.len(), 1);

        assert!(invoice.remove_document(id, &treasurer).is_err());
        let admin = Actor::new("Admin", vec![Role::SuperAdmin]);
        let removed = invoice.remove_document(id, &admin).unwrap();
        assert_eq!(removed.file_name, "pago.pdf");
        assert!(matches!(
            invoice.remove_document(id, &admin),
            Err(WorkflowError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn parse_amount_formats() {
        assert_eq!(parse_amount("150000").unwrap(), 15_000_000);
        assert_eq!(parse_amount("1500.5").unwrap(), 150_050);
        assert_eq!(parse_amount("1,500.25").unwrap(), 150_025);
        assert_eq!(parse_amount("1.500,25").unwrap(), 150_025);
        assert_eq!(parse_amount("99,9").unwrap(), 9_990);
        assert_eq!(parse_amount("4.250.000").unwrap(), 425_000_000);
        assert_eq!(parse_amount("150.000").unwrap(), 15_000_000);
        assert_eq!(parse_amount("$ 1.500").unwrap(), 150_000);
        // Three digits after a lone dot read as thousands, not decimals.
        assert_eq!(parse_amount("12.345").unwrap(), 1_234_500);
        assert!(parse_amount("1.500.5").is_err());
        assert!(parse_amount("1.5,00,25").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn history_entry_serializes_activity() {
        let ana = originator();
        let (_, entry) = Invoice::submit(new_invoice(None), &ana).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["activity"]["performed"], "CARGAR");
        assert_eq!(json["to"], "RUTA_2");
    }
}
