//! In-memory invoice store with an append-only history, persisted as JSON.
//!
//! Every mutating operation takes `&mut self`, so a ledger applies one
//! transition at a time. Shared access goes through [`crate::service`].

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::documents::{self, Document, NewDocument};
use crate::error::{Result, WorkflowError};
use crate::invoice::{HistoryEntry, Invoice, InvoiceAmendment, NewInvoice};
use crate::permissions::{self, Actor, Authorizer};
use crate::search::{InvoiceFilter, InvoiceStats};
use crate::workflow::Action;

pub const DEFAULT_NOTE: &str = "No note";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    invoices: BTreeMap<Uuid, Invoice>,
    history: Vec<HistoryEntry>,
    #[serde(skip)]
    default_note: Option<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note recorded when an action is performed without one.
    pub fn with_default_note(mut self, note: impl Into<String>) -> Self {
        self.default_note = Some(note.into());
        self
    }

    /// Load a ledger from `path`. A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no ledger file, starting empty");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let ledger: Ledger = serde_json::from_str(&contents)?;
        debug!(
            path = %path.display(),
            invoices = ledger.invoices.len(),
            "ledger loaded"
        );
        Ok(ledger)
    }

    /// Write the ledger to `path` through a temp file and a rename, so a
    /// crash mid-write leaves the previous ledger intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<&Invoice> {
        self.invoices.get(&id).ok_or(WorkflowError::InvoiceNotFound(id))
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut Invoice> {
        self.invoices
            .get_mut(&id)
            .ok_or(WorkflowError::InvoiceNotFound(id))
    }

    pub fn invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values()
    }

    /// Load a new invoice. An invoice number may only be active once per
    /// provider; annulled invoices free their number.
    pub fn submit(&mut self, new: NewInvoice, actor: &Actor) -> Result<&Invoice> {
        self.ensure_unique(new.number.trim(), new.provider_nit.trim(), None)?;

        let (invoice, entry) = Invoice::submit(new, actor)?;
        let id = invoice.id;
        info!(
            invoice_id = %id,
            number = %invoice.number,
            state = %invoice.current_state,
            actor = %actor.name,
            "invoice loaded"
        );
        self.history.push(entry);
        Ok(self.invoices.entry(id).or_insert(invoice))
    }

    fn ensure_unique(&self, number: &str, provider_nit: &str, except: Option<Uuid>) -> Result<()> {
        let duplicate = self.invoices.values().any(|i| {
            Some(i.id) != except
                && !i.is_annulled
                && i.number == number
                && i.provider_nit == provider_nit
        });
        if duplicate {
            return Err(WorkflowError::DuplicateInvoice {
                number: number.to_string(),
                provider_nit: provider_nit.to_string(),
            });
        }
        Ok(())
    }

    /// Run `action` on an invoice: the calculator decides legality, then the
    /// authorizer and the payment-evidence gate, and only then is the result
    /// applied and recorded. Any failure leaves the ledger unchanged.
    pub fn process(
        &mut self,
        id: Uuid,
        action: Action,
        actor: &Actor,
        note: Option<&str>,
        authorizer: &dyn Authorizer,
    ) -> Result<HistoryEntry> {
        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.default_note
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NOTE.to_string())
            });

        let invoice = self.get_mut(id)?;
        let result = invoice.plan(action)?;
        authorizer.authorize(actor, invoice, action)?;
        if action == Action::Pay {
            documents::check_payment_evidence(invoice, actor)?;
        }

        let entry = invoice.commit(action, result, actor, note);
        info!(
            invoice_id = %id,
            %action,
            from = ?entry.from,
            to = %entry.to,
            rejection = entry.is_rejection,
            actor = %actor.name,
            "transition applied"
        );
        self.history.push(entry.clone());
        Ok(entry)
    }

    pub fn amend(
        &mut self,
        id: Uuid,
        changes: InvoiceAmendment,
        actor: &Actor,
    ) -> Result<HistoryEntry> {
        let current = self.get(id)?;
        let number = changes
            .number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&current.number);
        let provider_nit = changes
            .provider_nit
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&current.provider_nit);
        self.ensure_unique(number, provider_nit, Some(id))?;

        let entry = self.get_mut(id)?.amend(changes, actor)?;
        info!(invoice_id = %id, actor = %actor.name, "invoice amended");
        self.history.push(entry.clone());
        Ok(entry)
    }

    pub fn attach(&mut self, id: Uuid, document: NewDocument, actor: &Actor) -> Result<&Document> {
        let attached = self.get_mut(id)?.attach(document, actor)?;
        info!(
            invoice_id = %id,
            kind = %attached.kind,
            file = %attached.file_name,
            "document attached"
        );
        Ok(attached)
    }

    pub fn remove_document(&mut self, id: Uuid, document_id: Uuid, actor: &Actor) -> Result<Document> {
        let removed = self.get_mut(id)?.remove_document(document_id, actor)?;
        info!(invoice_id = %id, document_id = %document_id, "document removed");
        Ok(removed)
    }

    /// History of one invoice, oldest first.
    pub fn history(&self, id: Uuid) -> Result<Vec<&HistoryEntry>> {
        self.get(id)?;
        Ok(self.history.iter().filter(|e| e.invoice_id == id).collect())
    }

    /// Working list for `actor`, most recently updated first.
    pub fn visible_to(&self, actor: &Actor) -> Vec<&Invoice> {
        let mut visible: Vec<_> = self
            .invoices
            .values()
            .filter(|invoice| permissions::is_visible_to(actor, invoice))
            .collect();
        visible.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        visible
    }

    /// Working list narrowed by `filter`.
    pub fn working_list(&self, actor: &Actor, filter: &InvoiceFilter) -> Vec<&Invoice> {
        let mut list: Vec<_> = self
            .visible_to(actor)
            .into_iter()
            .filter(|invoice| filter.matches(invoice))
            .collect();
        filter.truncate(&mut list);
        list
    }

    pub fn pending_count(&self, actor: &Actor) -> usize {
        permissions::pending_count(actor, self.invoices.values())
    }

    /// Search every invoice, newest load first. Only super admins and
    /// archive searchers may do this.
    pub fn search(&self, actor: &Actor, filter: &InvoiceFilter) -> Result<Vec<&Invoice>> {
        if !actor.can_search() {
            return Err(WorkflowError::PermissionDenied(format!(
                "{} may not search the invoice archive",
                actor.name
            )));
        }
        let mut found: Vec<_> = self
            .invoices
            .values()
            .filter(|invoice| filter.matches(invoice))
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        filter.truncate(&mut found);
        debug!(actor = %actor.name, results = found.len(), "archive search");
        Ok(found)
    }

    pub fn stats(&self) -> InvoiceStats {
        InvoiceStats::collect(self.invoices.values())
    }

    /// Remove an invoice with its documents and history. Super admins only.
    pub fn delete(&mut self, id: Uuid, actor: &Actor) -> Result<Invoice> {
        if !actor.is_super_admin() {
            return Err(WorkflowError::PermissionDenied(
                "only super admins may delete invoices".into(),
            ));
        }
        let invoice = self
            .invoices
            .remove(&id)
            .ok_or(WorkflowError::InvoiceNotFound(id))?;
        let before = self.history.len();
        self.history.retain(|e| e.invoice_id != id);
        info!(
            invoice_id = %id,
            number = %invoice.number,
            documents = invoice.documents.len(),
            history = before - self.history.len(),
            actor = %actor.name,
            "invoice deleted"
        );
        Ok(invoice)
    }
}
