use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::documents::{Document, NewDocument};
use crate::error::Result;
use crate::invoice::{HistoryEntry, Invoice, InvoiceAmendment, NewInvoice};
use crate::ledger::Ledger;
use crate::permissions::{Actor, Authorizer, RoleAuthorizer};
use crate::search::{InvoiceFilter, InvoiceStats};
use crate::workflow::Action;

/// A user's request to move an invoice.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub invoice_id: Uuid,
    pub action: Action,
    pub actor: Actor,
    pub note: Option<String>,
}

/// Shared entry point for callers that act on invoices concurrently.
///
/// Reading the current state, computing the transition and recording it all
/// happen under one lock, so two requests against the same invoice can never
/// both act on the same state. When a ledger path is set, each change is made
/// on a copy that replaces the shared ledger only once it has been saved.
#[derive(Clone)]
pub struct InvoiceService {
    ledger: Arc<Mutex<Ledger>>,
    authorizer: Arc<dyn Authorizer>,
    persist_to: Option<PathBuf>,
}

impl InvoiceService {
    pub fn new(ledger: Ledger) -> Self {
        Self::with_authorizer(ledger, RoleAuthorizer)
    }

    pub fn with_authorizer(ledger: Ledger, authorizer: impl Authorizer + 'static) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            authorizer: Arc::new(authorizer),
            persist_to: None,
        }
    }

    /// Save the ledger to `path` after each successful change.
    pub fn persisting_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_to = Some(path.into());
        self
    }

    /// Run `change` under the lock. With persistence on, a failed save
    /// discards the change, so callers may retry safely.
    async fn mutate<T>(&self, change: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let mut ledger = self.ledger.lock().await;
        let Some(path) = &self.persist_to else {
            return change(&mut *ledger);
        };

        let mut staged = ledger.clone();
        let value = change(&mut staged)?;
        if let Err(err) = staged.save(path) {
            error!(path = %path.display(), error = %err, "ledger not saved, change discarded");
            return Err(err);
        }
        *ledger = staged;
        Ok(value)
    }

    pub async fn submit(&self, new: NewInvoice, actor: &Actor) -> Result<Invoice> {
        self.mutate(|ledger| ledger.submit(new, actor).cloned()).await
    }

    pub async fn process(&self, request: ActionRequest) -> Result<HistoryEntry> {
        let authorizer = self.authorizer.as_ref();
        let outcome = self
            .mutate(|ledger| {
                ledger.process(
                    request.invoice_id,
                    request.action,
                    &request.actor,
                    request.note.as_deref(),
                    authorizer,
                )
            })
            .await;
        if let Err(err) = &outcome {
            warn!(
                invoice_id = %request.invoice_id,
                action = %request.action,
                actor = %request.actor.name,
                kind = %err.kind(),
                error = %err,
                "action refused"
            );
        }
        outcome
    }

    pub async fn amend(
        &self,
        invoice_id: Uuid,
        changes: InvoiceAmendment,
        actor: &Actor,
    ) -> Result<HistoryEntry> {
        self.mutate(|ledger| ledger.amend(invoice_id, changes, actor))
            .await
    }

    pub async fn attach(
        &self,
        invoice_id: Uuid,
        document: NewDocument,
        actor: &Actor,
    ) -> Result<Document> {
        self.mutate(|ledger| ledger.attach(invoice_id, document, actor).cloned())
            .await
    }

    pub async fn remove_document(
        &self,
        invoice_id: Uuid,
        document_id: Uuid,
        actor: &Actor,
    ) -> Result<Document> {
        self.mutate(|ledger| ledger.remove_document(invoice_id, document_id, actor))
            .await
    }

    pub async fn delete(&self, invoice_id: Uuid, actor: &Actor) -> Result<Invoice> {
        self.mutate(|ledger| ledger.delete(invoice_id, actor)).await
    }

    pub async fn invoice(&self, invoice_id: Uuid) -> Result<Invoice> {
        self.ledger.lock().await.get(invoice_id).cloned()
    }

    pub async fn history(&self, invoice_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let ledger = self.ledger.lock().await;
        Ok(ledger.history(invoice_id)?.into_iter().cloned().collect())
    }

    pub async fn working_list(&self, actor: &Actor, filter: &InvoiceFilter) -> Vec<Invoice> {
        let ledger = self.ledger.lock().await;
        ledger
            .working_list(actor, filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn search(&self, actor: &Actor, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let ledger = self.ledger.lock().await;
        Ok(ledger.search(actor, filter)?.into_iter().cloned().collect())
    }

    pub async fn stats(&self) -> InvoiceStats {
        self.ledger.lock().await.stats()
    }

    pub async fn pending_count(&self, actor: &Actor) -> usize {
        self.ledger.lock().await.pending_count(actor)
    }

    /// Copy of the current ledger, e.g. for saving elsewhere.
    pub async fn snapshot(&self) -> Ledger {
        let ledger = self.ledger.lock().await;
        info!(invoices = ledger.invoices().count(), "ledger snapshot taken");
        ledger.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, WorkflowError};
    use crate::invoice::test_support::new_invoice;
    use crate::permissions::Role;
    use crate::workflow::{Department, WorkflowState};

    fn originator() -> Actor {
        Actor::new("Ana", vec![Role::Originator])
    }

    fn request(invoice_id: Uuid, action: Action, actor: &Actor) -> ActionRequest {
        ActionRequest {
            invoice_id,
            action,
            actor: actor.clone(),
            note: None,
        }
    }

    struct AllowAll;

    impl Authorizer for AllowAll {
        fn authorize(&self, _: &Actor, _: &Invoice, _: Action) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn happy_path_to_finalized() {
        let service = InvoiceService::new(Ledger::new());
        let ana = originator();
        let invoice = service
            .submit(new_invoice(Some("RUTA_2_DIRECCION_GENERAL")), &ana)
            .await
            .unwrap();
        assert_eq!(
            invoice.current_state,
            WorkflowState::Stage2(Department::GeneralDirection)
        );

        let general = Actor::new(
            "Gerencia",
            vec![Role::DepartmentApprover(Department::GeneralDirection)],
        );
        let accountant = Actor::new("Contador", vec![Role::Accounting]);
        let treasurer = Actor::new("Tesorero", vec![Role::Treasury]);

        service.process(request(invoice.id, Action::Approve, &general)).await.unwrap();
        service.process(request(invoice.id, Action::Approve, &accountant)).await.unwrap();
        let entry = service.process(request(invoice.id, Action::Approve, &treasurer)).await.unwrap();
        assert_eq!(entry.to, WorkflowState::Finalized);

        let history = service.history(invoice.id).await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn refusal_is_classified_for_callers() {
        let service = InvoiceService::new(Ledger::new());
        let ana = originator();
        let invoice = service.submit(new_invoice(None), &ana).await.unwrap();

        let err = service
            .process(request(invoice.id, Action::Annul, &ana))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(!err.is_retryable());

        let stranger = Actor::new("Luis", vec![Role::Accounting]);
        let err = service
            .process(request(invoice.id, Action::Approve, &stranger))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn concurrent_actions_apply_one_at_a_time() {
        let service = InvoiceService::with_authorizer(Ledger::new(), AllowAll);
        let ana = originator();
        let invoice = service.submit(new_invoice(None), &ana).await.unwrap();
        service.process(request(invoice.id, Action::Approve, &ana)).await.unwrap();
        service.process(request(invoice.id, Action::Approve, &ana)).await.unwrap();

        // Both see stage 4; only the first to take the lock gets to pay.
        let a = tokio::spawn({
            let service = service.clone();
            let req = request(invoice.id, Action::Pay, &ana);
            async move { service.process(req).await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            let req = request(invoice.id, Action::Approve, &ana);
            async move { service.process(req).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(failure, WorkflowError::InvalidTransition(_)));

        let invoice = service.invoice(invoice.id).await.unwrap();
        assert_eq!(invoice.current_state, WorkflowState::Finalized);
        assert_eq!(service.history(invoice.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn persists_after_each_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        let service = InvoiceService::new(Ledger::new()).persisting_to(&path);
        let ana = originator();
        let invoice = service.submit(new_invoice(None), &ana).await.unwrap();

        let reviewer = Actor::new("Revisor", vec![Role::SecondStage]);
        let mut req = request(invoice.id, Action::Reject, &reviewer);
        req.note = Some("Falta orden de compra".into());
        service.process(req).await.unwrap();

        let restored = Ledger::load(&path).unwrap();
        let stored = restored.get(invoice.id).unwrap();
        assert_eq!(stored.current_state, WorkflowState::Stage1);
        assert_eq!(stored.return_state, Some(WorkflowState::Stage2Generic));
        let notes: Vec<_> = restored
            .history(invoice.id)
            .unwrap()
            .iter()
            .map(|e| e.note.clone())
            .collect();
        assert_eq!(notes[1], "Falta orden de compra");
    }

    #[tokio::test]
    async fn working_list_and_pending_count() {
        let service = InvoiceService::new(Ledger::new());
        let ana = originator();
        service.submit(new_invoice(None), &ana).await.unwrap();

        let reviewer = Actor::new("Revisor", vec![Role::SecondStage]);
        assert_eq!(service.working_list(&reviewer, &InvoiceFilter::default()).await.len(), 1);
        assert_eq!(service.pending_count(&reviewer).await, 1);
        assert_eq!(service.working_list(&ana, &InvoiceFilter::default()).await.len(), 1);
        assert_eq!(service.pending_count(&ana).await, 0);
        assert_eq!(service.snapshot().await.invoices().count(), 1);
    }

    #[tokio::test]
    async fn failed_save_discards_the_change() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let ana = originator();
        let mut ledger = Ledger::new();
        let id = ledger.submit(new_invoice(None), &ana).unwrap().id;
        let service = InvoiceService::new(ledger).persisting_to(blocker.join("invoices.json"));

        let reviewer = Actor::new("Revisor", vec![Role::SecondStage]);
        for _ in 0..2 {
            let err = service
                .process(request(id, Action::Approve, &reviewer))
                .await
                .unwrap_err();
            assert!(matches!(err, WorkflowError::Io(_)));
            assert!(err.is_retryable());
        }
        let invoice = service.invoice(id).await.unwrap();
        assert_eq!(invoice.current_state, WorkflowState::Stage2Generic);
        assert_eq!(service.history(id).await.unwrap().len(), 1);

        let mut another = new_invoice(None);
        another.number = "FE-1002".into();
        assert!(service.submit(another, &ana).await.is_err());
        assert_eq!(service.stats().await.total, 1);
    }

    #[tokio::test]
    async fn amend_refuses_a_number_already_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoices.json");
        let service = InvoiceService::new(Ledger::new()).persisting_to(&path);
        let ana = originator();
        service.submit(new_invoice(None), &ana).await.unwrap();

        let mut second = new_invoice(None);
        second.number = "FE-1002".into();
        let second = service.submit(second, &ana).await.unwrap();
        let reviewer = Actor::new("Revisor", vec![Role::SecondStage]);
        service
            .process(request(second.id, Action::Reject, &reviewer))
            .await
            .unwrap();

        let changes = InvoiceAmendment {
            number: Some("FE-1001".into()),
            ..Default::default()
        };
        let err = service.amend(second.id, changes, &ana).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateInvoice { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = Ledger::load(&path).unwrap();
        assert_eq!(stored.get(second.id).unwrap().number, "FE-1002");
    }

    #[tokio::test]
    async fn archive_search_stats_and_delete() {
        let service = InvoiceService::new(Ledger::new());
        let ana = originator();
        let invoice = service.submit(new_invoice(None), &ana).await.unwrap();

        let filter = InvoiceFilter {
            uploaded_by: Some("ana".into()),
            ..Default::default()
        };
        assert!(service.search(&ana, &filter).await.is_err());

        let admin = Actor::new("Admin", vec![Role::SuperAdmin]);
        assert_eq!(service.search(&admin, &filter).await.unwrap().len(), 1);
        assert_eq!(service.stats().await.total, 1);

        service.delete(invoice.id, &admin).await.unwrap();
        assert_eq!(service.stats().await, InvoiceStats::default());
        assert!(matches!(
            service.history(invoice.id).await,
            Err(WorkflowError::InvoiceNotFound(_))
        ));
    }
}
