mod cli;
mod ui;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;

use cli::{Cli, Command};
use invoice_workflow::config::WorkflowConfig;
use invoice_workflow::documents::{DocumentKind, NewDocument};
use invoice_workflow::invoice::{InvoiceAmendment, NewInvoice, parse_amount};
use invoice_workflow::ledger::Ledger;
use invoice_workflow::logging::init_logging;
use invoice_workflow::permissions::{Actor, Role};
use invoice_workflow::service::{ActionRequest, InvoiceService};
use invoice_workflow::workflow::{Action, Department, compute_transition, map_role_to_state};
use ui::Printer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = WorkflowConfig::load(cli.config.as_deref())?;
    if let Some(ledger) = cli.ledger {
        config.ledger_path = ledger;
    }
    init_logging(&config.log_level, cli.verbose);

    let printer = Printer::default();
    let open_service = || -> Result<InvoiceService> {
        let ledger = Ledger::load(&config.ledger_path)?.with_default_note(&config.default_note);
        Ok(InvoiceService::new(ledger).persisting_to(&config.ledger_path))
    };

    match cli.command {
        Command::Transition {
            state,
            action,
            return_state,
        } => {
            let result = compute_transition(state, action, return_state)?;
            printer.transition(state, action, &result);
        }
        Command::Role { tag } => match map_role_to_state(&tag) {
            Some(state) => println!("  {tag} → {state}"),
            None => println!("  {tag} is not a second-stage role; invoices go to RUTA_2"),
        },
        Command::Submit {
            number,
            provider,
            provider_name,
            issued_on,
            amount,
            concept,
            approver,
            files,
            support,
            actor,
        } => {
            let actor = actor.to_actor(config.require_payment_evidence);
            let documents = files
                .into_iter()
                .map(|f| NewDocument::new(DocumentKind::Invoice, f))
                .chain(support.into_iter().map(|f| NewDocument::new(DocumentKind::Support, f)))
                .collect();
            let new = NewInvoice {
                number,
                provider_nit: provider,
                provider_name,
                issued_on,
                amount_cents: parse_amount(&amount)?,
                concept,
                approver_role_tag: approver,
                documents,
            };
            let invoice = open_service()?.submit(new, &actor).await?;
            printer.invoice(&invoice);
        }
        Command::Process {
            id,
            action,
            note,
            actor,
        } => {
            let service = open_service()?;
            let entry = service
                .process(ActionRequest {
                    invoice_id: id,
                    action,
                    actor: actor.to_actor(config.require_payment_evidence),
                    note,
                })
                .await?;
            printer.history(&[entry]);
            printer.invoice(&service.invoice(id).await?);
        }
        Command::Amend {
            id,
            number,
            provider,
            provider_name,
            issued_on,
            amount,
            concept,
            actor,
        } => {
            let actor = actor.to_actor(config.require_payment_evidence);
            let changes = InvoiceAmendment {
                number,
                provider_nit: provider,
                provider_name,
                issued_on,
                amount_cents: amount.as_deref().map(parse_amount).transpose()?,
                concept,
            };
            let service = open_service()?;
            let entry = service.amend(id, changes, &actor).await?;
            printer.history(&[entry]);
            printer.invoice(&service.invoice(id).await?);
        }
        Command::RemoveDoc {
            id,
            document_id,
            actor,
        } => {
            let actor = actor.to_actor(config.require_payment_evidence);
            let removed = open_service()?
                .remove_document(id, document_id, &actor)
                .await?;
            println!("  removed {} {} ({})", removed.kind, removed.display_name, removed.id);
        }
        Command::Attach {
            id,
            kind,
            file,
            note,
            actor,
        } => {
            let actor = actor.to_actor(config.require_payment_evidence);
            let document = NewDocument {
                kind,
                file_name: file,
                display_name: None,
                note,
            };
            let attached = open_service()?.attach(id, document, &actor).await?;
            println!("  attached {} {} ({})", attached.kind, attached.display_name, attached.id);
        }
        Command::History { id } => {
            let service = open_service()?;
            printer.invoice(&service.invoice(id).await?);
            printer.history(&service.history(id).await?);
        }
        Command::List { filter, actor } => {
            let actor = actor.to_actor(config.require_payment_evidence);
            let service = open_service()?;
            let invoices = service.working_list(&actor, &filter.to_filter()).await;
            printer.heading(&format!(
                "{} invoices, {} pending for {}",
                invoices.len(),
                service.pending_count(&actor).await,
                actor.name
            ));
            for invoice in &invoices {
                printer.invoice(invoice);
            }
        }
        Command::Search { filter, actor } => {
            let actor = actor.to_actor(config.require_payment_evidence);
            let found = open_service()?.search(&actor, &filter.to_filter()).await?;
            printer.heading(&format!("{} invoices found", found.len()));
            for invoice in &found {
                printer.invoice(invoice);
            }
        }
        Command::Stats => {
            let stats = open_service()?.stats().await;
            println!(
                "  {} invoices, {} finalized, {} annulled",
                stats.total, stats.finalized, stats.annulled
            );
        }
        Command::Delete { id, actor } => {
            let actor = actor.to_actor(config.require_payment_evidence);
            let deleted = open_service()?.delete(id, &actor).await?;
            println!("  deleted {} {}", deleted.number, deleted.provider_nit);
        }
        Command::Demo => run_demo(&printer, &config).await?,
    }

    Ok(())
}

/// Walk one invoice through a rejection, a correction and full approval
/// against an in-memory ledger.
async fn run_demo(printer: &Printer, config: &WorkflowConfig) -> Result<()> {
    let service = InvoiceService::new(Ledger::new().with_default_note(&config.default_note));

    let originator = Actor::new("Ana (cuentas por pagar)", vec![Role::Originator]);
    let medical = Actor::new(
        "Dirección Médica",
        vec![Role::DepartmentApprover(Department::MedicalDirection)],
    );
    let accountant = Actor::new("Contabilidad", vec![Role::Accounting]);
    let treasurer =
        Actor::new("Tesorería", vec![Role::Treasury]).with_payment_evidence_required();

    let invoice = service
        .submit(
            NewInvoice {
                number: "FE-2231".into(),
                provider_nit: "900123456-1".into(),
                provider_name: Some("Laboratorios Andinos".into()),
                issued_on: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap_or_default(),
                amount_cents: parse_amount("4.250.000")?,
                concept: Some("Reactivos de laboratorio".into()),
                approver_role_tag: Some(Department::MedicalDirection.role_tag().into()),
                documents: vec![NewDocument::new(DocumentKind::Invoice, "FE-2231.pdf")],
            },
            &originator,
        )
        .await?;
    printer.heading("Loaded");
    printer.invoice(&invoice);

    let steps: [(Action, &Actor, Option<&str>); 6] = [
        (Action::Reject, &medical, Some("Falta orden de compra")),
        (Action::Correct, &originator, Some("Orden de compra adjunta")),
        (Action::Approve, &medical, None),
        (Action::Approve, &accountant, Some("Causada")),
        (Action::Pay, &treasurer, None),
        (Action::Annul, &originator, None),
    ];

    printer.heading("Processing");
    for (action, actor, note) in steps {
        if action == Action::Pay {
            // First attempt is refused until the evidence is on file.
            if let Err(err) = service.process(request(invoice.id, action, actor, note)).await {
                printer.refused(&err);
            }
            service
                .attach(
                    invoice.id,
                    NewDocument::new(DocumentKind::PaymentEvidence, "transferencia.pdf"),
                    actor,
                )
                .await?;
        }
        match service.process(request(invoice.id, action, actor, note)).await {
            Ok(entry) => printer.history(&[entry]),
            Err(err) => printer.refused(&err),
        }
    }

    printer.heading("History");
    printer.history(&service.history(invoice.id).await?);
    Ok(())
}

fn request(invoice_id: uuid::Uuid, action: Action, actor: &Actor, note: Option<&str>) -> ActionRequest {
    ActionRequest {
        invoice_id,
        action,
        actor: actor.clone(),
        note: note.map(str::to_string),
    }
}
