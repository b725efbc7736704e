//! Command-line interface built on clap.
//!
//! Defines [`Cli`] with its [`Command`] subcommands and the global flags
//! (--config, --ledger, --verbose).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use invoice_workflow::documents::DocumentKind;
use invoice_workflow::permissions::{Actor, Role};
use invoice_workflow::search::InvoiceFilter;
use invoice_workflow::workflow::{Action, WorkflowState};

/// Approval workflow for clinic supplier invoices.
#[derive(Debug, Parser)]
#[command(name = "invoice-workflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./invoice-workflow.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger file, overriding the configured one.
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Who is acting. Without `--actor-id` the id is derived from the name, so
/// the same name maps to the same user across runs.
#[derive(Debug, Clone, Args)]
pub struct ActorArgs {
    /// Name of the acting user.
    #[arg(long = "as", value_name = "NAME")]
    pub name: String,

    /// Explicit user id.
    #[arg(long)]
    pub actor_id: Option<Uuid>,

    /// Role codes held by the user (RUTA_1, RUTA_3, SUPER_ADMIN, ...). Repeatable.
    #[arg(long = "role", value_name = "ROLE")]
    pub roles: Vec<Role>,

    /// The user must attach payment evidence before paying.
    #[arg(long, default_value_t = false)]
    pub requires_payment_evidence: bool,
}

impl ActorArgs {
    pub fn to_actor(&self, require_payment_evidence: bool) -> Actor {
        Actor {
            id: self
                .actor_id
                .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, self.name.as_bytes())),
            name: self.name.clone(),
            roles: self.roles.clone(),
            requires_payment_evidence: self.requires_payment_evidence || require_payment_evidence,
        }
    }
}

/// Filters shared by `list` and `search`. Text filters match substrings,
/// ignoring case.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Invoice number or provider name.
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long)]
    pub number: Option<String>,
    /// Provider NIT.
    #[arg(long)]
    pub nit: Option<String>,
    #[arg(long)]
    pub provider_name: Option<String>,
    /// Name of the user who loaded the invoice.
    #[arg(long)]
    pub uploaded_by: Option<String>,
    /// State code.
    #[arg(long)]
    pub state: Option<WorkflowState>,
    /// Loaded on or after this day (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Loaded on or before this day (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// Only amounts above two million.
    #[arg(long, default_value_t = false)]
    pub large: bool,
    #[arg(long)]
    pub limit: Option<usize>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> InvoiceFilter {
        InvoiceFilter {
            text: self.text.clone(),
            number: self.number.clone(),
            provider_nit: self.nit.clone(),
            provider_name: self.provider_name.clone(),
            uploaded_by: self.uploaded_by.clone(),
            state: self.state,
            loaded_from: self.from,
            loaded_to: self.to,
            large_amounts_only: self.large,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute a transition without touching any invoice.
    Transition {
        /// Current state code (RUTA_1, RUTA_2_DIRECCION_MEDICA, RUTA_4, ...).
        state: WorkflowState,
        /// Action code or name (APROBAR / approve, RECHAZAR / reject, ...).
        action: Action,
        /// Stored return state, used by corrections.
        #[arg(long)]
        return_state: Option<WorkflowState>,
    },

    /// Show the second-stage state an approver role tag maps to.
    Role {
        tag: String,
    },

    /// Load a new invoice.
    Submit {
        #[arg(long)]
        number: String,
        /// Provider NIT.
        #[arg(long)]
        provider: String,
        #[arg(long)]
        provider_name: Option<String>,
        /// Issue date (YYYY-MM-DD).
        #[arg(long)]
        issued_on: NaiveDate,
        /// Amount, e.g. 150000 or 1.500,50.
        #[arg(long)]
        amount: String,
        #[arg(long)]
        concept: Option<String>,
        /// Second-stage approver role tag.
        #[arg(long)]
        approver: Option<String>,
        /// Invoice files (FACTURA). At least one.
        #[arg(long = "file", required = true)]
        files: Vec<String>,
        /// Additional support files loaded with the invoice.
        #[arg(long = "support")]
        support: Vec<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Approve, reject, correct, annul or pay an invoice.
    Process {
        id: Uuid,
        action: Action,
        #[arg(long)]
        note: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Edit the data of an invoice returned for correction.
    Amend {
        id: Uuid,
        #[arg(long)]
        number: Option<String>,
        /// Provider NIT.
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        provider_name: Option<String>,
        #[arg(long)]
        issued_on: Option<NaiveDate>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        concept: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Attach a document to an existing invoice.
    Attach {
        id: Uuid,
        kind: DocumentKind,
        file: String,
        #[arg(long)]
        note: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Remove a document from an invoice.
    RemoveDoc {
        id: Uuid,
        document_id: Uuid,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Print an invoice's history.
    History {
        id: Uuid,
    },

    /// List the invoices in a user's working list.
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Search the whole archive (SUPER_ADMIN, BUSQUEDA_FACTURAS).
    Search {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Count invoices, finalized and annulled.
    Stats,

    /// Delete an invoice with its documents and history (SUPER_ADMIN).
    Delete {
        id: Uuid,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Walk a sample invoice through approval, rejection and correction.
    Demo,
}
