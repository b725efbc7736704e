//! Filters shared by working lists and the archive search, plus ledger-wide
//! counts.
//!
//! Text filters are case-insensitive substring matches.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::invoice::Invoice;
use crate::workflow::WorkflowState;

/// Two million pesos, in cents. The search can be limited to invoices above it.
pub const LARGE_AMOUNT_CENTS: u64 = 200_000_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    /// Matches the invoice number or the provider name.
    pub text: Option<String>,
    pub number: Option<String>,
    pub provider_nit: Option<String>,
    pub provider_name: Option<String>,
    /// Name of the user who loaded the invoice.
    pub uploaded_by: Option<String>,
    pub state: Option<WorkflowState>,
    /// First day of the load-date range, inclusive.
    pub loaded_from: Option<NaiveDate>,
    /// Last day of the load-date range, inclusive.
    pub loaded_to: Option<NaiveDate>,
    #[serde(default)]
    pub large_amounts_only: bool,
    pub limit: Option<usize>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        let provider_name = invoice.provider_name.as_deref().unwrap_or_default();
        let loaded_on = invoice.created_at.date_naive();

        self.text
            .as_deref()
            .is_none_or(|t| contains(&invoice.number, t) || contains(provider_name, t))
            && self.number.as_deref().is_none_or(|n| contains(&invoice.number, n))
            && self
                .provider_nit
                .as_deref()
                .is_none_or(|n| contains(&invoice.provider_nit, n))
            && self
                .provider_name
                .as_deref()
                .is_none_or(|n| contains(provider_name, n))
            && self
                .uploaded_by
                .as_deref()
                .is_none_or(|u| contains(&invoice.created_by_name, u))
            && self.state.is_none_or(|s| s == invoice.current_state)
            && self.loaded_from.is_none_or(|day| loaded_on >= day)
            && self.loaded_to.is_none_or(|day| loaded_on <= day)
            && (!self.large_amounts_only || invoice.amount_cents > LARGE_AMOUNT_CENTS)
    }

    /// Keep the first `limit` entries, if a limit is set.
    pub(crate) fn truncate<T>(&self, items: &mut Vec<T>) {
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(&needle.trim().to_lowercase())
}

/// Ledger-wide counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub total: usize,
    pub finalized: usize,
    pub annulled: usize,
}

impl InvoiceStats {
    pub fn collect<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> Self {
        invoices.into_iter().fold(Self::default(), |mut stats, invoice| {
            stats.total += 1;
            if invoice.current_state == WorkflowState::Finalized {
                stats.finalized += 1;
            }
            if invoice.is_annulled {
                stats.annulled += 1;
            }
            stats
        })
    }
}
