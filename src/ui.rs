//! Terminal output with `console` styling.

use console::Style;

use invoice_workflow::error::WorkflowError;
use invoice_workflow::invoice::{HistoryEntry, Invoice};
use invoice_workflow::workflow::{Action, TransitionResult, WorkflowState};

/// Colored printer for invoices, transitions and failures.
pub struct Printer {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for Printer {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Printer {
    pub fn transition(&self, from: WorkflowState, action: Action, result: &TransitionResult) {
        let arrow = if result.is_rejection {
            self.yellow.apply_to("↩")
        } else {
            self.green.apply_to("→")
        };
        println!("  {from} {arrow} {} ({action})", result.next_state);
        if let Some(rejected_from) = result.rejected_from {
            println!(
                "  {} return state set to {rejected_from}",
                self.dim.apply_to("·")
            );
        }
    }

    pub fn refused(&self, err: &WorkflowError) {
        println!(
            "  {} {err} {}",
            self.red.apply_to("✗"),
            self.dim.apply_to(format!("[{}]", err.kind()))
        );
    }

    pub fn invoice(&self, invoice: &Invoice) {
        let state = if invoice.current_state.is_terminal() {
            self.dim.apply_to(invoice.current_state.to_string())
        } else {
            self.green.apply_to(invoice.current_state.to_string())
        };
        println!(
            "  {} {} {} {} {}",
            self.dim.apply_to(invoice.id),
            invoice.number,
            invoice.provider_nit,
            format_amount(invoice.amount_cents),
            state
        );
        if let Some(ret) = invoice.return_state {
            println!("    {} returned by {ret}", self.yellow.apply_to("↩"));
        }
    }

    pub fn history(&self, entries: &[HistoryEntry]) {
        for entry in entries {
            let from = entry
                .from
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let marker = if entry.is_rejection {
                self.yellow.apply_to("↩")
            } else {
                self.green.apply_to("•")
            };
            println!(
                "  {marker} {} {} {from} → {} by {}: {}",
                self.dim.apply_to(entry.at.format("%Y-%m-%d %H:%M")),
                entry.activity,
                entry.to,
                entry.actor_name,
                entry.note
            );
        }
    }

    pub fn heading(&self, text: &str) {
        println!();
        println!("{}", self.green.apply_to(format!("─── {text} ───")));
    }
}

pub fn format_amount(cents: u64) -> String {
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("${grouped},{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_use_thousand_dots() {
        assert_eq!(format_amount(15_000_000), "$150.000,00");
        assert_eq!(format_amount(150_050), "$1.500,50");
        assert_eq!(format_amount(7), "$0,07");
    }
}
