//! Role-based capability checks layered around the workflow engine.
//!
//! The engine decides whether an action is legal for a state; this module
//! decides whether a given user may ask for it, and which invoices a user
//! sees in their working list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::invoice::Invoice;
use crate::workflow::{Action, Department, LEGACY_SECOND_STAGE_TAG, WorkflowState};

/// Organizational roles a user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// Loads invoices and corrects the ones sent back.
    Originator,
    /// Legacy second-stage approver without a department.
    SecondStage,
    /// Second-stage approver for one department.
    DepartmentApprover(Department),
    Accounting,
    Treasury,
    SuperAdmin,
    /// Read access to the full invoice archive.
    InvoiceSearch,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Role::Originator,
        Role::SecondStage,
        Role::DepartmentApprover(Department::InternalControl),
        Role::DepartmentApprover(Department::MedicalDirection),
        Role::DepartmentApprover(Department::FinancialDirection),
        Role::DepartmentApprover(Department::AdministrativeDirection),
        Role::DepartmentApprover(Department::GeneralDirection),
        Role::Accounting,
        Role::Treasury,
        Role::SuperAdmin,
        Role::InvoiceSearch,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Role::Originator => "RUTA_1",
            Role::SecondStage => LEGACY_SECOND_STAGE_TAG,
            Role::DepartmentApprover(department) => department.role_tag(),
            Role::Accounting => "RUTA_3",
            Role::Treasury => "RUTA_4",
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::InvoiceSearch => "BUSQUEDA_FACTURAS",
        }
    }

    /// Approver tag for second-stage roles.
    pub fn second_stage_tag(self) -> Option<&'static str> {
        match self {
            Role::SecondStage | Role::DepartmentApprover(_) => Some(self.code()),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        Role::ALL
            .into_iter()
            .find(|role| role.code() == code)
            .ok_or_else(|| WorkflowError::UnknownRole(s.to_string()))
    }
}

impl TryFrom<String> for Role {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.code().to_string()
    }
}

/// The user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub roles: Vec<Role>,
    /// Treasury users flagged this way must attach payment evidence before paying.
    #[serde(default)]
    pub requires_payment_evidence: bool,
}

impl Actor {
    pub fn new(name: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            roles,
            requires_payment_evidence: false,
        }
    }

    pub fn with_payment_evidence_required(mut self) -> Self {
        self.requires_payment_evidence = true;
        self
    }

    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has(Role::SuperAdmin)
    }

    /// Archive search across every invoice, whatever its stage.
    pub fn can_search(&self) -> bool {
        self.is_super_admin() || self.has(Role::InvoiceSearch)
    }

    /// Whether the user reviews second-stage invoices routed to `approver_tag`.
    /// Untagged invoices are open to every second-stage approver.
    pub fn reviews_second_stage(&self, approver_tag: Option<&str>) -> bool {
        let mut tags = self.roles.iter().filter_map(|r| r.second_stage_tag());
        match approver_tag {
            Some(wanted) => tags.any(|tag| tag == wanted),
            None => tags.next().is_some(),
        }
    }

    /// Whether `invoice` is waiting on one of this user's approval stages.
    pub fn awaits_action_on(&self, invoice: &Invoice) -> bool {
        match invoice.current_state {
            s if s.is_second_stage() => {
                self.reviews_second_stage(invoice.approver_role_tag.as_deref())
            }
            WorkflowState::Stage3 => self.has(Role::Accounting),
            WorkflowState::Stage4 => self.has(Role::Treasury),
            _ => false,
        }
    }
}

/// Capability check consulted before an engine result is applied.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, actor: &Actor, invoice: &Invoice, action: Action) -> Result<()>;
}

/// Grants each stage's actions to the role that operates it.
///
/// Stage 1 belongs to the user who loaded the invoice. Super admins may act
/// anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn authorize(&self, actor: &Actor, invoice: &Invoice, action: Action) -> Result<()> {
        if actor.is_super_admin() {
            return Ok(());
        }

        let allowed = match invoice.current_state {
            WorkflowState::Stage1 => invoice.created_by == actor.id,
            _ => actor.awaits_action_on(invoice),
        };

        if allowed {
            Ok(())
        } else {
            Err(WorkflowError::PermissionDenied(format!(
                "{} cannot {action} an invoice in {}",
                actor.name, invoice.current_state
            )))
        }
    }
}

/// Whether `invoice` belongs in `actor`'s working list.
///
/// Creators always see their own invoices. Beyond that a user sees what is
/// waiting on their stages; finalized invoices only show up for super admins
/// and archive searchers.
pub fn is_visible_to(actor: &Actor, invoice: &Invoice) -> bool {
    if actor.can_search() {
        return true;
    }
    invoice.created_by == actor.id || actor.awaits_action_on(invoice)
}

/// Number of live invoices waiting on `actor`. Super admins get no count
/// since they see everything anyway.
pub fn pending_count<'a>(actor: &Actor, invoices: impl IntoIterator<Item = &'a Invoice>) -> usize {
    if actor.is_super_admin() {
        return 0;
    }
    invoices
        .into_iter()
        .filter(|invoice| !invoice.is_annulled && actor.awaits_action_on(invoice))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::test_support::invoice_in;

    fn medical() -> Actor {
        Actor::new("Dra. Medina", vec![Role::DepartmentApprover(Department::MedicalDirection)])
    }

    #[test]
    fn archive_search_roles() {
        assert!(Actor::new("Admin", vec![Role::SuperAdmin]).can_search());
        assert!(Actor::new("Archivo", vec![Role::InvoiceSearch]).can_search());
        assert!(!medical().can_search());
    }

    #[test]
    fn role_codes_parse() {
        assert_eq!("ruta_3".parse::<Role>().unwrap(), Role::Accounting);
        assert_eq!(
            "RUTA_2_DIRECCION_GENERAL".parse::<Role>().unwrap(),
            Role::DepartmentApprover(Department::GeneralDirection)
        );
        assert!(matches!(
            "CAJERO".parse::<Role>(),
            Err(WorkflowError::UnknownRole(_))
        ));
    }

    #[test]
    fn creator_acts_on_stage_one() {
        let creator = Actor::new("Ana", vec![Role::Originator]);
        let other = Actor::new("Luis", vec![Role::Originator]);
        let invoice = invoice_in(WorkflowState::Stage1, &creator);

        assert!(RoleAuthorizer.authorize(&creator, &invoice, Action::Annul).is_ok());
        let err = RoleAuthorizer
            .authorize(&other, &invoice, Action::Correct)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn department_approver_matches_tag() {
        let creator = Actor::new("Ana", vec![Role::Originator]);
        let mut invoice = invoice_in(
            WorkflowState::Stage2(Department::MedicalDirection),
            &creator,
        );
        invoice.approver_role_tag = Some("RUTA_2_DIRECCION_MEDICA".into());

        assert!(RoleAuthorizer.authorize(&medical(), &invoice, Action::Approve).is_ok());

        let financial = Actor::new(
            "Carlos",
            vec![Role::DepartmentApprover(Department::FinancialDirection)],
        );
        assert!(RoleAuthorizer.authorize(&financial, &invoice, Action::Approve).is_err());
    }

    #[test]
    fn untagged_second_stage_is_open_to_any_reviewer() {
        let creator = Actor::new("Ana", vec![Role::Originator]);
        let invoice = invoice_in(WorkflowState::Stage2Generic, &creator);
        assert!(RoleAuthorizer.authorize(&medical(), &invoice, Action::Reject).is_ok());
        assert!(RoleAuthorizer.authorize(&creator, &invoice, Action::Approve).is_err());
    }

    #[test]
    fn accounting_and_treasury_own_their_stages() {
        let creator = Actor::new("Ana", vec![Role::Originator]);
        let accountant = Actor::new("Contador", vec![Role::Accounting]);
        let treasurer = Actor::new("Tesorero", vec![Role::Treasury]);

        let stage3 = invoice_in(WorkflowState::Stage3, &creator);
        assert!(RoleAuthorizer.authorize(&accountant, &stage3, Action::Approve).is_ok());
        assert!(RoleAuthorizer.authorize(&treasurer, &stage3, Action::Approve).is_err());

        let stage4 = invoice_in(WorkflowState::Stage4, &creator);
        assert!(RoleAuthorizer.authorize(&treasurer, &stage4, Action::Pay).is_ok());
        assert!(RoleAuthorizer.authorize(&accountant, &stage4, Action::Pay).is_err());
    }

    #[test]
    fn super_admin_may_do_anything() {
        let creator = Actor::new("Ana", vec![Role::Originator]);
        let admin = Actor::new("Admin", vec![Role::SuperAdmin]);
        for state in [WorkflowState::Stage1, WorkflowState::Stage3, WorkflowState::Stage4] {
            let invoice = invoice_in(state, &creator);
            assert!(RoleAuthorizer.authorize(&admin, &invoice, Action::Approve).is_ok());
        }
    }

    #[test]
    fn visibility_follows_stage_ownership() {
        let creator = Actor::new("Ana", vec![Role::Originator]);
        let accountant = Actor::new("Contador", vec![Role::Accounting]);
        let searcher = Actor::new("Auditor", vec![Role::InvoiceSearch]);

        let stage3 = invoice_in(WorkflowState::Stage3, &creator);
        let finalized = invoice_in(WorkflowState::Finalized, &creator);

        assert!(is_visible_to(&creator, &stage3));
        assert!(is_visible_to(&accountant, &stage3));
        assert!(!is_visible_to(&accountant, &finalized));
        assert!(is_visible_to(&searcher, &finalized));
        assert!(!is_visible_to(&medical(), &stage3));
    }

    #[test]
    fn pending_count_skips_annulled_and_foreign_stages() {
        let creator = Actor::new("Ana", vec![Role::Originator]);
        let treasurer = Actor::new("Tesorero", vec![Role::Treasury]);
        let mut annulled = invoice_in(WorkflowState::Stage4, &creator);
        annulled.is_annulled = true;
        let invoices = vec![
            invoice_in(WorkflowState::Stage4, &creator),
            invoice_in(WorkflowState::Stage4, &creator),
            invoice_in(WorkflowState::Stage3, &creator),
            annulled,
        ];

        assert_eq!(pending_count(&treasurer, &invoices), 2);
        assert_eq!(pending_count(&creator, &invoices), 0);
        let admin = Actor::new("Admin", vec![Role::SuperAdmin, Role::Treasury]);
        assert_eq!(pending_count(&admin, &invoices), 0);
    }
}
