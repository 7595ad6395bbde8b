//! Role-gated action dispatcher.
//!
//! [`can_perform`] is the single source of truth for who may do what. Services
//! call [`authorize`] before they start any read-modify-write sequence.
use crate::error::{Result, WorkflowError};
use crate::session::{Role, Session};
use std::fmt;

/// Every capability an actor can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ViewEntity,
    CreateExpense,
    EditExpense,
    DeleteExpense,
    CreateReport,
    EditReport,
    CreateAdvance,
    EditAdvance,
    SubmitAdvance,
    SendReportToAnalysis,
    ApproveReport,
    RejectReport,
    ReleaseReportForPayment,
    ConfirmReportPayment,
    RejectReportPayment,
    SendAdvanceToAnalysis,
    ApproveAdvance,
    ApproveAdvancePayment,
    MarkAdvancePaid,
    FinalizeAdvance,
    RejectAdvance,
    ChangeRole,
}

impl Action {
    pub fn code(&self) -> &'static str {
        match self {
            Action::ViewEntity => "entity:view",
            Action::CreateExpense => "expense:create",
            Action::EditExpense => "expense:edit",
            Action::DeleteExpense => "expense:delete",
            Action::CreateReport => "report:create",
            Action::EditReport => "report:edit",
            Action::CreateAdvance => "advance:create",
            Action::EditAdvance => "advance:edit",
            Action::SubmitAdvance => "advance:submit",
            Action::SendReportToAnalysis => "report:send-to-analysis",
            Action::ApproveReport => "report:approve",
            Action::RejectReport => "report:reject",
            Action::ReleaseReportForPayment => "report:release-for-payment",
            Action::ConfirmReportPayment => "report:confirm-payment",
            Action::RejectReportPayment => "report:reject-payment",
            Action::SendAdvanceToAnalysis => "advance:send-to-analysis",
            Action::ApproveAdvance => "advance:approve",
            Action::ApproveAdvancePayment => "advance:approve-payment",
            Action::MarkAdvancePaid => "advance:mark-paid",
            Action::FinalizeAdvance => "advance:finalize",
            Action::RejectAdvance => "advance:reject",
            Action::ChangeRole => "user:change-role",
        }
    }

    /// Review and settlement actions, reserved to finance actors.
    pub fn is_review(&self) -> bool {
        matches!(
            self,
            Action::SendReportToAnalysis
                | Action::ApproveReport
                | Action::RejectReport
                | Action::ReleaseReportForPayment
                | Action::ConfirmReportPayment
                | Action::RejectReportPayment
                | Action::SendAdvanceToAnalysis
                | Action::ApproveAdvance
                | Action::ApproveAdvancePayment
                | Action::MarkAdvancePaid
                | Action::FinalizeAdvance
                | Action::RejectAdvance
        )
    }

    /// Actions an owner performs on their own documents.
    pub fn is_authoring(&self) -> bool {
        matches!(
            self,
            Action::CreateExpense
                | Action::EditExpense
                | Action::DeleteExpense
                | Action::CreateReport
                | Action::EditReport
                | Action::CreateAdvance
                | Action::EditAdvance
                | Action::SubmitAdvance
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Decides whether `actor_id` holding `role` may perform `action` on an entity
/// owned by `owner_id`. For `ChangeRole` the owner is the user whose role changes.
pub fn can_perform(role: Role, action: Action, owner_id: &str, actor_id: &str) -> bool {
    let own = owner_id == actor_id;

    // refinements that hold for every role, administrators included
    match action {
        Action::ChangeRole => return role == Role::Administrador && !own,
        Action::MarkAdvancePaid if own => return false,
        _ => {}
    }

    match role {
        Role::Administrador => true,
        Role::Financeiro => action.is_review() || action == Action::ViewEntity || (action.is_authoring() && own),
        Role::Operador => (action.is_authoring() || action == Action::ViewEntity) && own,
        Role::Aprovador => action == Action::ViewEntity && own,
    }
}

/// Whether `role` could perform `action` on some entity, ignoring ownership.
/// Used to fail fast before the entity is even read.
pub fn role_permits(role: Role, action: Action) -> bool {
    match action {
        Action::ChangeRole => role == Role::Administrador,
        _ if action.is_review() => role.is_finance(),
        Action::ViewEntity => true,
        _ => role != Role::Aprovador,
    }
}

/// [`can_perform`] as a `Result`, naming the missing capability.
pub fn authorize(session: &Session, action: Action, owner_id: &str) -> Result<()> {
    if can_perform(session.role(), action, owner_id, session.uid()) {
        return Ok(());
    }
    tracing::warn!(
        actor = %session.uid(),
        role = %session.role(),
        capability = %action,
        owner = %owner_id,
        "permission denied"
    );
    Err(WorkflowError::Permission {
        actor: session.uid().to_string(),
        capability: action,
    })
}

/// [`role_permits`] as a `Result`.
pub fn authorize_role(session: &Session, action: Action) -> Result<()> {
    if role_permits(session.role(), action) {
        return Ok(());
    }
    tracing::warn!(
        actor = %session.uid(),
        role = %session.role(),
        capability = %action,
        "permission denied"
    );
    Err(WorkflowError::Permission {
        actor: session.uid().to_string(),
        capability: action,
    })
}
