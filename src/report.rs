//! Expense reports and their status machine.
//!
//! ```text
//! PENDENTE -> ANALISE_CONTABIL -> FINANCEIRO_APROVADO -> APROVADO_PARA_PAGAMENTO -> PAGAMENTO_EFETUADO
//!                      |                                          |
//!                      +--------------> REJEITADO <---------------+
//! ```
use crate::access::Action;
use crate::audit::StatusHistory;
use crate::config::TransitionPolicy;
use crate::error::{ValidationError, WorkflowError};
use crate::expense::Expense;
use crate::repository::{Collection, Document};
use crate::session::Actor;
use crate::types::{Amount, Date, TimeStamp, coded_enum};
use chrono::Utc;

coded_enum! {
    pub enum ReportStatus {
        Pendente = (0, "PENDENTE"),
        AnaliseContabil = (1, "ANALISE_CONTABIL"),
        FinanceiroAprovado = (2, "FINANCEIRO_APROVADO"),
        AprovadoParaPagamento = (3, "APROVADO_PARA_PAGAMENTO"),
        PagamentoEfetuado = (4, "PAGAMENTO_EFETUADO"),
        Rejeitado = (5, "REJEITADO"),
    }
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Rejeitado | ReportStatus::PagamentoEfetuado)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportAction {
    SendToAnalysis,
    Approve,
    Reject,
    ReleaseForPayment,
    ConfirmPayment,
    RejectPayment,
}

impl ReportAction {
    /// Statuses the action may start from.
    pub fn sources(&self) -> &'static [ReportStatus] {
        use ReportStatus::*;
        match self {
            ReportAction::SendToAnalysis => &[Pendente],
            ReportAction::Approve | ReportAction::Reject => &[AnaliseContabil],
            ReportAction::ReleaseForPayment => &[FinanceiroAprovado],
            // finance-approved reports are already eligible for settlement
            ReportAction::ConfirmPayment | ReportAction::RejectPayment => {
                &[FinanceiroAprovado, AprovadoParaPagamento]
            }
        }
    }

    pub fn target(&self) -> ReportStatus {
        match self {
            ReportAction::SendToAnalysis => ReportStatus::AnaliseContabil,
            ReportAction::Approve => ReportStatus::FinanceiroAprovado,
            ReportAction::Reject | ReportAction::RejectPayment => ReportStatus::Rejeitado,
            ReportAction::ReleaseForPayment => ReportStatus::AprovadoParaPagamento,
            ReportAction::ConfirmPayment => ReportStatus::PagamentoEfetuado,
        }
    }

    pub fn capability(&self) -> Action {
        match self {
            ReportAction::SendToAnalysis => Action::SendReportToAnalysis,
            ReportAction::Approve => Action::ApproveReport,
            ReportAction::Reject => Action::RejectReport,
            ReportAction::ReleaseForPayment => Action::ReleaseReportForPayment,
            ReportAction::ConfirmPayment => Action::ConfirmReportPayment,
            ReportAction::RejectPayment => Action::RejectReportPayment,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            ReportAction::SendToAnalysis => "send report to analysis",
            ReportAction::Approve => "approve report",
            ReportAction::Reject => "reject report",
            ReportAction::ReleaseForPayment => "release report for payment",
            ReportAction::ConfirmPayment => "confirm report payment",
            ReportAction::RejectPayment => "reject report payment",
        }
    }

    // the four review decisions that legacy mode leaves unguarded
    fn is_review_decision(&self) -> bool {
        matches!(
            self,
            ReportAction::Approve
                | ReportAction::Reject
                | ReportAction::ConfirmPayment
                | ReportAction::RejectPayment
        )
    }
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct ExpenseReport {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub project_id: Option<String>,
    #[n(3)]
    pub advance_id: Option<String>,
    #[n(4)]
    pub observations: String,
    #[n(5)]
    status: ReportStatus,
    #[n(6)]
    pub total_amount: Amount,
    #[n(7)]
    pub date: Date,
    #[n(8)]
    pub created_by: String,
    #[n(9)]
    pub created_by_name: String,
    #[n(10)]
    pub approval_observations: String,
    #[n(11)]
    pub approver_observations: String,
    #[n(12)]
    pub approved_by_user_id: Option<String>,
    #[n(13)]
    pub approved_by_name: Option<String>,
    #[n(14)]
    status_history: StatusHistory<ReportStatus>,
    #[n(15)]
    pub created_at: TimeStamp<Utc>,
    #[n(16)]
    pub document_ref: Option<String>, // generated PDF, opaque
    #[n(17)]
    pub version: u64,
}

impl ExpenseReport {
    pub fn status(&self) -> ReportStatus {
        self.status
    }
    pub fn status_history(&self) -> &StatusHistory<ReportStatus> {
        &self.status_history
    }

    /// Builds the complete next state for `action`. `self` is left untouched;
    /// the caller writes the returned report as one update.
    pub fn transitioned(
        &self,
        action: ReportAction,
        observations: &str,
        actor: &Actor,
        policy: TransitionPolicy,
    ) -> Result<ExpenseReport, WorkflowError> {
        let guarded = policy == TransitionPolicy::Strict || !action.is_review_decision();
        if guarded && !action.sources().contains(&self.status) {
            return Err(WorkflowError::InvalidState {
                action: action.verb(),
                current: self.status.code(),
            });
        }

        let mut next = self.clone();
        let status = action.target();
        next.status = status;

        match action {
            ReportAction::Approve => {
                next.approval_observations = observations.to_string();
                next.approver_observations.clear();
                next.approved_by_user_id = Some(actor.uid.clone());
                next.approved_by_name = Some(actor.display_name.clone());
            }
            ReportAction::Reject => {
                next.approver_observations = observations.to_string();
                next.approval_observations.clear();
                next.approved_by_user_id = Some(actor.uid.clone());
                next.approved_by_name = Some(actor.display_name.clone());
            }
            // payment confirmation does not stamp the approver
            ReportAction::ConfirmPayment => {
                next.approval_observations = observations.to_string();
            }
            ReportAction::RejectPayment => {
                next.approver_observations = observations.to_string();
                next.approval_observations.clear();
            }
            ReportAction::SendToAnalysis | ReportAction::ReleaseForPayment => {}
        }

        next.status_history
            .append(status, Some(actor.display_name.clone()), observations);
        Ok(next)
    }
}

impl Document for ExpenseReport {
    const COLLECTION: Collection = Collection::ExpenseReports;

    fn id(&self) -> &str {
        &self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn check(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.total_amount < Amount::ZERO {
            return Err(ValidationError::InvalidAmount(self.total_amount.to_string()));
        }
        // status and history are always written together
        if let Some(last) = self.status_history.last()
            && last.status != self.status
        {
            return Err(ValidationError::InvalidDetail {
                field: "status",
                value: self.status.code().to_string(),
            });
        }
        Ok(())
    }
}

/// A report as shown on its detail page: the live expense set and a total
/// recomputed from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDetails {
    pub report: ExpenseReport,
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportDraft {
    name: Option<String>,
    project_id: Option<String>,
    advance_id: Option<String>,
    observations: String,
    date: Option<String>,
    expense_ids: Vec<String>,
}

impl ReportDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn set_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
    pub fn set_advance(mut self, advance_id: impl Into<String>) -> Self {
        self.advance_id = Some(advance_id.into());
        self
    }
    pub fn set_observations(mut self, observations: impl Into<String>) -> Self {
        self.observations = observations.into();
        self
    }
    pub fn set_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
    pub fn add_expense(mut self, expense_id: impl Into<String>) -> Self {
        self.expense_ids.push(expense_id.into());
        self
    }

    pub fn expense_ids(&self) -> &[String] {
        &self.expense_ids
    }
    pub fn advance_id(&self) -> Option<&str> {
        self.advance_id.as_deref()
    }

    /// Checks the fields that need no store access.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(ValidationError::MissingField("name")),
        }
        if self.expense_ids.is_empty() {
            return Err(ValidationError::EmptyReport);
        }
        if let Some(date) = &self.date {
            date.parse::<Date>()?;
        }
        Ok(())
    }

    /// Produces a PENDENTE report with an empty history. `total_amount` is the
    /// sum over the selected expenses at creation time.
    pub fn finalise(
        self,
        id: String,
        creator: &Actor,
        total_amount: Amount,
    ) -> Result<ExpenseReport, ValidationError> {
        self.validate()?;
        let date = match self.date.as_deref() {
            Some(raw) => raw.parse()?,
            None => Date::today(),
        };

        Ok(ExpenseReport {
            id,
            name: self.name.unwrap_or_default().trim().to_string(),
            project_id: self.project_id,
            advance_id: self.advance_id,
            observations: self.observations,
            status: ReportStatus::Pendente,
            total_amount,
            date,
            created_by: creator.uid.clone(),
            created_by_name: creator.display_name.clone(),
            approval_observations: String::new(),
            approver_observations: String::new(),
            approved_by_user_id: None,
            approved_by_name: None,
            status_history: StatusHistory::new(),
            created_at: TimeStamp::new(),
            document_ref: None,
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn finance() -> Actor {
        Actor::new("fin", "bruno", Role::Financeiro)
    }

    fn report() -> ExpenseReport {
        ReportDraft::new()
            .set_name("Viagem Campinas")
            .set_date("2024-06-15")
            .add_expense("expense_1")
            .finalise(
                "report_1".into(),
                &Actor::new("op", "ana", Role::Operador),
                Amount::from_cents(35_050),
            )
            .unwrap()
    }

    fn walk(report: &ExpenseReport, actions: &[ReportAction]) -> ExpenseReport {
        actions.iter().fold(report.clone(), |r, a| {
            r.transitioned(*a, "", &finance(), TransitionPolicy::Strict)
                .unwrap()
        })
    }

    #[test]
    fn new_reports_are_pending_with_empty_history() {
        let report = report();
        assert_eq!(report.status(), ReportStatus::Pendente);
        assert!(report.status_history().is_empty());
        assert_eq!(report.created_by, "op");
        assert!(report.check().is_ok());
    }

    #[test]
    fn draft_validation() {
        assert_eq!(
            ReportDraft::new().add_expense("e").validate(),
            Err(ValidationError::MissingField("name"))
        );
        assert_eq!(
            ReportDraft::new().set_name("x").validate(),
            Err(ValidationError::EmptyReport)
        );
        assert!(matches!(
            ReportDraft::new().set_name("x").add_expense("e").set_date("32/13/2024").validate(),
            Err(ValidationError::InvalidDate(_))
        ));
    }

    #[test]
    fn approve_sets_approval_fields_and_appends_history() {
        let analysed = walk(&report(), &[ReportAction::SendToAnalysis]);
        let approved = analysed
            .transitioned(ReportAction::Approve, "ok", &finance(), TransitionPolicy::Strict)
            .unwrap();

        assert_eq!(approved.status(), ReportStatus::FinanceiroAprovado);
        assert_eq!(approved.approval_observations, "ok");
        assert_eq!(approved.approver_observations, "");
        assert_eq!(approved.approved_by_user_id.as_deref(), Some("fin"));
        assert_eq!(approved.approved_by_name.as_deref(), Some("bruno"));
        assert_eq!(approved.status_history().len(), analysed.status_history().len() + 1);

        let entry = approved.status_history().last().unwrap();
        assert_eq!(entry.status, ReportStatus::FinanceiroAprovado);
        assert_eq!(entry.changed_by.as_deref(), Some("bruno"));
        assert_eq!(entry.observations, "ok");

        // the source report is untouched
        assert_eq!(analysed.status(), ReportStatus::AnaliseContabil);
    }

    #[test]
    fn reject_clears_approval_observations() {
        let analysed = walk(&report(), &[ReportAction::SendToAnalysis]);
        let rejected = analysed
            .transitioned(ReportAction::Reject, "sem nota", &finance(), TransitionPolicy::Strict)
            .unwrap();
        assert_eq!(rejected.status(), ReportStatus::Rejeitado);
        assert_eq!(rejected.approver_observations, "sem nota");
        assert_eq!(rejected.approval_observations, "");
    }

    #[test]
    fn confirm_payment_leaves_approver_identity_alone() {
        let released = walk(
            &report(),
            &[
                ReportAction::SendToAnalysis,
                ReportAction::Approve,
                ReportAction::ReleaseForPayment,
            ],
        );
        let other = Actor::new("adm", "carla", Role::Administrador);
        let paid = released
            .transitioned(ReportAction::ConfirmPayment, "pago", &other, TransitionPolicy::Strict)
            .unwrap();

        assert_eq!(paid.status(), ReportStatus::PagamentoEfetuado);
        assert_eq!(paid.approval_observations, "pago");
        assert_eq!(paid.approved_by_user_id.as_deref(), Some("fin"));
        assert!(paid.status().is_terminal());
    }

    #[test]
    fn strict_policy_rejects_out_of_order_transitions() {
        let pending = report();
        let err = pending
            .transitioned(ReportAction::Approve, "ok", &finance(), TransitionPolicy::Strict)
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState { current: "PENDENTE", .. }
        ));

        let approved = walk(&pending, &[ReportAction::SendToAnalysis, ReportAction::Approve]);
        assert!(approved
            .transitioned(ReportAction::Reject, "", &finance(), TransitionPolicy::Strict)
            .is_err());
    }

    #[test]
    fn legacy_policy_allows_reject_after_approve() {
        let approved = walk(&report(), &[ReportAction::SendToAnalysis, ReportAction::Approve]);
        let rejected = approved
            .transitioned(ReportAction::Reject, "", &finance(), TransitionPolicy::Legacy)
            .unwrap();
        assert_eq!(rejected.status(), ReportStatus::Rejeitado);

        // lifecycle steps outside the review decisions stay guarded
        assert!(rejected
            .transitioned(ReportAction::SendToAnalysis, "", &finance(), TransitionPolicy::Legacy)
            .is_err());
    }

    #[test]
    fn check_catches_status_written_without_history() {
        let mut report = walk(&report(), &[ReportAction::SendToAnalysis]);
        assert!(report.check().is_ok());
        report.status = ReportStatus::PagamentoEfetuado;
        assert!(report.check().is_err());
    }
}
