//! Service layer API for expense, report and advance workflow operations
use crate::access::{self, Action};
use crate::advance::{Advance, AdvanceAction, AdvanceDraft};
use crate::aggregate;
use crate::config::TransitionPolicy;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::expense::{Expense, ExpenseDraft, ExpenseType};
use crate::notify::{NoopNotifier, Notifier, TransitionEvent};
use crate::report::{ExpenseReport, ReportAction, ReportDetails, ReportDraft, ReportStatus};
use crate::repository::{Document, Repository};
use crate::session::Session;
use crate::types::Amount;
use crate::utils::{self, ADVANCE_HRP, EXPENSE_HRP, REPORT_HRP};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Observations and the notification flag that accompany every transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    pub observations: String,
    pub notify: bool,
}

impl TransitionRequest {
    pub fn new(observations: impl Into<String>) -> Self {
        Self {
            observations: observations.into(),
            notify: false,
        }
    }
    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }
}

// documents linked to a report that is still being created
#[derive(Default)]
struct ClaimedMembers {
    expenses: Vec<Expense>,
    advance: Option<Advance>,
}

pub struct WorkflowService<R: Repository> {
    repository: R,
    policy: TransitionPolicy,
    notifier: Box<dyn Notifier>,
}

impl<R: Repository> WorkflowService<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            policy: TransitionPolicy::default(),
            notifier: Box::new(NoopNotifier),
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Writes the full next state, logging lost races.
    fn write<D: Document>(&self, doc: &mut D) -> Result<()> {
        self.repository.update(doc).inspect_err(|err| {
            if let WorkflowError::Conflict { collection, id } = err {
                warn!(%collection, %id, "concurrent modification, write rejected");
            }
        })
    }

    // runs after the write; notifiers only enqueue, see `Notifier`
    fn dispatch(&self, notify: bool, event: TransitionEvent) {
        if !notify {
            return;
        }
        if let Err(err) = self.notifier.notify(&event) {
            warn!(entity_id = %event.entity_id, status = event.status, error = %err, "notification failed");
        }
    }

    fn sees_everything(session: &Session) -> bool {
        session.role().is_finance()
    }

    // EXPENSES

    #[instrument(skip_all, fields(actor = %session.uid()))]
    pub fn create_expense(&self, draft: ExpenseDraft, session: &Session) -> Result<Expense> {
        access::authorize(session, Action::CreateExpense, session.uid())?;

        let expense = draft.finalise(utils::new_document_id(EXPENSE_HRP)?, session.uid())?;
        self.repository.create(&expense)?;

        info!(expense_id = %expense.id, amount = %expense.amount, "expense created");
        Ok(expense)
    }

    /// Replaces the editable fields of an expense. Report membership, creator
    /// and creation time are kept.
    #[instrument(skip(self, draft, session), fields(actor = %session.uid()))]
    pub fn update_expense(
        &self,
        expense_id: &str,
        draft: ExpenseDraft,
        session: &Session,
    ) -> Result<Expense> {
        access::authorize_role(session, Action::EditExpense)?;
        let current: Expense = self.repository.get_required(expense_id)?;
        access::authorize(session, Action::EditExpense, &current.created_by)?;
        let report = self.pending_report_of(&current, "edit expense")?;

        let mut next = draft.finalise(current.id.clone(), &current.created_by)?;
        next.report_id = current.report_id.clone();
        next.created_at = current.created_at.clone();
        next.version = current.version;
        self.write(&mut next)?;

        if let Some(report) = report {
            self.store_recomputed_total(report)?;
        }
        info!(expense_id, amount = %next.amount, "expense updated");
        Ok(next)
    }

    #[instrument(skip(self, session), fields(actor = %session.uid()))]
    pub fn delete_expense(&self, expense_id: &str, session: &Session) -> Result<()> {
        access::authorize_role(session, Action::DeleteExpense)?;
        let current: Expense = self.repository.get_required(expense_id)?;
        access::authorize(session, Action::DeleteExpense, &current.created_by)?;
        let report = self.pending_report_of(&current, "delete expense")?;

        self.repository.delete(&current)?;
        if let Some(report) = report {
            self.store_recomputed_total(report)?;
        }
        info!(expense_id, "expense deleted");
        Ok(())
    }

    pub fn list_expenses(&self, session: &Session) -> Result<Vec<Expense>> {
        if Self::sees_everything(session) {
            return self.repository.query(|_: &Expense| true);
        }
        self.repository
            .query(|e: &Expense| e.created_by == session.uid())
    }

    /// Per-type subtotals over the expenses visible to the actor.
    pub fn dashboard_subtotals(&self, session: &Session) -> Result<BTreeMap<ExpenseType, Amount>> {
        let expenses = self.list_expenses(session)?;
        Ok(aggregate::subtotals_by_type(&expenses)?)
    }

    // the report an attached expense belongs to, provided it is still editable
    fn pending_report_of(&self, expense: &Expense, action: &'static str) -> Result<Option<ExpenseReport>> {
        let Some(report_id) = expense.report_id.as_deref() else {
            return Ok(None);
        };
        let report: ExpenseReport = self.repository.get_required(report_id)?;
        if report.status() != ReportStatus::Pendente {
            return Err(WorkflowError::InvalidState {
                action,
                current: report.status().code(),
            });
        }
        Ok(Some(report))
    }

    // REPORTS

    /// Creates a PENDENTE report over the selected expenses. The total is the
    /// sum over that selection. The expenses and the optional advance are
    /// linked first and the report is stored last, so a failed call stores
    /// nothing.
    #[instrument(skip_all, fields(actor = %session.uid()))]
    pub fn create_report(&self, draft: ReportDraft, session: &Session) -> Result<ExpenseReport> {
        access::authorize(session, Action::CreateReport, session.uid())?;
        draft.validate()?;

        let mut seen = HashSet::new();
        let mut expenses = vec![];
        for expense_id in draft.expense_ids() {
            if !seen.insert(expense_id.as_str()) {
                continue;
            }
            let expense: Expense = self.repository.get_required(expense_id)?;
            access::authorize(session, Action::EditExpense, &expense.created_by)?;
            if expense.report_id.is_some() {
                return Err(ValidationError::ExpenseAlreadyAttached(expense.id).into());
            }
            expenses.push(expense);
        }

        let advance = match draft.advance_id() {
            Some(advance_id) => {
                let advance: Advance = self.repository.get_required(advance_id)?;
                access::authorize(session, Action::EditAdvance, &advance.created_by)?;
                if advance.report_id.is_some() {
                    return Err(ValidationError::AdvanceAlreadyLinked(advance.id).into());
                }
                Some(advance)
            }
            None => None,
        };

        let total = aggregate::total_amount(&expenses)?;
        let report = draft.finalise(utils::new_document_id(REPORT_HRP)?, &session.actor, total)?;

        // members are claimed before the report exists; on any failure the
        // claims made so far are released and no report is stored
        let mut claimed = ClaimedMembers::default();
        let outcome = self
            .claim_members(&report.id, expenses, advance, &mut claimed)
            .and_then(|()| self.repository.create(&report));
        if let Err(err) = outcome {
            warn!(report_id = %report.id, error = %err, "report creation failed, releasing members");
            self.release_members(claimed);
            return Err(err);
        }

        info!(report_id = %report.id, total = %report.total_amount, "report created");
        Ok(report)
    }

    fn claim_members(
        &self,
        report_id: &str,
        expenses: Vec<Expense>,
        advance: Option<Advance>,
        claimed: &mut ClaimedMembers,
    ) -> Result<()> {
        for mut expense in expenses {
            expense.report_id = Some(report_id.to_string());
            self.write(&mut expense)?;
            claimed.expenses.push(expense);
        }
        if let Some(mut advance) = advance {
            advance.report_id = Some(report_id.to_string());
            self.write(&mut advance)?;
            claimed.advance = Some(advance);
        }
        Ok(())
    }

    // the original error is what the caller sees; failed releases are only logged
    fn release_members(&self, claimed: ClaimedMembers) {
        for mut expense in claimed.expenses {
            expense.report_id = None;
            if let Err(err) = self.write(&mut expense) {
                warn!(expense_id = %expense.id, error = %err, "failed to release expense");
            }
        }
        if let Some(mut advance) = claimed.advance {
            advance.report_id = None;
            if let Err(err) = self.write(&mut advance) {
                warn!(advance_id = %advance.id, error = %err, "failed to release advance");
            }
        }
    }

    /// The report with its authoritative expense set, re-queried from the
    /// expenses collection, and a total recomputed from that set.
    #[instrument(skip(self, session), fields(actor = %session.uid()))]
    pub fn load_details(&self, report_id: &str, session: &Session) -> Result<ReportDetails> {
        let mut report: ExpenseReport = self.repository.get_required(report_id)?;
        access::authorize(session, Action::ViewEntity, &report.created_by)?;

        let expenses = self.expenses_of(report_id)?;
        let live_total = aggregate::total_amount(&expenses)?;
        if live_total != report.total_amount {
            debug!(report_id, stored = %report.total_amount, live = %live_total, "stored total is stale");
        }
        report.total_amount = live_total;

        Ok(ReportDetails { report, expenses })
    }

    pub fn list_reports(&self, session: &Session) -> Result<Vec<ExpenseReport>> {
        if Self::sees_everything(session) {
            return self.repository.query(|_: &ExpenseReport| true);
        }
        self.repository
            .query(|r: &ExpenseReport| r.created_by == session.uid())
    }

    #[instrument(skip(self, session), fields(actor = %session.uid()))]
    pub fn attach_expense(
        &self,
        report_id: &str,
        expense_id: &str,
        session: &Session,
    ) -> Result<ReportDetails> {
        let report = self.editable_report(report_id, session, "attach expense")?;
        let mut expense: Expense = self.repository.get_required(expense_id)?;
        access::authorize(session, Action::EditExpense, &expense.created_by)?;
        if expense.report_id.is_some() {
            return Err(ValidationError::ExpenseAlreadyAttached(expense.id).into());
        }

        expense.report_id = Some(report.id.clone());
        self.write(&mut expense)?;

        info!(report_id, expense_id, "expense attached");
        self.store_recomputed_total(report)
    }

    #[instrument(skip(self, session), fields(actor = %session.uid()))]
    pub fn detach_expense(
        &self,
        report_id: &str,
        expense_id: &str,
        session: &Session,
    ) -> Result<ReportDetails> {
        let report = self.editable_report(report_id, session, "detach expense")?;
        let mut expense: Expense = self.repository.get_required(expense_id)?;
        if expense.report_id.as_deref() != Some(report_id) {
            return Err(ValidationError::ExpenseNotInReport(expense.id).into());
        }

        expense.report_id = None;
        self.write(&mut expense)?;

        info!(report_id, expense_id, "expense detached");
        self.store_recomputed_total(report)
    }

    fn editable_report(
        &self,
        report_id: &str,
        session: &Session,
        action: &'static str,
    ) -> Result<ExpenseReport> {
        access::authorize_role(session, Action::EditReport)?;
        let report: ExpenseReport = self.repository.get_required(report_id)?;
        access::authorize(session, Action::EditReport, &report.created_by)?;
        if report.status() != ReportStatus::Pendente {
            return Err(WorkflowError::InvalidState {
                action,
                current: report.status().code(),
            });
        }
        Ok(report)
    }

    fn expenses_of(&self, report_id: &str) -> Result<Vec<Expense>> {
        self.repository
            .query(|e: &Expense| e.report_id.as_deref() == Some(report_id))
    }

    // persists the total derived from the live expense set after a membership change
    fn store_recomputed_total(&self, mut report: ExpenseReport) -> Result<ReportDetails> {
        let expenses = self.expenses_of(&report.id)?;
        let total = aggregate::total_amount(&expenses)?;
        if total != report.total_amount {
            report.total_amount = total;
            self.write(&mut report)?;
            debug!(report_id = %report.id, total = %total, "report total updated");
        }
        Ok(ReportDetails { report, expenses })
    }

    fn transition_report(
        &self,
        report_id: &str,
        action: ReportAction,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<ExpenseReport> {
        // role first, so unauthorised actors never reach the store
        access::authorize_role(session, action.capability())?;
        let current: ExpenseReport = self.repository.get_required(report_id)?;
        access::authorize(session, action.capability(), &current.created_by)?;

        let mut next =
            current.transitioned(action, &request.observations, &session.actor, self.policy)?;
        self.write(&mut next)?;

        info!(
            report_id,
            from = %current.status(),
            to = %next.status(),
            actor = %session.uid(),
            "report transitioned"
        );
        self.dispatch(
            request.notify,
            TransitionEvent {
                collection: ExpenseReport::COLLECTION,
                entity_id: next.id.clone(),
                owner_id: next.created_by.clone(),
                status: next.status().code(),
                changed_by: session.actor.display_name.clone(),
                observations: request.observations,
            },
        );
        Ok(next)
    }

    /// PENDENTE -> ANALISE_CONTABIL
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn send_report_to_analysis(
        &self,
        report_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<ExpenseReport> {
        self.transition_report(report_id, ReportAction::SendToAnalysis, request, session)
    }

    /// ANALISE_CONTABIL -> FINANCEIRO_APROVADO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn approve_report(
        &self,
        report_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<ExpenseReport> {
        self.transition_report(report_id, ReportAction::Approve, request, session)
    }

    /// ANALISE_CONTABIL -> REJEITADO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn reject_report(
        &self,
        report_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<ExpenseReport> {
        self.transition_report(report_id, ReportAction::Reject, request, session)
    }

    /// FINANCEIRO_APROVADO -> APROVADO_PARA_PAGAMENTO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn release_report_for_payment(
        &self,
        report_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<ExpenseReport> {
        self.transition_report(report_id, ReportAction::ReleaseForPayment, request, session)
    }

    /// APROVADO_PARA_PAGAMENTO -> PAGAMENTO_EFETUADO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn confirm_report_payment(
        &self,
        report_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<ExpenseReport> {
        self.transition_report(report_id, ReportAction::ConfirmPayment, request, session)
    }

    /// APROVADO_PARA_PAGAMENTO -> REJEITADO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn reject_report_payment(
        &self,
        report_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<ExpenseReport> {
        self.transition_report(report_id, ReportAction::RejectPayment, request, session)
    }

    // ADVANCES

    #[instrument(skip_all, fields(actor = %session.uid()))]
    pub fn create_advance(&self, draft: AdvanceDraft, session: &Session) -> Result<Advance> {
        access::authorize(session, Action::CreateAdvance, session.uid())?;

        let advance = draft.finalise(utils::new_document_id(ADVANCE_HRP)?, &session.actor)?;
        self.repository.create(&advance)?;

        info!(advance_id = %advance.id, amount = %advance.amount, "advance created");
        Ok(advance)
    }

    pub fn get_advance(&self, advance_id: &str, session: &Session) -> Result<Advance> {
        let advance: Advance = self.repository.get_required(advance_id)?;
        access::authorize(session, Action::ViewEntity, &advance.created_by)?;
        Ok(advance)
    }

    pub fn list_advances(&self, session: &Session) -> Result<Vec<Advance>> {
        if Self::sees_everything(session) {
            return self.repository.query(|_: &Advance| true);
        }
        self.repository
            .query(|a: &Advance| a.created_by == session.uid())
    }

    fn transition_advance(
        &self,
        advance_id: &str,
        action: AdvanceAction,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        access::authorize_role(session, action.capability())?;
        let current: Advance = self.repository.get_required(advance_id)?;
        access::authorize(session, action.capability(), &current.created_by)?;

        let mut next = current.transitioned(action, &request.observations, &session.actor)?;
        self.write(&mut next)?;

        info!(
            advance_id,
            from = %current.status(),
            to = %next.status(),
            actor = %session.uid(),
            "advance transitioned"
        );
        self.dispatch(
            request.notify,
            TransitionEvent {
                collection: Advance::COLLECTION,
                entity_id: next.id.clone(),
                owner_id: next.created_by.clone(),
                status: next.status().code(),
                changed_by: session.actor.display_name.clone(),
                observations: request.observations,
            },
        );
        Ok(next)
    }

    /// PENDENTE -> APROVACAO, by the owner
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn submit_advance(
        &self,
        advance_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        self.transition_advance(advance_id, AdvanceAction::Submit, request, session)
    }

    /// APROVACAO -> ANALISE_CONTABIL
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn send_advance_to_analysis(
        &self,
        advance_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        self.transition_advance(advance_id, AdvanceAction::SendToAnalysis, request, session)
    }

    /// ANALISE_CONTABIL -> APROVADO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn approve_advance(
        &self,
        advance_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        self.transition_advance(advance_id, AdvanceAction::Approve, request, session)
    }

    /// APROVADO -> PAGAMENTO_APROVADO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn approve_advance_payment(
        &self,
        advance_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        self.transition_advance(advance_id, AdvanceAction::ApprovePayment, request, session)
    }

    /// PAGAMENTO_APROVADO -> PAGAMENTO_EFETUADO. Never by the advance's creator.
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn mark_advance_as_paid(
        &self,
        advance_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        self.transition_advance(advance_id, AdvanceAction::MarkAsPaid, request, session)
    }

    /// PAGAMENTO_EFETUADO -> FINALIZADO
    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn finalize_advance(
        &self,
        advance_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        self.transition_advance(advance_id, AdvanceAction::Finalize, request, session)
    }

    #[instrument(skip(self, request, session), fields(actor = %session.uid()))]
    pub fn reject_advance(
        &self,
        advance_id: &str,
        request: TransitionRequest,
        session: &Session,
    ) -> Result<Advance> {
        self.transition_advance(advance_id, AdvanceAction::Reject, request, session)
    }
}
