//! Advances (funding requested ahead of expenses) and their status machine.
//!
//! Linear progression, with REJEITADO reachable from every review step:
//! PENDENTE -> APROVACAO -> ANALISE_CONTABIL -> APROVADO -> PAGAMENTO_APROVADO
//! -> PAGAMENTO_EFETUADO -> FINALIZADO
use crate::access::Action;
use crate::audit::StatusHistory;
use crate::error::{ValidationError, WorkflowError};
use crate::repository::{Collection, Document};
use crate::session::Actor;
use crate::types::{Amount, Date, TimeStamp, coded_enum};
use chrono::Utc;

coded_enum! {
    pub enum AdvanceStatus {
        Pendente = (0, "PENDENTE"),
        Aprovacao = (1, "APROVACAO"),
        AnaliseContabil = (2, "ANALISE_CONTABIL"),
        Aprovado = (3, "APROVADO"),
        PagamentoAprovado = (4, "PAGAMENTO_APROVADO"),
        PagamentoEfetuado = (5, "PAGAMENTO_EFETUADO"),
        Finalizado = (6, "FINALIZADO"),
        Rejeitado = (7, "REJEITADO"),
    }
}

impl AdvanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AdvanceStatus::Finalizado | AdvanceStatus::Rejeitado)
    }
}

coded_enum! {
    pub enum AdvanceReason {
        Viagem = (0, "VIAGEM"),
        Evento = (1, "EVENTO"),
        Treinamento = (2, "TREINAMENTO"),
        VisitaCliente = (3, "VISITA_CLIENTE"),
        Outros = (4, "OUTROS"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceAction {
    Submit,
    SendToAnalysis,
    Approve,
    ApprovePayment,
    MarkAsPaid,
    Finalize,
    Reject,
}

impl AdvanceAction {
    pub fn sources(&self) -> &'static [AdvanceStatus] {
        use AdvanceStatus::*;
        match self {
            AdvanceAction::Submit => &[Pendente],
            AdvanceAction::SendToAnalysis => &[Aprovacao],
            AdvanceAction::Approve => &[AnaliseContabil],
            AdvanceAction::ApprovePayment => &[Aprovado],
            AdvanceAction::MarkAsPaid => &[PagamentoAprovado],
            AdvanceAction::Finalize => &[PagamentoEfetuado],
            AdvanceAction::Reject => &[Aprovacao, AnaliseContabil, Aprovado, PagamentoAprovado],
        }
    }

    pub fn target(&self) -> AdvanceStatus {
        match self {
            AdvanceAction::Submit => AdvanceStatus::Aprovacao,
            AdvanceAction::SendToAnalysis => AdvanceStatus::AnaliseContabil,
            AdvanceAction::Approve => AdvanceStatus::Aprovado,
            AdvanceAction::ApprovePayment => AdvanceStatus::PagamentoAprovado,
            AdvanceAction::MarkAsPaid => AdvanceStatus::PagamentoEfetuado,
            AdvanceAction::Finalize => AdvanceStatus::Finalizado,
            AdvanceAction::Reject => AdvanceStatus::Rejeitado,
        }
    }

    pub fn capability(&self) -> Action {
        match self {
            AdvanceAction::Submit => Action::SubmitAdvance,
            AdvanceAction::SendToAnalysis => Action::SendAdvanceToAnalysis,
            AdvanceAction::Approve => Action::ApproveAdvance,
            AdvanceAction::ApprovePayment => Action::ApproveAdvancePayment,
            AdvanceAction::MarkAsPaid => Action::MarkAdvancePaid,
            AdvanceAction::Finalize => Action::FinalizeAdvance,
            AdvanceAction::Reject => Action::RejectAdvance,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            AdvanceAction::Submit => "submit advance",
            AdvanceAction::SendToAnalysis => "send advance to analysis",
            AdvanceAction::Approve => "approve advance",
            AdvanceAction::ApprovePayment => "approve advance payment",
            AdvanceAction::MarkAsPaid => "mark advance as paid",
            AdvanceAction::Finalize => "finalize advance",
            AdvanceAction::Reject => "reject advance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Advance {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub amount: Amount,
    #[n(3)]
    pub period_start: Date,
    #[n(4)]
    pub period_end: Date,
    #[n(5)]
    pub reason: AdvanceReason,
    #[n(6)]
    pub project_id: Option<String>,
    #[n(7)]
    pub report_id: Option<String>, // the report that reconciles it
    #[n(8)]
    pub observations: String,
    #[n(9)]
    pub created_by: String,
    #[n(10)]
    pub created_by_name: String,
    #[n(11)]
    status: AdvanceStatus,
    #[n(12)]
    status_history: StatusHistory<AdvanceStatus>,
    #[n(13)]
    pub created_at: TimeStamp<Utc>,
    #[n(14)]
    pub version: u64,
}

impl Advance {
    pub fn status(&self) -> AdvanceStatus {
        self.status
    }
    pub fn status_history(&self) -> &StatusHistory<AdvanceStatus> {
        &self.status_history
    }

    /// Next state for `action`. Source statuses are always enforced, so
    /// repeating an action fails instead of appending a duplicate entry.
    /// The history entry is the only attribution an advance carries.
    pub fn transitioned(
        &self,
        action: AdvanceAction,
        observations: &str,
        actor: &Actor,
    ) -> Result<Advance, WorkflowError> {
        if !action.sources().contains(&self.status) {
            return Err(WorkflowError::InvalidState {
                action: action.verb(),
                current: self.status.code(),
            });
        }

        let mut next = self.clone();
        next.status = action.target();
        next.status_history
            .append(next.status, Some(actor.display_name.clone()), observations);
        Ok(next)
    }
}

impl Document for Advance {
    const COLLECTION: Collection = Collection::Advances;

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
        if !self.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount);
        }
        if self.period_end < self.period_start {
            return Err(ValidationError::InvertedPeriod);
        }
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

#[derive(Debug, Clone, Default)]
pub struct AdvanceDraft {
    name: Option<String>,
    amount: Option<String>,
    period_start: Option<String>,
    period_end: Option<String>,
    reason: Option<AdvanceReason>,
    project_id: Option<String>,
    observations: String,
}

impl AdvanceDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn set_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }
    pub fn set_period(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.period_start = Some(start.into());
        self.period_end = Some(end.into());
        self
    }
    pub fn set_reason(mut self, reason: AdvanceReason) -> Self {
        self.reason = Some(reason);
        self
    }
    pub fn set_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
    pub fn set_observations(mut self, observations: impl Into<String>) -> Self {
        self.observations = observations.into();
        self
    }

    /// The only way an advance comes into existence: PENDENTE, empty history.
    pub fn finalise(self, id: String, creator: &Actor) -> Result<Advance, ValidationError> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or(ValidationError::MissingField("name"))?;
        let amount: Amount = self
            .amount
            .as_deref()
            .ok_or(ValidationError::MissingField("amount"))?
            .parse()?;
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount);
        }
        let period_start: Date = self
            .period_start
            .as_deref()
            .ok_or(ValidationError::MissingField("periodStart"))?
            .parse()?;
        let period_end: Date = self
            .period_end
            .as_deref()
            .ok_or(ValidationError::MissingField("periodEnd"))?
            .parse()?;
        if period_end < period_start {
            return Err(ValidationError::InvertedPeriod);
        }
        let reason = self.reason.ok_or(ValidationError::MissingField("reason"))?;

        Ok(Advance {
            id,
            name: name.trim().to_string(),
            amount,
            period_start,
            period_end,
            reason,
            project_id: self.project_id,
            report_id: None,
            observations: self.observations,
            created_by: creator.uid.clone(),
            created_by_name: creator.display_name.clone(),
            status: AdvanceStatus::Pendente,
            status_history: StatusHistory::new(),
            created_at: TimeStamp::new(),
            version: 0,
        })
    }
}
