//! Walks one report and one advance through their full lifecycle against a
//! throwaway database, logging every step.
//!
//! cargo run --example workflow [config.json]

use expense_workflow::{
    Actor, Role, Session, TransitionRequest, WorkflowService,
    advance::{AdvanceDraft, AdvanceReason},
    config::{self, WorkflowConfig},
    expense::{ExpenseDraft, ExpenseType, PaymentMethod},
    report::ReportDraft,
};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => config::load_config(&PathBuf::from(path))?,
        None => WorkflowConfig {
            temporary: true,
            ..WorkflowConfig::default()
        },
    };
    let service = WorkflowService::new(config::open_repository(&config)?)
        .with_policy(config.transition_policy);

    let operator = Session::new(Actor::from_email("op-1", "ana.lima@acme.com.br", Role::Operador));
    let finance = Session::new(Actor::from_email("fin-1", "bruno@acme.com.br", Role::Financeiro));
    let admin = Session::new(Actor::from_email("adm-1", "carla@acme.com.br", Role::Administrador));

    // advance ahead of the trip
    let advance = service.create_advance(
        AdvanceDraft::new()
            .set_name("Visita cliente Campinas")
            .set_amount("500,00")
            .set_period("2024-06-14", "2024-06-16")
            .set_reason(AdvanceReason::VisitaCliente),
        &operator,
    )?;
    service.submit_advance(&advance.id, TransitionRequest::new(""), &operator)?;
    service.send_advance_to_analysis(&advance.id, TransitionRequest::new(""), &finance)?;
    service.approve_advance(&advance.id, TransitionRequest::new("dentro da política"), &finance)?;
    service.approve_advance_payment(&advance.id, TransitionRequest::new(""), &finance)?;
    let advance = service.mark_advance_as_paid(&advance.id, TransitionRequest::new("PIX"), &admin)?;

    // expenses incurred on the trip
    let lunch = service.create_expense(
        ExpenseDraft::new()
            .set_amount("100")
            .set_type(ExpenseType::Alimentacao)
            .set_date("15/06/2024")
            .set_payment_method(PaymentMethod::CartaoCorporativo),
        &operator,
    )?;
    let mileage = service.create_expense(
        ExpenseDraft::new()
            .set_amount("250.50")
            .set_type(ExpenseType::Quilometragem)
            .set_date("2024-06-15")
            .set_payment_method(PaymentMethod::CartaoPessoal)
            .set_observations("Origem: São Paulo\nDestino: Campinas\nKM: 96"),
        &operator,
    )?;

    let report = service.create_report(
        ReportDraft::new()
            .set_name("Prestação de contas Campinas")
            .set_advance(&advance.id)
            .add_expense(&lunch.id)
            .add_expense(&mileage.id),
        &operator,
    )?;

    service.send_report_to_analysis(&report.id, TransitionRequest::new(""), &finance)?;
    service.approve_report(&report.id, TransitionRequest::new("ok").notify(true), &finance)?;
    service.release_report_for_payment(&report.id, TransitionRequest::new(""), &finance)?;
    service.confirm_report_payment(&report.id, TransitionRequest::new("reembolso efetuado"), &admin)?;

    let details = service.load_details(&report.id, &operator)?;
    println!(
        "{} [{}] total {} over {} expenses",
        details.report.name,
        details.report.status(),
        details.report.total_amount,
        details.expenses.len()
    );
    for entry in details.report.status_history().entries() {
        println!(
            "  {} {} by {} {}",
            entry.date_string(),
            entry.status,
            entry.changed_by.as_deref().unwrap_or("-"),
            entry.observations
        );
    }
    for (expense_type, subtotal) in service.dashboard_subtotals(&finance)? {
        println!("  {expense_type}: {subtotal}");
    }

    Ok(())
}
