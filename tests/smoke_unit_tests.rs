//! Smoke Screen Unit tests for expense workflow components
//!
//! These tests span the public API, exercising each building block in
//! isolation from the service scenarios. They are intended as a smoke screen
//! and mostly test the happy path.
//!

use expense_workflow::{
    Actor, Role, Session,
    access::{Action, can_perform},
    config::{TransitionPolicy, WorkflowConfig, load_config, open_repository},
    expense::{ExpenseDraft, ExpenseType, PaymentMethod, parse_legacy_observations},
    report::{ReportAction, ReportStatus},
    types::{Amount, Date},
    utils::{REPORT_HRP, new_document_id},
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Ids carry the entity prefix and are unique across calls
    #[test]
    fn generates_prefixed_unique_ids() {
        let first = new_document_id(REPORT_HRP).unwrap();
        let second = new_document_id(REPORT_HRP).unwrap();

        assert!(first.starts_with("report_1"));
        assert_ne!(first, second);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn amounts_accept_both_decimal_separators() {
        assert_eq!("350.50".parse::<Amount>().unwrap(), Amount::from_cents(35_050));
        assert_eq!("350,50".parse::<Amount>().unwrap(), Amount::from_cents(35_050));
        assert_eq!("R$ 1.234,56".parse::<Amount>().unwrap(), Amount::from_cents(123_456));
        assert!("12.345".parse::<Amount>().is_err());
        assert!("abc".parse::<Amount>().is_err());
    }

    #[test]
    fn amounts_display_with_two_decimals() {
        assert_eq!(Amount::from_cents(35_050).to_string(), "350.50");
        assert_eq!(Amount::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn dates_accept_iso_and_day_first() {
        let iso: Date = "2024-06-15".parse().unwrap();
        let day_first: Date = "15/06/2024".parse().unwrap();
        assert_eq!(iso, day_first);
        assert_eq!(iso.to_string(), "2024-06-15");
        assert!("2024-13-01".parse::<Date>().is_err());
    }

    #[test]
    fn codes_parse_case_insensitively() {
        assert_eq!("financeiro_aprovado".parse::<ReportStatus>().unwrap(), ReportStatus::FinanceiroAprovado);
        assert_eq!("PIX".parse::<PaymentMethod>().unwrap(), PaymentMethod::Pix);
        assert_eq!(ExpenseType::Pedagio.to_string(), "PEDAGIO");
        assert!("GASOLINA".parse::<ExpenseType>().is_err());
    }
}

// ACCESS MODULE TESTS
#[cfg(test)]
mod access_tests {
    use super::*;

    #[test]
    fn finance_roles_review_any_report() {
        for role in [Role::Administrador, Role::Financeiro] {
            assert!(can_perform(role, Action::ApproveReport, "op-1", "fin-1"));
            assert!(can_perform(role, Action::RejectReportPayment, "op-1", "fin-1"));
        }
        assert!(!can_perform(Role::Operador, Action::ApproveReport, "op-1", "op-1"));
        assert!(!can_perform(Role::Aprovador, Action::ApproveReport, "op-1", "apr-1"));
    }

    #[test]
    fn operators_author_only_their_own_documents() {
        assert!(can_perform(Role::Operador, Action::EditExpense, "op-1", "op-1"));
        assert!(!can_perform(Role::Operador, Action::EditExpense, "op-2", "op-1"));
        assert!(!can_perform(Role::Operador, Action::ViewEntity, "op-2", "op-1"));
    }

    #[test]
    fn nobody_pays_or_promotes_themselves() {
        assert!(!can_perform(Role::Administrador, Action::MarkAdvancePaid, "adm-1", "adm-1"));
        assert!(can_perform(Role::Administrador, Action::MarkAdvancePaid, "op-1", "adm-1"));
        assert!(!can_perform(Role::Administrador, Action::ChangeRole, "adm-1", "adm-1"));
        assert!(can_perform(Role::Administrador, Action::ChangeRole, "op-1", "adm-1"));
        assert!(!can_perform(Role::Financeiro, Action::ChangeRole, "op-1", "fin-1"));
    }

    #[test]
    fn report_actions_map_to_capabilities() {
        assert_eq!(ReportAction::Approve.capability(), Action::ApproveReport);
        assert_eq!(ReportAction::RejectPayment.capability(), Action::RejectReportPayment);
        assert_eq!(ReportAction::Approve.target(), ReportStatus::FinanceiroAprovado);
    }
}

// SESSION MODULE TESTS
#[cfg(test)]
mod session_tests {
    use super::*;

    #[test]
    fn session_exposes_actor_identity() {
        let session = Session::new(Actor::from_email("u-9", "maria.souza@acme.com.br", Role::Financeiro));
        assert_eq!(session.uid(), "u-9");
        assert_eq!(session.role(), Role::Financeiro);
        assert_eq!(session.actor.display_name, "maria.souza");
    }
}

// EXPENSE MODULE TESTS
#[cfg(test)]
mod expense_tests {
    use super::*;

    #[test]
    fn draft_lifts_mileage_out_of_observations() {
        let expense = ExpenseDraft::new()
            .set_amount("84,00")
            .set_type(ExpenseType::Quilometragem)
            .set_date("2024-06-15")
            .set_payment_method(PaymentMethod::CartaoPessoal)
            .set_observations("Origem: São Paulo\nDestino: Campinas\nKM: 96\nvisita técnica")
            .finalise("expense_1".into(), "op-1")
            .unwrap();

        let mileage = expense.mileage.unwrap();
        assert_eq!(mileage.origin, "São Paulo");
        assert_eq!(mileage.destination, "Campinas");
        assert_eq!(mileage.distance_km, 96.0);
        assert_eq!(expense.observations, "visita técnica");
        assert!(expense.report_id.is_none());
    }

    #[test]
    fn plain_observations_are_left_alone() {
        let parsed = parse_legacy_observations("almoço com cliente").unwrap();
        assert!(parsed.mileage.is_none());
        assert!(parsed.lodging.is_none());
        assert_eq!(parsed.remaining, "almoço com cliente");
    }

    #[test]
    fn draft_without_amount_is_rejected() {
        let result = ExpenseDraft::new()
            .set_date("2024-06-15")
            .set_payment_method(PaymentMethod::Dinheiro)
            .finalise("expense_1".into(), "op-1");
        assert!(result.is_err());
    }
}

// CONFIG MODULE TESTS
#[cfg(test)]
mod config_tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn temporary_repository_opens_from_config() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("workflow.json");
        std::fs::write(
            &path,
            format!(
                r#"{{ "database_path": "{}", "temporary": true }}"#,
                temp_dir.path().join("db").display()
            ),
        )?;

        let config = load_config(&path)?;
        assert!(config.temporary);
        assert_eq!(config.transition_policy, TransitionPolicy::Strict);
        assert_ne!(config, WorkflowConfig::default());

        open_repository(&config)?;
        Ok(())
    }
}
