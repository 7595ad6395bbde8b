//! Expenses and their structured sub-fields
use crate::error::ValidationError;
use crate::repository::{Collection, Document};
use crate::types::{Amount, Date, TimeStamp, coded_enum};
use chrono::Utc;

coded_enum! {
    pub enum ExpenseType {
        Alimentacao = (0, "ALIMENTACAO"),
        Transporte = (1, "TRANSPORTE"),
        Hospedagem = (2, "HOSPEDAGEM"),
        Combustivel = (3, "COMBUSTIVEL"),
        Quilometragem = (4, "QUILOMETRAGEM"),
        Estacionamento = (5, "ESTACIONAMENTO"),
        Pedagio = (6, "PEDAGIO"),
        Outros = (7, "OUTROS"),
    }
}

coded_enum! {
    pub enum PaymentMethod {
        Dinheiro = (0, "DINHEIRO"),
        CartaoCorporativo = (1, "CARTAO_CORPORATIVO"),
        CartaoPessoal = (2, "CARTAO_PESSOAL"),
        Pix = (3, "PIX"),
        Transferencia = (4, "TRANSFERENCIA"),
    }
}

#[derive(Debug, Clone, PartialEq, Default, minicbor::Encode, minicbor::Decode)]
pub struct MileageDetails {
    #[n(0)]
    pub origin: String,
    #[n(1)]
    pub destination: String,
    #[n(2)]
    pub distance_km: f64,
    #[n(3)]
    pub rate_per_km: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, minicbor::Encode, minicbor::Decode)]
pub struct LodgingDetails {
    #[n(0)]
    pub hotel: String,
    #[n(1)]
    pub check_in: Option<Date>,
    #[n(2)]
    pub check_out: Option<Date>,
    #[n(3)]
    pub nights: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Expense {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub amount: Amount,
    #[n(2)]
    pub expense_type: Option<ExpenseType>,
    #[n(3)]
    pub date: Date,
    #[n(4)]
    pub payment_method: PaymentMethod,
    #[n(5)]
    pub reimbursable: bool,
    #[n(6)]
    pub project_id: Option<String>,
    #[n(7)]
    pub report_id: Option<String>, // at most one report at a time
    #[n(8)]
    pub observations: String,
    #[n(9)]
    pub mileage: Option<MileageDetails>,
    #[n(10)]
    pub lodging: Option<LodgingDetails>,
    #[n(11)]
    pub receipts: Vec<String>, // opaque URIs
    #[n(12)]
    pub attachments: Vec<String>,
    #[n(13)]
    pub created_by: String,
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
    #[n(15)]
    pub version: u64,
}

impl Document for Expense {
    const COLLECTION: Collection = Collection::Expenses;

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
        if self.created_by.is_empty() {
            return Err(ValidationError::MissingField("createdBy"));
        }
        Ok(())
    }
}

/// Input for creating or editing an expense. Raw text is validated on `finalise`.
#[derive(Debug, Clone)]
pub struct ExpenseDraft {
    amount: Option<String>,
    expense_type: Option<ExpenseType>,
    date: Option<String>,
    payment_method: Option<PaymentMethod>,
    reimbursable: bool,
    project_id: Option<String>,
    observations: String,
    mileage: Option<MileageDetails>,
    lodging: Option<LodgingDetails>,
    receipts: Vec<String>,
    attachments: Vec<String>,
}

impl Default for ExpenseDraft {
    fn default() -> Self {
        Self {
            amount: None,
            expense_type: None,
            date: None,
            payment_method: None,
            reimbursable: true,
            project_id: None,
            observations: String::new(),
            mileage: None,
            lodging: None,
            receipts: vec![],
            attachments: vec![],
        }
    }
}

impl ExpenseDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }
    pub fn set_type(mut self, expense_type: ExpenseType) -> Self {
        self.expense_type = Some(expense_type);
        self
    }
    pub fn set_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
    pub fn set_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }
    pub fn set_reimbursable(mut self, reimbursable: bool) -> Self {
        self.reimbursable = reimbursable;
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
    pub fn set_mileage(mut self, mileage: MileageDetails) -> Self {
        self.mileage = Some(mileage);
        self
    }
    pub fn set_lodging(mut self, lodging: LodgingDetails) -> Self {
        self.lodging = Some(lodging);
        self
    }
    pub fn add_receipt(mut self, uri: impl Into<String>) -> Self {
        self.receipts.push(uri.into());
        self
    }
    pub fn add_attachment(mut self, uri: impl Into<String>) -> Self {
        self.attachments.push(uri.into());
        self
    }

    /// Validates the draft and produces an unattached expense.
    pub fn finalise(self, id: String, created_by: &str) -> Result<Expense, ValidationError> {
        let amount: Amount = self
            .amount
            .as_deref()
            .ok_or(ValidationError::MissingField("amount"))?
            .parse()?;
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount);
        }
        let date: Date = self
            .date
            .as_deref()
            .ok_or(ValidationError::MissingField("date"))?
            .parse()?;
        let payment_method = self
            .payment_method
            .ok_or(ValidationError::MissingField("paymentMethod"))?;

        let legacy = parse_legacy_observations(&self.observations)?;

        Ok(Expense {
            id,
            amount,
            expense_type: self.expense_type,
            date,
            payment_method,
            reimbursable: self.reimbursable,
            project_id: self.project_id,
            report_id: None,
            observations: legacy.remaining,
            mileage: self.mileage.or(legacy.mileage),
            lodging: self.lodging.or(legacy.lodging),
            receipts: self.receipts,
            attachments: self.attachments,
            created_by: created_by.to_string(),
            created_at: TimeStamp::new(),
            version: 0,
        })
    }
}

/// Structured data recovered from labelled lines in free-text observations.
#[derive(Debug, Default, PartialEq)]
pub struct LegacyObservations {
    pub mileage: Option<MileageDetails>,
    pub lodging: Option<LodgingDetails>,
    pub remaining: String,
}

/// Lifts `Origem:`/`Destino:`/`KM:`/`Valor por km:` and
/// `Hotel:`/`Check-in:`/`Check-out:`/`Diárias:` lines out of observation text.
/// Runs once when an expense is written.
pub fn parse_legacy_observations(text: &str) -> Result<LegacyObservations, ValidationError> {
    let mut mileage = MileageDetails::default();
    let mut lodging = LodgingDetails::default();
    let (mut has_mileage, mut has_lodging) = (false, false);
    let mut remaining = vec![];

    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            remaining.push(line);
            continue;
        };
        let value = value.trim();
        match label.trim().to_lowercase().as_str() {
            "origem" => {
                mileage.origin = value.to_string();
                has_mileage = true;
            }
            "destino" => {
                mileage.destination = value.to_string();
                has_mileage = true;
            }
            "km" | "distância" | "distancia" => {
                mileage.distance_km = parse_decimal("distance", value)?;
                has_mileage = true;
            }
            "valor por km" | "valor/km" => {
                let rate = value.parse().map_err(|_| ValidationError::InvalidDetail {
                    field: "rate per km",
                    value: value.to_string(),
                })?;
                mileage.rate_per_km = Some(rate);
                has_mileage = true;
            }
            "hotel" => {
                lodging.hotel = value.to_string();
                has_lodging = true;
            }
            "check-in" | "checkin" => {
                lodging.check_in = Some(value.parse()?);
                has_lodging = true;
            }
            "check-out" | "checkout" => {
                lodging.check_out = Some(value.parse()?);
                has_lodging = true;
            }
            "diárias" | "diarias" => {
                let nights = value.parse().map_err(|_| ValidationError::InvalidDetail {
                    field: "number of nights",
                    value: value.to_string(),
                })?;
                lodging.nights = Some(nights);
                has_lodging = true;
            }
            _ => remaining.push(line),
        }
    }

    if lodging.nights.is_none()
        && let (Some(check_in), Some(check_out)) = (lodging.check_in, lodging.check_out)
    {
        let days = (check_out.as_naive() - check_in.as_naive()).num_days();
        if days < 0 {
            return Err(ValidationError::InvertedPeriod);
        }
        lodging.nights = u32::try_from(days).ok();
    }

    Ok(LegacyObservations {
        mileage: has_mileage.then_some(mileage),
        lodging: has_lodging.then_some(lodging),
        remaining: remaining.join("\n").trim().to_string(),
    })
}

fn parse_decimal(field: &'static str, value: &str) -> Result<f64, ValidationError> {
    let cleaned = value
        .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
        .replace(',', ".");
    let invalid = || ValidationError::InvalidDetail {
        field,
        value: value.to_string(),
    };
    let parsed: f64 = cleaned.parse().map_err(|_| invalid())?;
    // distances are strictly positive, finite figures
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(invalid());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ExpenseDraft {
        ExpenseDraft::new()
            .set_amount("42,90")
            .set_type(ExpenseType::Alimentacao)
            .set_date("2024-06-15")
            .set_payment_method(PaymentMethod::CartaoCorporativo)
    }

    #[test]
    fn finalise_builds_an_unattached_expense() {
        let expense = draft()
            .add_receipt("gs://receipts/1.jpg")
            .finalise("expense_1".into(), "op")
            .unwrap();

        assert_eq!(expense.amount, Amount::from_cents(4_290));
        assert_eq!(expense.report_id, None);
        assert_eq!(expense.created_by, "op");
        assert_eq!(expense.receipts, vec!["gs://receipts/1.jpg".to_string()]);
        assert!(expense.reimbursable);
        assert!(expense.check().is_ok());
    }

    #[test]
    fn finalise_rejects_malformed_input() {
        let missing = ExpenseDraft::new().set_date("2024-06-15");
        assert_eq!(
            missing.finalise("e".into(), "op").unwrap_err(),
            ValidationError::MissingField("amount")
        );

        let bad_amount = draft().set_amount("doze reais");
        assert!(matches!(
            bad_amount.finalise("e".into(), "op"),
            Err(ValidationError::InvalidAmount(_))
        ));

        let zero = draft().set_amount("0,00");
        assert_eq!(
            zero.finalise("e".into(), "op").unwrap_err(),
            ValidationError::NonPositiveAmount
        );

        let bad_date = draft().set_date("ontem");
        assert!(matches!(
            bad_date.finalise("e".into(), "op"),
            Err(ValidationError::InvalidDate(_))
        ));
    }

    #[test]
    fn legacy_mileage_lines_become_structured() {
        let text = "Visita ao cliente\nOrigem: São Paulo\nDestino: Campinas\nKM: 96,5 km\nValor por km: 1,20";
        let parsed = parse_legacy_observations(text).unwrap();

        let mileage = parsed.mileage.unwrap();
        assert_eq!(mileage.origin, "São Paulo");
        assert_eq!(mileage.destination, "Campinas");
        assert_eq!(mileage.distance_km, 96.5);
        assert_eq!(mileage.rate_per_km, Some(Amount::from_cents(120)));
        assert_eq!(parsed.lodging, None);
        assert_eq!(parsed.remaining, "Visita ao cliente");
    }

    #[test]
    fn legacy_lodging_lines_derive_nights() {
        let text = "Hotel: Ibis Centro\nCheck-in: 10/06/2024\nCheck-out: 2024-06-13";
        let lodging = parse_legacy_observations(text).unwrap().lodging.unwrap();

        assert_eq!(lodging.hotel, "Ibis Centro");
        assert_eq!(lodging.nights, Some(3));
    }

    #[test]
    fn legacy_parsing_keeps_unlabelled_text_and_rejects_bad_values() {
        let parsed = parse_legacy_observations("Almoço com equipe\nNota: 123").unwrap();
        assert_eq!(parsed.remaining, "Almoço com equipe\nNota: 123");
        assert_eq!(parsed.mileage, None);

        assert!(matches!(
            parse_legacy_observations("KM: muitos"),
            Err(ValidationError::InvalidDetail { .. })
        ));
    }

    #[test]
    fn legacy_distances_must_be_positive() {
        for text in ["KM: -30", "KM: 0", "Distância: 0,0 km", "KM: inf", "KM: NaN"] {
            assert!(
                matches!(
                    parse_legacy_observations(text),
                    Err(ValidationError::InvalidDetail { field: "distance", .. })
                ),
                "{text} was accepted"
            );
        }
        let result = draft().set_observations("Origem: Santos\nKM: -30").finalise("e".into(), "op");
        assert!(result.is_err());
    }

    #[test]
    fn finalise_moves_legacy_fields_out_of_observations() {
        let expense = draft()
            .set_type(ExpenseType::Quilometragem)
            .set_observations("Origem: Santos\nDestino: Guarujá\nKM: 30")
            .finalise("e".into(), "op")
            .unwrap();

        assert_eq!(expense.observations, "");
        assert_eq!(expense.mileage.unwrap().distance_km, 30.0);
    }
}
