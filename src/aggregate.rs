//! Derived money figures over expense sets
use crate::error::ValidationError;
use crate::expense::{Expense, ExpenseType};
use crate::types::Amount;
use std::collections::BTreeMap;

/// Sum of `amount` over `expenses`.
pub fn total_amount<'a>(
    expenses: impl IntoIterator<Item = &'a Expense>,
) -> Result<Amount, ValidationError> {
    expenses
        .into_iter()
        .try_fold(Amount::ZERO, |total, e| total.checked_add(e.amount))
        .ok_or(ValidationError::AmountOverflow)
}

/// Per-type subtotals for dashboards. Untyped expenses land under OUTROS.
pub fn subtotals_by_type<'a>(
    expenses: impl IntoIterator<Item = &'a Expense>,
) -> Result<BTreeMap<ExpenseType, Amount>, ValidationError> {
    let mut subtotals = BTreeMap::new();
    for expense in expenses {
        let bucket = expense.expense_type.unwrap_or(ExpenseType::Outros);
        let entry = subtotals.entry(bucket).or_insert(Amount::ZERO);
        *entry = entry
            .checked_add(expense.amount)
            .ok_or(ValidationError::AmountOverflow)?;
    }
    Ok(subtotals)
}
