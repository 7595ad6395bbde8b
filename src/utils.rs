//! Document id generation

use crate::error::{Result, WorkflowError};
use bech32::Bech32m;
use uuid7::uuid7;

pub const REPORT_HRP: &str = "report_";
pub const ADVANCE_HRP: &str = "advance_";
pub const EXPENSE_HRP: &str = "expense_";

// construct a unique, time-ordered id then encode using bech32 with the entity prefix
pub fn new_document_id(hrp: &str) -> Result<String> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| WorkflowError::Encoding(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| WorkflowError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_the_entity_prefix() {
        let id = new_document_id(REPORT_HRP).unwrap();
        assert!(id.starts_with("report_1"));
        assert!(new_document_id(EXPENSE_HRP).unwrap().starts_with("expense_1"));
    }

    #[test]
    fn ids_are_unique() {
        let a = new_document_id(ADVANCE_HRP).unwrap();
        let b = new_document_id(ADVANCE_HRP).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(new_document_id("").is_err());
    }
}
