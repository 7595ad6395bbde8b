//! Append-only status history shared by reports and advances.
//!
//! Each entry is chained to its predecessor through a sha256 digest: rewriting
//! or dropping an earlier entry breaks every digest after it.
use crate::types::{Coded, TimeStamp};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StatusEntry<S> {
    #[n(0)]
    pub status: S,
    #[n(1)]
    pub date: TimeStamp<Utc>,
    #[n(2)]
    pub changed_by: Option<String>, // actor display name
    #[n(3)]
    pub observations: String,
    #[n(4)]
    pub digest: String, // sha256 over the previous digest and this entry
}

impl<S: Coded> StatusEntry<S> {
    fn chain_digest(
        previous: &str,
        status: S,
        date: &TimeStamp<Utc>,
        changed_by: Option<&str>,
        observations: &str,
    ) -> String {
        sha256::digest(format!(
            "{previous}|{}|{}|{}|{observations}",
            status.code(),
            date.to_rfc3339(),
            changed_by.unwrap_or_default(),
        ))
    }

    /// The timestamp in the string form shown to users.
    pub fn date_string(&self) -> String {
        self.date.to_rfc3339()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StatusHistory<S> {
    #[n(0)]
    entries: Vec<StatusEntry<S>>,
}

impl<S> Default for StatusHistory<S> {
    fn default() -> Self {
        Self { entries: vec![] }
    }
}

impl<S: Coded> StatusHistory<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry stamped with the current time.
    pub fn append(
        &mut self,
        status: S,
        changed_by: Option<String>,
        observations: impl Into<String>,
    ) -> &StatusEntry<S> {
        self.append_at(TimeStamp::new(), status, changed_by, observations)
    }

    /// Appends an entry at `date`. A date earlier than the last entry is
    /// clamped so insertion order stays chronological.
    pub fn append_at(
        &mut self,
        date: TimeStamp<Utc>,
        status: S,
        changed_by: Option<String>,
        observations: impl Into<String>,
    ) -> &StatusEntry<S> {
        let observations = observations.into();
        let date = match self.entries.last() {
            Some(last) if last.date > date => last.date.clone(),
            _ => date,
        };
        let previous = self.entries.last().map(|e| e.digest.as_str()).unwrap_or("");
        let digest =
            StatusEntry::chain_digest(previous, status, &date, changed_by.as_deref(), &observations);

        self.entries.push(StatusEntry {
            status,
            date,
            changed_by,
            observations,
            digest,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[StatusEntry<S>] {
        &self.entries
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn last(&self) -> Option<&StatusEntry<S>> {
        self.entries.last()
    }

    /// Recomputes the digest chain and the chronological ordering.
    pub fn verify(&self) -> bool {
        let mut previous = String::new();
        let mut last_date: Option<&TimeStamp<Utc>> = None;

        for entry in &self.entries {
            if last_date.is_some_and(|d| d > &entry.date) {
                return false;
            }
            let expected = StatusEntry::chain_digest(
                &previous,
                entry.status,
                &entry.date,
                entry.changed_by.as_deref(),
                &entry.observations,
            );
            if expected != entry.digest {
                return false;
            }
            previous = expected;
            last_date = Some(&entry.date);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportStatus;

    #[test]
    fn append_builds_a_verifiable_chain() {
        let mut history = StatusHistory::new();
        history.append(ReportStatus::AnaliseContabil, Some("ana".into()), "");
        history.append(ReportStatus::FinanceiroAprovado, Some("bruno".into()), "ok");

        assert_eq!(history.len(), 2);
        assert!(history.verify());

        let last = history.last().unwrap();
        assert_eq!(last.status, ReportStatus::FinanceiroAprovado);
        assert_eq!(last.changed_by.as_deref(), Some("bruno"));
        assert_eq!(last.observations, "ok");
        assert_ne!(history.entries()[0].digest, last.digest);
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let mut history = StatusHistory::new();
        history.append(ReportStatus::AnaliseContabil, None, "");
        history.append(ReportStatus::Rejeitado, Some("bruno".into()), "sem nota");

        let mut tampered = history.clone();
        tampered.entries[0].observations = "edited".into();
        assert!(!tampered.verify());

        let mut truncated = history.clone();
        truncated.entries.remove(0);
        assert!(!truncated.verify());
    }

    #[test]
    fn backdated_entries_are_clamped() {
        let mut history = StatusHistory::new();
        history.append_at(
            TimeStamp::new_with(2024, 6, 15, 12, 0, 0),
            ReportStatus::AnaliseContabil,
            None,
            "",
        );
        let entry = history.append_at(
            TimeStamp::new_with(2024, 6, 1, 12, 0, 0),
            ReportStatus::FinanceiroAprovado,
            None,
            "",
        );
        assert_eq!(entry.date, TimeStamp::new_with(2024, 6, 15, 12, 0, 0));
        assert!(history.verify());
    }

    #[test]
    fn history_encoding() {
        let mut history = StatusHistory::new();
        history.append(ReportStatus::AnaliseContabil, Some("ana".into()), "first");

        let encoded = minicbor::to_vec(&history).unwrap();
        let decoded: StatusHistory<ReportStatus> = minicbor::decode(&encoded).unwrap();
        assert_eq!(history, decoded);
        assert!(decoded.verify());
    }
}
