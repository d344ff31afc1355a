//! Deferred prescription verification.
//!
//! Each entry captures the id of the order it belongs to when the order is
//! placed, so firing it never depends on what else was ordered since.

use chrono::{DateTime, Duration, Utc};

/// Longer delays are clamped to this (one day)
const MAX_DELAY_MS: u64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVerification {
    pub order_id: String,
    pub patient: String,
    pub address: String,
    pub user_email: String,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct VerificationScheduler {
    pending: Vec<PendingVerification>,
}

impl VerificationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &mut self,
        order_id: &str,
        patient: &str,
        address: &str,
        user_email: &str,
        now: DateTime<Utc>,
        delay_ms: u64,
    ) -> DateTime<Utc> {
        let due_at = now + Duration::milliseconds(delay_ms.min(MAX_DELAY_MS) as i64);
        self.pending.push(PendingVerification {
            order_id: order_id.to_string(),
            patient: patient.to_string(),
            address: address.to_string(),
            user_email: user_email.to_string(),
            due_at,
        });
        due_at
    }

    /// Remove and return every entry due at or before `now`, earliest first
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<PendingVerification> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due_at <= now);
        self.pending = rest;
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        due
    }

    /// Put entries back, e.g. the unprocessed tail of a `take_due` batch
    pub fn requeue(&mut self, entries: impl IntoIterator<Item = PendingVerification>) {
        self.pending.extend(entries);
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending.iter().map(|p| p.due_at).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2030-05-10T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_entry_fires_once_when_due() {
        let mut sched = VerificationScheduler::new();
        let due = sched.schedule("o1", "Ravi", "MG Road", "r@x.com", t0(), 5_000);
        assert_eq!(due, t0() + Duration::seconds(5));

        assert!(sched.take_due(t0() + Duration::seconds(4)).is_empty());
        let fired = sched.take_due(t0() + Duration::seconds(5));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].order_id, "o1");
        assert!(sched.take_due(t0() + Duration::seconds(60)).is_empty());
        assert!(sched.is_empty());
    }

    #[test]
    fn test_entries_keep_their_own_order_id() {
        let mut sched = VerificationScheduler::new();
        sched.schedule("first", "A", "x", "a@x.com", t0(), 5_000);
        sched.schedule("second", "B", "y", "b@x.com", t0() + Duration::seconds(3), 5_000);

        let fired = sched.take_due(t0() + Duration::seconds(6));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].order_id, "first");
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.next_due(), Some(t0() + Duration::seconds(8)));
    }

    #[test]
    fn test_due_entries_come_out_earliest_first() {
        let mut sched = VerificationScheduler::new();
        sched.schedule("late", "A", "x", "a@x.com", t0(), 9_000);
        sched.schedule("early", "B", "y", "b@x.com", t0(), 1_000);
        let ids: Vec<String> = sched
            .take_due(t0() + Duration::seconds(10))
            .into_iter()
            .map(|p| p.order_id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
