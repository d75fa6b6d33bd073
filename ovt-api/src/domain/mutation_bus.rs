//! Mutation bus: lifecycle fan-out for ledger writes.
//!
//! Subscribers register once at startup composition, in one of two delivery
//! modes. Awaited subscribers block the triggering write until their hooks
//! resolve and may veto it from a before hook. Detached subscribers run on
//! spawned tasks; their failures are logged and never reach the writer.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future;

use super::models::{NewTimeRecord, TimeRecord, UserId};
use super::LedgerError;

/// Observer of ledger record lifecycle events.
///
/// Every hook has a no-op default, so a subscriber only implements the
/// events it cares about. `name` doubles as the registration identity.
#[async_trait]
pub trait RecordMutationSubscriber: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn before_record_insert(
        &self,
        _record: &NewTimeRecord,
        _owner: UserId,
    ) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn after_record_insert(
        &self,
        _record: &TimeRecord,
        _owner: UserId,
    ) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn before_record_update(
        &self,
        _prev: &TimeRecord,
        _next: &TimeRecord,
        _owner: UserId,
    ) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn after_record_update(
        &self,
        _prev: &TimeRecord,
        _next: &TimeRecord,
        _owner: UserId,
    ) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn before_record_delete(
        &self,
        _record: &TimeRecord,
        _owner: UserId,
    ) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn after_record_delete(
        &self,
        _record: &TimeRecord,
        _owner: UserId,
    ) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn before_delete_all(&self, _owner: UserId) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn after_delete_all(&self, _owner: UserId) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Registry of mutation subscribers with two delivery disciplines.
///
/// Registration has set semantics: a subscriber name already present in a
/// registry is not added again.
#[derive(Default)]
pub struct MutationBus {
    awaited: Vec<Arc<dyn RecordMutationSubscriber>>,
    detached: Vec<Arc<dyn RecordMutationSubscriber>>,
}

impl MutationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_awaited(&mut self, subscriber: Arc<dyn RecordMutationSubscriber>) {
        if !self.awaited.iter().any(|s| s.name() == subscriber.name()) {
            self.awaited.push(subscriber);
        }
    }

    pub fn subscribe_detached(&mut self, subscriber: Arc<dyn RecordMutationSubscriber>) {
        if !self.detached.iter().any(|s| s.name() == subscriber.name()) {
            self.detached.push(subscriber);
        }
    }

    pub fn awaited_count(&self) -> usize {
        self.awaited.len()
    }

    pub fn detached_count(&self) -> usize {
        self.detached.len()
    }

    pub async fn before_insert(
        &self,
        record: &NewTimeRecord,
        owner: UserId,
    ) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            let record = record.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "before_record_insert", sub.before_record_insert(&record, owner).await);
            });
        }

        let results =
            future::join_all(self.awaited.iter().map(|s| s.before_record_insert(record, owner)))
                .await;
        veto(self.first_failure("before_record_insert", results))
    }

    pub async fn after_insert(&self, record: &TimeRecord, owner: UserId) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            let record = record.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "after_record_insert", sub.after_record_insert(&record, owner).await);
            });
        }

        let results =
            future::join_all(self.awaited.iter().map(|s| s.after_record_insert(record, owner)))
                .await;
        propagate(self.first_failure("after_record_insert", results))
    }

    pub async fn before_update(
        &self,
        prev: &TimeRecord,
        next: &TimeRecord,
        owner: UserId,
    ) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            let prev = prev.clone();
            let next = next.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "before_record_update", sub.before_record_update(&prev, &next, owner).await);
            });
        }

        let results = future::join_all(
            self.awaited.iter().map(|s| s.before_record_update(prev, next, owner)),
        )
        .await;
        veto(self.first_failure("before_record_update", results))
    }

    pub async fn after_update(
        &self,
        prev: &TimeRecord,
        next: &TimeRecord,
        owner: UserId,
    ) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            let prev = prev.clone();
            let next = next.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "after_record_update", sub.after_record_update(&prev, &next, owner).await);
            });
        }

        let results = future::join_all(
            self.awaited.iter().map(|s| s.after_record_update(prev, next, owner)),
        )
        .await;
        propagate(self.first_failure("after_record_update", results))
    }

    pub async fn before_delete(
        &self,
        record: &TimeRecord,
        owner: UserId,
    ) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            let record = record.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "before_record_delete", sub.before_record_delete(&record, owner).await);
            });
        }

        let results =
            future::join_all(self.awaited.iter().map(|s| s.before_record_delete(record, owner)))
                .await;
        veto(self.first_failure("before_record_delete", results))
    }

    pub async fn after_delete(&self, record: &TimeRecord, owner: UserId) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            let record = record.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "after_record_delete", sub.after_record_delete(&record, owner).await);
            });
        }

        let results =
            future::join_all(self.awaited.iter().map(|s| s.after_record_delete(record, owner)))
                .await;
        propagate(self.first_failure("after_record_delete", results))
    }

    pub async fn before_delete_all(&self, owner: UserId) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "before_delete_all", sub.before_delete_all(owner).await);
            });
        }

        let results =
            future::join_all(self.awaited.iter().map(|s| s.before_delete_all(owner))).await;
        veto(self.first_failure("before_delete_all", results))
    }

    pub async fn after_delete_all(&self, owner: UserId) -> Result<(), LedgerError> {
        for sub in &self.detached {
            let sub = sub.clone();
            tokio::spawn(async move {
                log_detached(&*sub, "after_delete_all", sub.after_delete_all(owner).await);
            });
        }

        let results =
            future::join_all(self.awaited.iter().map(|s| s.after_delete_all(owner))).await;
        propagate(self.first_failure("after_delete_all", results))
    }

    /// Logs every awaited failure and keeps the first.
    ///
    /// Every subscriber has already run by the time this is called; there is
    /// no short-circuit on the first rejection.
    fn first_failure(
        &self,
        hook: &'static str,
        results: Vec<Result<(), LedgerError>>,
    ) -> Option<(&'static str, LedgerError)> {
        let mut first = None;
        for (sub, result) in self.awaited.iter().zip(results) {
            if let Err(err) = result {
                tracing::error!(subscriber = sub.name(), hook, error = %err, "awaited subscriber failed");
                if first.is_none() {
                    first = Some((sub.name(), err));
                }
            }
        }
        first
    }
}

fn log_detached(sub: &dyn RecordMutationSubscriber, hook: &'static str, result: Result<(), LedgerError>) {
    if let Err(err) = result {
        tracing::error!(subscriber = sub.name(), hook, error = %err, "detached subscriber failed");
    }
}

/// Before-hook failures become a caller-visible veto.
fn veto(failure: Option<(&'static str, LedgerError)>) -> Result<(), LedgerError> {
    match failure {
        Some((subscriber, err)) => Err(LedgerError::WriteVetoed {
            subscriber,
            reason: err.to_string(),
        }),
        None => Ok(()),
    }
}

/// After-hook failures propagate as-is; the store mutation is already durable.
fn propagate(failure: Option<(&'static str, LedgerError)>) -> Result<(), LedgerError> {
    match failure {
        Some((_, err)) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RecordKind;
    use std::time::Duration;
    use time::macros::date;
    use tokio::sync::mpsc;

    /// Reports every hook invocation on a channel; optionally fails them all.
    struct SignalingSubscriber {
        name: &'static str,
        tx: mpsc::UnboundedSender<&'static str>,
        fail: bool,
    }

    impl SignalingSubscriber {
        fn outcome(&self, hook: &'static str) -> Result<(), LedgerError> {
            self.tx.send(self.name).ok();
            if self.fail {
                Err(LedgerError::Integrity(format!("{} rejected {hook}", self.name)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RecordMutationSubscriber for SignalingSubscriber {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn before_record_insert(
            &self,
            _record: &NewTimeRecord,
            _owner: UserId,
        ) -> Result<(), LedgerError> {
            self.outcome("before_record_insert")
        }

        async fn after_record_insert(
            &self,
            _record: &TimeRecord,
            _owner: UserId,
        ) -> Result<(), LedgerError> {
            self.outcome("after_record_insert")
        }
    }

    fn stored_record(owner: UserId) -> TimeRecord {
        TimeRecord {
            id: crate::domain::models::TimeRecordId::new(1),
            owner,
            duration_minutes: 60,
            kind: RecordKind::Overtime,
            date: date!(2024 - 01 - 15),
            note: None,
            created_at: time::OffsetDateTime::now_utc(),
        }
    }

    fn new_record() -> NewTimeRecord {
        NewTimeRecord {
            duration_minutes: 60,
            kind: RecordKind::Overtime,
            date: date!(2024 - 01 - 15),
            note: None,
        }
    }

    fn signaling(
        name: &'static str,
        fail: bool,
    ) -> (Arc<SignalingSubscriber>, mpsc::UnboundedReceiver<&'static str>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(SignalingSubscriber { name, tx, fail }), rx)
    }

    #[test]
    fn registration_is_idempotent_per_registry() {
        let (sub, _rx) = signaling("stats", false);
        let mut bus = MutationBus::new();

        bus.subscribe_awaited(sub.clone());
        bus.subscribe_awaited(sub.clone());
        bus.subscribe_detached(sub.clone());
        bus.subscribe_detached(sub);

        assert_eq!(bus.awaited_count(), 1);
        assert_eq!(bus.detached_count(), 1);
    }

    #[tokio::test]
    async fn awaited_before_hook_failure_vetoes_the_write() {
        let (sub, mut rx) = signaling("guard", true);
        let mut bus = MutationBus::new();
        bus.subscribe_awaited(sub);

        let result = bus.before_insert(&new_record(), UserId::new(1)).await;

        assert!(matches!(
            result,
            Err(LedgerError::WriteVetoed { subscriber: "guard", .. })
        ));
        assert_eq!(rx.recv().await, Some("guard"));
    }

    #[tokio::test]
    async fn awaited_failure_does_not_short_circuit_other_subscribers() {
        let (failing, mut failing_rx) = signaling("failing", true);
        let (healthy, mut healthy_rx) = signaling("healthy", false);
        let mut bus = MutationBus::new();
        bus.subscribe_awaited(failing);
        bus.subscribe_awaited(healthy);

        let owner = UserId::new(1);
        let record = stored_record(owner);
        let result = bus.after_insert(&record, owner).await;

        assert!(matches!(result, Err(LedgerError::Integrity(_))));
        assert_eq!(failing_rx.recv().await, Some("failing"));
        assert_eq!(healthy_rx.recv().await, Some("healthy"));
    }

    #[tokio::test]
    async fn detached_failure_never_reaches_the_writer() {
        let (failing, mut failing_rx) = signaling("failing", true);
        let (healthy, mut healthy_rx) = signaling("healthy", false);
        let mut bus = MutationBus::new();
        bus.subscribe_detached(failing);
        bus.subscribe_detached(healthy);

        let owner = UserId::new(1);
        let record = stored_record(owner);
        let result = bus.after_insert(&record, owner).await;
        assert!(result.is_ok());

        // Both detached subscribers were still delivered to.
        let received = tokio::time::timeout(Duration::from_secs(1), async {
            (failing_rx.recv().await, healthy_rx.recv().await)
        })
        .await
        .unwrap();
        assert_eq!(received, (Some("failing"), Some("healthy")));
    }

    #[tokio::test]
    async fn detached_before_hooks_cannot_veto() {
        let (failing, mut rx) = signaling("failing", true);
        let mut bus = MutationBus::new();
        bus.subscribe_detached(failing);

        let result = bus.before_insert(&new_record(), UserId::new(1)).await;
        assert!(result.is_ok());
        assert_eq!(rx.recv().await, Some("failing"));
    }
}
