//! In-memory delivery log for tests and single-process runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{rate, DeliveryLogFilter, DeliveryLogStore, DeliveryStats, ProviderStats};
use crate::attempt::{AttemptStatus, DeliveryAttempt};
use crate::LogStoreError;

#[derive(Default)]
pub struct InMemoryDeliveryLog {
    attempts: RwLock<Vec<DeliveryAttempt>>,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt in append order.
    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.attempts.read().clone()
    }

    pub fn len(&self) -> usize {
        self.attempts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.read().is_empty()
    }
}

#[async_trait]
impl DeliveryLogStore for InMemoryDeliveryLog {
    async fn append(&self, attempt: &DeliveryAttempt) -> Result<(), LogStoreError> {
        self.attempts.write().push(attempt.clone());
        Ok(())
    }

    async fn query(&self, filter: &DeliveryLogFilter) -> Result<Vec<DeliveryAttempt>, LogStoreError> {
        let attempts = self.attempts.read();
        let mut matched: Vec<DeliveryAttempt> =
            attempts.iter().rev().filter(|a| filter.matches(a)).cloned().collect();
        // Stable sort keeps later appends first among equal timestamps.
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn stats(&self, filter: &DeliveryLogFilter) -> Result<DeliveryStats, LogStoreError> {
        let attempts = self.attempts.read();
        let mut per_provider: BTreeMap<&str, (u64, u64, u64, u64)> = BTreeMap::new();
        for a in attempts.iter().filter(|a| filter.matches(a)) {
            let entry = per_provider.entry(a.provider.as_str()).or_default();
            entry.0 += 1;
            match a.status {
                AttemptStatus::Delivered => entry.1 += 1,
                AttemptStatus::Failed => entry.2 += 1,
            }
            entry.3 += a.response_time_ms;
        }

        let providers = per_provider
            .into_iter()
            .map(|(provider, (total, delivered, failed, latency))| ProviderStats {
                provider: provider.to_string(),
                total,
                delivered,
                failed,
                delivery_rate: rate(delivered, total),
                avg_response_time_ms: (total > 0).then(|| latency as f64 / total as f64),
            })
            .collect();
        Ok(DeliveryStats::from_providers(providers))
    }
}
