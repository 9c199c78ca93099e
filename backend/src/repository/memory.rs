//! In-memory repository implementation
//!
//! Backs the WHR collection with a map behind a single `RwLock`. Every
//! mutating operation takes the write lock, which makes entity-level
//! operations and the number sequence linearizable; readers share the read
//! lock and see a consistent snapshot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Classification, StatsSnapshot, TrackingEvent, Transport, WarehouseReceipt, WhrStatus,
};
use crate::repository::{apply_changes, WhrChanges, WhrFilter, WhrRepository, SEARCH_RESULT_LIMIT};

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, WarehouseReceipt>,
    /// Insertion stamp per id, used as the final sort tiebreak
    insertion_rank: HashMap<Uuid, u64>,
    next_rank: u64,
    events: HashMap<Uuid, Vec<TrackingEvent>>,
    sequence: u64,
}

impl Inner {
    fn rank(&self, id: Uuid) -> u64 {
        self.insertion_rank.get(&id).copied().unwrap_or(0)
    }

    /// Sort newest first: arrival_date desc, created_at desc, then most
    /// recently inserted first.
    fn sort_for_listing(&self, items: &mut [WarehouseReceipt]) {
        items.sort_by(|a, b| {
            b.arrival_date
                .cmp(&a.arrival_date)
                .then(b.created_at.cmp(&a.created_at))
                .then(self.rank(b.id).cmp(&self.rank(a.id)))
        });
    }
}

/// Process-local repository; constructed once per process (or per test)
pub struct InMemoryWhrRepository {
    inner: RwLock<Inner>,
}

impl InMemoryWhrRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryWhrRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WhrRepository for InMemoryWhrRepository {
    async fn create(&self, whr: WarehouseReceipt) -> AppResult<WarehouseReceipt> {
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&whr.id) {
            return Err(AppError::DuplicateEntry("id".to_string()));
        }
        if inner.records.values().any(|w| w.whr_number == whr.whr_number) {
            return Err(AppError::DuplicateEntry("whr_number".to_string()));
        }
        inner.next_rank += 1;
        let rank = inner.next_rank;
        inner.insertion_rank.insert(whr.id, rank);
        inner.events.entry(whr.id).or_default();
        inner.records.insert(whr.id, whr.clone());
        Ok(whr)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<WarehouseReceipt> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("WHR".to_string()))
    }

    async fn find_by_token(&self, token: &str) -> AppResult<WarehouseReceipt> {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .find(|w| w.tracking_number == token || w.whr_number == token)
            .cloned()
            .ok_or_else(|| AppError::NotFound("WHR".to_string()))
    }

    async fn list(
        &self,
        filter: &WhrFilter,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<WarehouseReceipt>, u64)> {
        let inner = self.inner.read().await;
        let mut matching: Vec<WarehouseReceipt> = inner
            .records
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();
        inner.sort_for_listing(&mut matching);

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(&self, id: Uuid, changes: WhrChanges) -> AppResult<WarehouseReceipt> {
        let mut inner = self.inner.write().await;
        let whr = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("WHR".to_string()))?;
        apply_changes(whr, &changes, Utc::now());
        Ok(whr.clone())
    }

    async fn mark_notified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<WarehouseReceipt> {
        let mut inner = self.inner.write().await;
        let whr = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("WHR".to_string()))?;
        if !whr.email_sent {
            whr.email_sent = true;
            whr.email_sent_at = Some(now);
            whr.updated_at = now;
        }
        Ok(whr.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<WarehouseReceipt> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .records
            .remove(&id)
            .ok_or_else(|| AppError::NotFound("WHR".to_string()))?;
        inner.insertion_rank.remove(&id);
        inner.events.remove(&id);
        Ok(removed)
    }

    async fn search(&self, token: &str) -> AppResult<Vec<WarehouseReceipt>> {
        let needle = token.to_lowercase();
        let inner = self.inner.read().await;
        let mut matching: Vec<WarehouseReceipt> = inner
            .records
            .values()
            .filter(|w| w.matches_search(&needle))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(inner.rank(b.id).cmp(&inner.rank(a.id)))
        });
        matching.truncate(SEARCH_RESULT_LIMIT);
        Ok(matching)
    }

    async fn aggregate(&self, since: DateTime<Utc>) -> AppResult<StatsSnapshot> {
        let inner = self.inner.read().await;
        let mut stats = StatsSnapshot::default();
        let mut volume_sum = Decimal::ZERO;

        for whr in inner.records.values().filter(|w| w.created_at >= since) {
            stats.total += 1;
            match whr.classification {
                Classification::Pending => stats.pending += 1,
                Classification::Awb => stats.awb += 1,
                Classification::Bl => stats.bl += 1,
            }
            if !whr.email_sent {
                stats.emails_pending += 1;
            }
            match whr.status {
                WhrStatus::EnMiami => stats.in_miami += 1,
                WhrStatus::PorAire => stats.por_aire += 1,
                WhrStatus::PorMar => stats.por_mar += 1,
                WhrStatus::EnTransito => stats.in_transit += 1,
                WhrStatus::Entregado => stats.delivered += 1,
            }
            match whr.transport {
                Transport::Air => stats.by_air += 1,
                Transport::Sea => stats.by_sea += 1,
            }
            stats.total_weight += whr.weight;
            stats.total_value += whr.declared_value;
            stats.total_pieces += whr.pieces as u64;
            volume_sum += whr.volume;
            stats.last_whr_created = match stats.last_whr_created {
                Some(last) if last >= whr.created_at => Some(last),
                _ => Some(whr.created_at),
            };
        }

        if stats.total > 0 {
            let count = Decimal::from(stats.total);
            stats.avg_weight = (stats.total_weight / count).round_dp(2);
            stats.avg_volume = (volume_sum / count).round_dp(2);
        }
        Ok(stats)
    }

    async fn next_whr_sequence(&self) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        inner.sequence += 1;
        Ok(inner.sequence)
    }

    async fn append_event(&self, whr_id: Uuid, event: TrackingEvent) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.records.contains_key(&whr_id) {
            return Err(AppError::NotFound("WHR".to_string()));
        }
        inner.events.entry(whr_id).or_default().push(event);
        Ok(())
    }

    async fn events_for(&self, whr_id: Uuid) -> AppResult<Vec<TrackingEvent>> {
        let inner = self.inner.read().await;
        Ok(inner.events.get(&whr_id).cloned().unwrap_or_default())
    }

    async fn all(&self) -> AppResult<Vec<WarehouseReceipt>> {
        let inner = self.inner.read().await;
        let mut records: Vec<WarehouseReceipt> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Consignee, Shipper};
    use chrono::TimeZone;

    fn receipt(whr_number: &str, created_at: DateTime<Utc>) -> WarehouseReceipt {
        WarehouseReceipt {
            id: Uuid::new_v4(),
            whr_number: whr_number.to_string(),
            tracking_number: format!("TRK-{}", whr_number),
            arrival_date: created_at.date_naive(),
            received_by: "Carlos".to_string(),
            carrier: "FedEx".to_string(),
            shipper: Shipper {
                name: "Amazon".to_string(),
                ..Default::default()
            },
            consignee: Consignee {
                name: "María".to_string(),
                email: "maria@example.com".to_string(),
                ..Default::default()
            },
            content: "Electrónicos".to_string(),
            pieces: 1,
            weight: Decimal::from(10),
            length: Decimal::from(10),
            width: Decimal::from(10),
            height: Decimal::from(10),
            volume: Decimal::new(578_746, 6),
            volume_weight: Decimal::new(6_019, 3),
            invoice_number: None,
            declared_value: Decimal::ZERO,
            po_number: None,
            departure_date: None,
            transport: Transport::Air,
            estimated_arrival_cr: None,
            classification: Classification::Pending,
            status: WhrStatus::EnMiami,
            email_sent: false,
            email_sent_at: None,
            classified_at: None,
            notes: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn full_ties_order_most_recently_inserted_first() {
        let repo = InMemoryWhrRepository::new();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let first = receipt("WHR2405010001", t);
        let second = receipt("WHR2405010002", t);
        let (first_id, second_id) = (first.id, second.id);
        repo.create(first).await.unwrap();
        repo.create(second).await.unwrap();

        let (items, total) = repo.list(&WhrFilter::default(), 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].id, second_id);
        assert_eq!(items[1].id, first_id);
    }

    #[tokio::test]
    async fn tie_break_survives_deletes() {
        let repo = InMemoryWhrRepository::new();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let a = receipt("WHR2405010001", t);
        let b = receipt("WHR2405010002", t);
        let c = receipt("WHR2405010003", t);
        let (a_id, c_id) = (a.id, c.id);
        let b_id = b.id;
        repo.create(a).await.unwrap();
        repo.create(b).await.unwrap();
        repo.create(c).await.unwrap();
        repo.delete(b_id).await.unwrap();

        let (items, _) = repo.list(&WhrFilter::default(), 10, 0).await.unwrap();
        assert_eq!(items[0].id, c_id);
        assert_eq!(items[1].id, a_id);
    }

    #[tokio::test]
    async fn mark_notified_stamps_at_most_once() {
        let repo = InMemoryWhrRepository::new();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let whr = receipt("WHR2405010001", t);
        let id = whr.id;
        repo.create(whr).await.unwrap();

        let first_stamp = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        let second_stamp = Utc.with_ymd_and_hms(2024, 5, 3, 9, 0, 0).unwrap();

        let first = repo.mark_notified(id, first_stamp).await.unwrap();
        assert_eq!(first.email_sent_at, Some(first_stamp));

        let second = repo.mark_notified(id, second_stamp).await.unwrap();
        assert_eq!(second.email_sent_at, Some(first_stamp));
        assert_eq!(second.updated_at, first.updated_at);
    }
}
