//! Storage contract for the warehouse receipt collection
//!
//! The service layer talks to a `WhrRepository` trait object; the backend is
//! selected once at startup from configuration (in-memory or PostgreSQL), not
//! by environment sniffing inside business logic.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Classification, StatsSnapshot, TrackingEvent, Transport, WarehouseReceipt, WhrStatus,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryWhrRepository;
pub use postgres::PostgresWhrRepository;

/// Filter for list queries. The search token matches any of whr_number,
/// tracking_number, consignee name, shipper name, or content
/// (case-insensitive substring, OR semantics); the remaining fields are
/// ANDed equality/range filters.
#[derive(Debug, Clone, Default)]
pub struct WhrFilter {
    pub search: Option<String>,
    pub classification: Option<Classification>,
    pub status: Option<WhrStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl WhrFilter {
    pub fn matches(&self, whr: &WarehouseReceipt) -> bool {
        if let Some(ref search) = self.search {
            if !whr.matches_search(&search.to_lowercase()) {
                return false;
            }
        }
        if let Some(classification) = self.classification {
            if whr.classification != classification {
                return false;
            }
        }
        if let Some(status) = self.status {
            if whr.status != status {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if whr.arrival_date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if whr.arrival_date > to {
                return false;
            }
        }
        true
    }
}

/// Partial update applied to a stored receipt. `None` leaves a field
/// untouched. Derived fields (volume, volume_weight) are not settable here;
/// they are recomputed when any dimension changes. Notification flags are
/// not settable either; they go through `mark_notified`.
#[derive(Debug, Clone, Default)]
pub struct WhrChanges {
    pub tracking_number: Option<String>,
    pub received_by: Option<String>,
    pub carrier: Option<String>,
    pub shipper_name: Option<String>,
    pub shipper_company: Option<String>,
    pub shipper_address: Option<String>,
    pub shipper_phone: Option<String>,
    pub consignee_name: Option<String>,
    pub consignee_company: Option<String>,
    pub consignee_address: Option<String>,
    pub consignee_phone: Option<String>,
    pub consignee_email: Option<String>,
    pub content: Option<String>,
    pub pieces: Option<u32>,
    pub weight: Option<Decimal>,
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
    pub invoice_number: Option<String>,
    pub declared_value: Option<Decimal>,
    pub po_number: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub transport: Option<Transport>,
    pub estimated_arrival_cr: Option<NaiveDate>,
    pub classification: Option<Classification>,
    pub status: Option<WhrStatus>,
    pub classified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl WhrChanges {
    pub fn touches_dimensions(&self) -> bool {
        self.length.is_some() || self.width.is_some() || self.height.is_some()
    }

    pub fn touches_schedule(&self) -> bool {
        self.departure_date.is_some() || self.transport.is_some()
    }
}

/// Apply a partial update to an entity, recomputing derived fields.
///
/// Both repository implementations funnel updates through here so the
/// recomputation rules live in exactly one place: any dimension change
/// recomputes volume and volume weight; a departure/transport change
/// re-derives the estimated arrival unless the caller supplied one.
pub fn apply_changes(whr: &mut WarehouseReceipt, changes: &WhrChanges, now: DateTime<Utc>) {
    let recompute_metrics = changes.touches_dimensions();
    let recompute_arrival = changes.touches_schedule() && changes.estimated_arrival_cr.is_none();

    if let Some(ref v) = changes.tracking_number {
        whr.tracking_number = v.clone();
    }
    if let Some(ref v) = changes.received_by {
        whr.received_by = v.clone();
    }
    if let Some(ref v) = changes.carrier {
        whr.carrier = v.clone();
    }
    if let Some(ref v) = changes.shipper_name {
        whr.shipper.name = v.clone();
    }
    if changes.shipper_company.is_some() {
        whr.shipper.company = changes.shipper_company.clone();
    }
    if changes.shipper_address.is_some() {
        whr.shipper.address = changes.shipper_address.clone();
    }
    if changes.shipper_phone.is_some() {
        whr.shipper.phone = changes.shipper_phone.clone();
    }
    if let Some(ref v) = changes.consignee_name {
        whr.consignee.name = v.clone();
    }
    if changes.consignee_company.is_some() {
        whr.consignee.company = changes.consignee_company.clone();
    }
    if changes.consignee_address.is_some() {
        whr.consignee.address = changes.consignee_address.clone();
    }
    if changes.consignee_phone.is_some() {
        whr.consignee.phone = changes.consignee_phone.clone();
    }
    if let Some(ref v) = changes.consignee_email {
        whr.consignee.email = v.clone();
    }
    if let Some(ref v) = changes.content {
        whr.content = v.clone();
    }
    if let Some(v) = changes.pieces {
        whr.pieces = v;
    }
    if let Some(v) = changes.weight {
        whr.weight = v;
    }
    if let Some(v) = changes.length {
        whr.length = v;
    }
    if let Some(v) = changes.width {
        whr.width = v;
    }
    if let Some(v) = changes.height {
        whr.height = v;
    }
    if changes.invoice_number.is_some() {
        whr.invoice_number = changes.invoice_number.clone();
    }
    if let Some(v) = changes.declared_value {
        whr.declared_value = v;
    }
    if changes.po_number.is_some() {
        whr.po_number = changes.po_number.clone();
    }
    if changes.departure_date.is_some() {
        whr.departure_date = changes.departure_date;
    }
    if let Some(v) = changes.transport {
        whr.transport = v;
    }
    if changes.estimated_arrival_cr.is_some() {
        whr.estimated_arrival_cr = changes.estimated_arrival_cr;
    }
    if let Some(v) = changes.classification {
        whr.classification = v;
    }
    if let Some(v) = changes.status {
        whr.status = v;
    }
    if changes.classified_at.is_some() {
        whr.classified_at = changes.classified_at;
    }
    if changes.notes.is_some() {
        whr.notes = changes.notes.clone();
    }

    if recompute_metrics {
        whr.volume = shared::camca::volume_cubic_feet(whr.length, whr.width, whr.height);
        whr.volume_weight = shared::camca::volume_weight_lbs(whr.volume);
    }
    if recompute_arrival {
        if let Some(departure) = whr.departure_date {
            whr.estimated_arrival_cr = Some(shared::camca::estimated_arrival(departure, whr.transport));
        }
    }

    whr.updated_at = now;
}

/// Storage contract for warehouse receipts and their tracking trail
#[async_trait]
pub trait WhrRepository: Send + Sync {
    /// Persist a new receipt. Fails with `DuplicateEntry` when the id or
    /// whr_number already exists.
    async fn create(&self, whr: WarehouseReceipt) -> AppResult<WarehouseReceipt>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<WarehouseReceipt>;

    /// Lookup by tracking number or whr number (public tracking path)
    async fn find_by_token(&self, token: &str) -> AppResult<WarehouseReceipt>;

    /// Filtered, paginated listing ordered by arrival_date desc, then
    /// created_at desc, most recently inserted first on full ties. Returns
    /// the page plus the total number of matching records.
    async fn list(
        &self,
        filter: &WhrFilter,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<WarehouseReceipt>, u64)>;

    /// Apply a partial update, recomputing derived fields and updated_at
    async fn update(&self, id: Uuid, changes: WhrChanges) -> AppResult<WarehouseReceipt>;

    /// Set the notification flag. `email_sent_at` is stamped at most once:
    /// check and write happen atomically, so concurrent callers all observe
    /// the same stamp. Already-notified receipts come back unchanged.
    async fn mark_notified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<WarehouseReceipt>;

    /// Hard delete; returns the removed receipt
    async fn delete(&self, id: Uuid) -> AppResult<WarehouseReceipt>;

    /// Substring search over the searchable fields, capped at 10 results,
    /// newest first
    async fn search(&self, token: &str) -> AppResult<Vec<WarehouseReceipt>>;

    /// Single-pass aggregation over receipts created at or after `since`
    async fn aggregate(&self, since: DateTime<Utc>) -> AppResult<StatsSnapshot>;

    /// Next value of the receipt-number sequence. Linearizable: concurrent
    /// callers never observe the same value. Consumed values are not
    /// returned on failure of a subsequent insert.
    async fn next_whr_sequence(&self) -> AppResult<u64>;

    /// Append a tracking event to a receipt's trail
    async fn append_event(&self, whr_id: Uuid, event: TrackingEvent) -> AppResult<()>;

    /// Tracking trail in chronological order
    async fn events_for(&self, whr_id: Uuid) -> AppResult<Vec<TrackingEvent>>;

    /// Every stored receipt, newest first (CSV export)
    async fn all(&self) -> AppResult<Vec<WarehouseReceipt>>;
}

/// Cap applied by `search`
pub const SEARCH_RESULT_LIMIT: usize = 10;
