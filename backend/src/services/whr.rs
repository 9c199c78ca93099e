//! Warehouse receipt service
//!
//! All business rules live here: field validation, receipt-number generation,
//! derived-metric computation, classification, notification flags and the
//! tracking trail. Storage goes through the `WhrRepository` trait so the same
//! rules run against the in-memory and PostgreSQL backends.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Classification, Consignee, PublicTrackingView, Shipper, StatsSnapshot, TrackingEvent,
    Transport, WarehouseReceipt, WhrStatus,
};
use crate::repository::{WhrChanges, WhrFilter, WhrRepository};
use shared::camca;
use shared::types::{Paginated, PaginationMeta};
use shared::validation;

/// Default page size for listings
const DEFAULT_LIST_LIMIT: u32 = 50;

/// Warehouse receipt service
#[derive(Clone)]
pub struct WhrService {
    repo: Arc<dyn WhrRepository>,
}

/// Shipper section of the create payload
#[derive(Debug, Default, Deserialize)]
pub struct ShipperInput {
    pub name: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Consignee section of the create payload
#[derive(Debug, Default, Deserialize)]
pub struct ConsigneeInput {
    pub name: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Input for registering a new warehouse receipt
#[derive(Debug, Default, Deserialize)]
pub struct CreateWhrInput {
    pub tracking_number: Option<String>,
    pub arrival_date: Option<NaiveDate>,
    pub received_by: Option<String>,
    pub carrier: Option<String>,
    #[serde(default)]
    pub shipper: ShipperInput,
    #[serde(default)]
    pub consignee: ConsigneeInput,
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
    pub notes: Option<String>,
}

/// Input for classifying a receipt as AWB or BL
#[derive(Debug, Deserialize)]
pub struct ClassifyWhrInput {
    pub classification: Classification,
    pub transport: Option<Transport>,
    pub departure_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Input for the explicit status-update operation
#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub status: WhrStatus,
}

/// Partial update payload; absent fields are left untouched
#[derive(Debug, Default, Deserialize)]
pub struct UpdateWhrInput {
    pub tracking_number: Option<String>,
    pub received_by: Option<String>,
    pub carrier: Option<String>,
    pub shipper: Option<ShipperInput>,
    pub consignee: Option<ConsigneeInput>,
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
    pub notes: Option<String>,
}

/// Query parameters for the list endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ListWhrQuery {
    pub search: Option<String>,
    pub classification: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Receipt plus its tracking trail
#[derive(Debug, Serialize)]
pub struct WhrWithEvents {
    pub whr: WarehouseReceipt,
    pub tracking_events: Vec<TrackingEvent>,
}

/// Public tracking response
#[derive(Debug, Serialize)]
pub struct PublicTracking {
    pub whr: PublicTrackingView,
    pub tracking_events: Vec<TrackingEvent>,
}

/// Flat row shape used for CSV export
#[derive(Debug, Serialize)]
struct WhrCsvRow {
    whr_number: String,
    tracking_number: String,
    arrival_date: NaiveDate,
    received_by: String,
    carrier: String,
    shipper_name: String,
    consignee_name: String,
    consignee_email: String,
    content: String,
    pieces: u32,
    weight: Decimal,
    volume_cubic_feet: Decimal,
    volume_weight: Decimal,
    declared_value: Decimal,
    classification: String,
    status: String,
    transport: String,
    departure_date: Option<NaiveDate>,
    estimated_arrival_cr: Option<NaiveDate>,
    email_sent: bool,
    created_at: String,
}

impl WhrService {
    pub fn new(repo: Arc<dyn WhrRepository>) -> Self {
        Self { repo }
    }

    /// Register a new receipt.
    ///
    /// Every missing or invalid field is collected before failing so the
    /// caller gets the full list in one response instead of one field per
    /// round trip.
    pub async fn create(&self, input: CreateWhrInput) -> AppResult<WarehouseReceipt> {
        let mut errors: Vec<String> = Vec::new();

        let tracking_number = Self::required(&input.tracking_number, "tracking_number", &mut errors);
        let received_by = Self::required(&input.received_by, "received_by", &mut errors);
        let carrier = Self::required(&input.carrier, "carrier", &mut errors);
        let shipper_name = Self::required(&input.shipper.name, "shipper.name", &mut errors);
        let consignee_name = Self::required(&input.consignee.name, "consignee.name", &mut errors);
        let content = Self::required(&input.content, "content", &mut errors);

        let consignee_email = match input.consignee.email.as_deref().map(str::trim) {
            Some(email) if validation::validate_email(email).is_ok() => email.to_string(),
            Some(_) => {
                errors.push("consignee.email is invalid".to_string());
                String::new()
            }
            None => {
                errors.push("consignee.email is required".to_string());
                String::new()
            }
        };

        let weight = Self::required_amount(input.weight, "weight", &mut errors);
        let length = Self::required_amount(input.length, "length", &mut errors);
        let width = Self::required_amount(input.width, "width", &mut errors);
        let height = Self::required_amount(input.height, "height", &mut errors);

        let pieces = input.pieces.unwrap_or(1);
        if pieces < 1 {
            errors.push("pieces must be at least 1".to_string());
        }

        let declared_value = input.declared_value.unwrap_or(Decimal::ZERO);
        if validation::validate_non_negative(declared_value).is_err() {
            errors.push("declared_value must not be negative".to_string());
        }

        if !errors.is_empty() {
            return Err(AppError::ValidationError(errors.join(", ")));
        }

        let now = Utc::now();
        let arrival_date = input.arrival_date.unwrap_or_else(|| now.date_naive());

        let sequence = self.repo.next_whr_sequence().await?;
        let whr_number = camca::format_whr_number(now.date_naive(), sequence);

        let volume = camca::volume_cubic_feet(length, width, height);
        let volume_weight = camca::volume_weight_lbs(volume);

        let transport = input.transport.unwrap_or_default();
        let estimated_arrival_cr = input.estimated_arrival_cr.or_else(|| {
            input
                .departure_date
                .map(|departure| camca::estimated_arrival(departure, transport))
        });

        let whr = WarehouseReceipt {
            id: Uuid::new_v4(),
            whr_number,
            tracking_number,
            arrival_date,
            received_by,
            carrier,
            shipper: Shipper {
                name: shipper_name,
                company: input.shipper.company,
                address: input.shipper.address,
                phone: input.shipper.phone,
            },
            consignee: Consignee {
                name: consignee_name,
                company: input.consignee.company,
                address: input.consignee.address,
                phone: input.consignee.phone,
                email: consignee_email,
            },
            content,
            pieces,
            weight,
            length,
            width,
            height,
            volume,
            volume_weight,
            invoice_number: input.invoice_number,
            declared_value,
            po_number: input.po_number,
            departure_date: input.departure_date,
            transport,
            estimated_arrival_cr,
            classification: Classification::Pending,
            status: WhrStatus::EnMiami,
            email_sent: false,
            email_sent_at: None,
            classified_at: None,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(whr).await?;
        self.repo
            .append_event(created.id, TrackingEvent::received(now))
            .await?;

        tracing::info!(whr_number = %created.whr_number, "WHR created");
        Ok(created)
    }

    /// Fetch a receipt with its tracking trail
    pub async fn get(&self, id: Uuid) -> AppResult<WhrWithEvents> {
        let whr = self.repo.get_by_id(id).await?;
        let tracking_events = self.repo.events_for(id).await?;
        Ok(WhrWithEvents {
            whr,
            tracking_events,
        })
    }

    /// Classify a receipt as AWB (air) or BL (sea)
    pub async fn classify(&self, id: Uuid, input: ClassifyWhrInput) -> AppResult<WarehouseReceipt> {
        if input.classification == Classification::Pending {
            return Err(AppError::Validation {
                field: "classification".to_string(),
                message: "classification must be awb or bl".to_string(),
                message_es: "La clasificación debe ser awb o bl".to_string(),
            });
        }

        let now = Utc::now();
        let transport = input
            .transport
            .unwrap_or_else(|| Transport::implied_by(input.classification));

        let changes = WhrChanges {
            classification: Some(input.classification),
            transport: Some(transport),
            departure_date: input.departure_date,
            classified_at: Some(now),
            notes: input.notes,
            ..Default::default()
        };

        let updated = self.repo.update(id, changes).await?;
        self.repo
            .append_event(id, TrackingEvent::classified(input.classification, now))
            .await?;

        tracing::info!(
            whr_number = %updated.whr_number,
            classification = updated.classification.as_str(),
            "WHR classified"
        );
        Ok(updated)
    }

    /// Mark the consignee as notified. The repository stamps `email_sent_at`
    /// atomically, so the timestamp is set exactly once no matter how many
    /// callers race; already-notified receipts come back unchanged.
    pub async fn mark_notified(&self, id: Uuid) -> AppResult<WarehouseReceipt> {
        self.repo.mark_notified(id, Utc::now()).await
    }

    /// Move a receipt to a new shipment status
    pub async fn update_status(&self, id: Uuid, status: WhrStatus) -> AppResult<WarehouseReceipt> {
        let now = Utc::now();
        let changes = WhrChanges {
            status: Some(status),
            ..Default::default()
        };
        let updated = self.repo.update(id, changes).await?;
        self.repo
            .append_event(id, TrackingEvent::status_changed(status, now))
            .await?;
        Ok(updated)
    }

    /// Partial update; derived metrics and the estimated arrival are
    /// recomputed by the repository when their inputs change.
    pub async fn update(&self, id: Uuid, input: UpdateWhrInput) -> AppResult<WarehouseReceipt> {
        let mut errors: Vec<String> = Vec::new();

        for (value, field) in [
            (input.weight, "weight"),
            (input.length, "length"),
            (input.width, "width"),
            (input.height, "height"),
            (input.declared_value, "declared_value"),
        ] {
            if let Some(v) = value {
                if validation::validate_non_negative(v).is_err() {
                    errors.push(format!("{} must not be negative", field));
                }
            }
        }
        if let Some(pieces) = input.pieces {
            if pieces < 1 {
                errors.push("pieces must be at least 1".to_string());
            }
        }
        if let Some(consignee) = &input.consignee {
            if let Some(email) = consignee.email.as_deref() {
                if validation::validate_email(email.trim()).is_err() {
                    errors.push("consignee.email is invalid".to_string());
                }
            }
        }
        if !errors.is_empty() {
            return Err(AppError::ValidationError(errors.join(", ")));
        }

        let (shipper_name, shipper_company, shipper_address, shipper_phone) = match input.shipper {
            Some(s) => (s.name, s.company, s.address, s.phone),
            None => (None, None, None, None),
        };
        let (consignee_name, consignee_company, consignee_address, consignee_phone, consignee_email) =
            match input.consignee {
                Some(c) => (c.name, c.company, c.address, c.phone, c.email),
                None => (None, None, None, None, None),
            };

        let changes = WhrChanges {
            tracking_number: input.tracking_number,
            received_by: input.received_by,
            carrier: input.carrier,
            shipper_name,
            shipper_company,
            shipper_address,
            shipper_phone,
            consignee_name,
            consignee_company,
            consignee_address,
            consignee_phone,
            consignee_email,
            content: input.content,
            pieces: input.pieces,
            weight: input.weight,
            length: input.length,
            width: input.width,
            height: input.height,
            invoice_number: input.invoice_number,
            declared_value: input.declared_value,
            po_number: input.po_number,
            departure_date: input.departure_date,
            transport: input.transport,
            estimated_arrival_cr: input.estimated_arrival_cr,
            notes: input.notes,
            ..Default::default()
        };

        self.repo.update(id, changes).await
    }

    /// Hard delete; returns the removed receipt
    pub async fn delete(&self, id: Uuid) -> AppResult<WarehouseReceipt> {
        let removed = self.repo.delete(id).await?;
        tracing::info!(whr_number = %removed.whr_number, "WHR deleted");
        Ok(removed)
    }

    /// Filtered, paginated listing
    pub async fn list(&self, query: ListWhrQuery) -> AppResult<Paginated<WarehouseReceipt>> {
        let classification = match query.classification.as_deref() {
            Some(raw) => Some(Classification::from_str(raw).ok_or_else(|| {
                AppError::ValidationError(format!("unknown classification: {}", raw))
            })?),
            None => None,
        };
        let status = match query.status.as_deref() {
            Some(raw) => Some(
                WhrStatus::from_str(raw)
                    .ok_or_else(|| AppError::ValidationError(format!("unknown status: {}", raw)))?,
            ),
            None => None,
        };

        let filter = WhrFilter {
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            classification,
            status,
            date_from: query.date_from,
            date_to: query.date_to,
        };

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let (items, total) = self.repo.list(&filter, limit, offset).await?;
        Ok(Paginated {
            items,
            pagination: PaginationMeta::new(total, limit, offset),
        })
    }

    /// Quick search over the searchable fields; at least 3 characters
    pub async fn search(&self, q: &str) -> AppResult<Vec<WarehouseReceipt>> {
        let token = q.trim();
        if validation::validate_search_token(token).is_err() {
            return Err(AppError::ValidationError(format!(
                "search term must be at least {} characters",
                validation::MIN_SEARCH_LENGTH
            )));
        }
        self.repo.search(token).await
    }

    /// Public tracking lookup by tracking number or WHR number
    pub async fn public_track(&self, token: &str) -> AppResult<PublicTracking> {
        let whr = self.repo.find_by_token(token.trim()).await?;
        let tracking_events = self.repo.events_for(whr.id).await?;
        Ok(PublicTracking {
            whr: whr.public_view(),
            tracking_events,
        })
    }

    /// Aggregate statistics over the last `days` days
    pub async fn stats(&self, days: i64) -> AppResult<StatsSnapshot> {
        if days < 1 {
            return Err(AppError::ValidationError(
                "days must be at least 1".to_string(),
            ));
        }
        let since = Utc::now() - Duration::days(days);
        let mut snapshot = self.repo.aggregate(since).await?;
        snapshot.date_range_days = days;
        Ok(snapshot)
    }

    /// Export every receipt as CSV, newest first
    pub async fn export_csv(&self) -> AppResult<String> {
        let records = self.repo.all().await?;

        let mut wtr = csv::Writer::from_writer(vec![]);
        for whr in &records {
            let row = WhrCsvRow {
                whr_number: whr.whr_number.clone(),
                tracking_number: whr.tracking_number.clone(),
                arrival_date: whr.arrival_date,
                received_by: whr.received_by.clone(),
                carrier: whr.carrier.clone(),
                shipper_name: whr.shipper.name.clone(),
                consignee_name: whr.consignee.name.clone(),
                consignee_email: whr.consignee.email.clone(),
                content: whr.content.clone(),
                pieces: whr.pieces,
                weight: whr.weight,
                volume_cubic_feet: whr.volume,
                volume_weight: whr.volume_weight,
                declared_value: whr.declared_value,
                classification: whr.classification.as_str().to_string(),
                status: whr.status.as_str().to_string(),
                transport: whr.transport.as_str().to_string(),
                departure_date: whr.departure_date,
                estimated_arrival_cr: whr.estimated_arrival_cr,
                email_sent: whr.email_sent,
                created_at: whr.created_at.to_rfc3339(),
            };
            wtr.serialize(row)
                .map_err(|e| AppError::Internal(format!("CSV serialization failed: {}", e)))?;
        }

        let csv_data = String::from_utf8(
            wtr.into_inner()
                .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?,
        )
        .map_err(|e| AppError::Internal(format!("CSV encoding error: {}", e)))?;

        Ok(csv_data)
    }

    fn required(value: &Option<String>, field: &str, errors: &mut Vec<String>) -> String {
        match validation::validate_required(value.as_deref()) {
            Ok(()) => value.as_deref().map(str::trim).unwrap_or_default().to_string(),
            Err(_) => {
                errors.push(format!("{} is required", field));
                String::new()
            }
        }
    }

    fn required_amount(value: Option<Decimal>, field: &str, errors: &mut Vec<String>) -> Decimal {
        match value {
            Some(v) if validation::validate_non_negative(v).is_ok() => v,
            Some(_) => {
                errors.push(format!("{} must not be negative", field));
                Decimal::ZERO
            }
            None => {
                errors.push(format!("{} is required", field));
                Decimal::ZERO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryWhrRepository;
    use std::collections::HashSet;

    fn service() -> WhrService {
        WhrService::new(Arc::new(InMemoryWhrRepository::new()))
    }

    fn valid_input(tracking: &str) -> CreateWhrInput {
        CreateWhrInput {
            tracking_number: Some(tracking.to_string()),
            received_by: Some("Carlos".to_string()),
            carrier: Some("FedEx".to_string()),
            shipper: ShipperInput {
                name: Some("Amazon".to_string()),
                ..Default::default()
            },
            consignee: ConsigneeInput {
                name: Some("María Rodríguez".to_string()),
                email: Some("maria@example.com".to_string()),
                ..Default::default()
            },
            content: Some("Electrónicos".to_string()),
            weight: Some(Decimal::from(50)),
            length: Some(Decimal::from(10)),
            width: Some(Decimal::from(10)),
            height: Some(Decimal::from(10)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_computes_metrics_and_number() {
        let service = service();
        let whr = service.create(valid_input("TRK-001")).await.unwrap();

        // 10 x 10 x 10 in => 1000 * 0.000578746 ft3
        assert_eq!(whr.volume, Decimal::new(578_746, 6));
        assert_eq!(whr.volume_weight, Decimal::new(6_019, 3));

        let expected_prefix = format!("WHR{}", Utc::now().date_naive().format("%y%m%d"));
        assert!(whr.whr_number.starts_with(&expected_prefix));
        assert!(whr.whr_number.ends_with("0001"));

        assert_eq!(whr.classification, Classification::Pending);
        assert_eq!(whr.status, WhrStatus::EnMiami);
        assert!(!whr.email_sent);

        let detail = service.get(whr.id).await.unwrap();
        assert_eq!(detail.tracking_events.len(), 1);
        assert_eq!(detail.tracking_events[0].event_type, "created");
    }

    #[tokio::test]
    async fn create_collects_all_validation_errors() {
        let service = service();
        let err = service.create(CreateWhrInput::default()).await.unwrap_err();

        match err {
            AppError::ValidationError(msg) => {
                for field in [
                    "tracking_number",
                    "received_by",
                    "carrier",
                    "shipper.name",
                    "consignee.name",
                    "consignee.email",
                    "content",
                    "weight",
                    "length",
                    "width",
                    "height",
                ] {
                    assert!(msg.contains(field), "missing {} in: {}", field, msg);
                }
            }
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_rejects_negative_dimensions() {
        let service = service();
        let mut input = valid_input("TRK-NEG");
        input.weight = Some(Decimal::from(-1));
        input.declared_value = Some(Decimal::from(-5));

        let err = service.create(input).await.unwrap_err();
        match err {
            AppError::ValidationError(msg) => {
                assert!(msg.contains("weight must not be negative"));
                assert!(msg.contains("declared_value must not be negative"));
            }
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn classify_awb_defaults_to_air_transport() {
        let service = service();
        let whr = service.create(valid_input("TRK-AWB")).await.unwrap();

        let departure = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let updated = service
            .classify(
                whr.id,
                ClassifyWhrInput {
                    classification: Classification::Awb,
                    transport: None,
                    departure_date: Some(departure),
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.classification, Classification::Awb);
        assert_eq!(updated.transport, Transport::Air);
        assert_eq!(
            updated.estimated_arrival_cr,
            Some(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap())
        );
        assert!(updated.classified_at.is_some());

        let detail = service.get(whr.id).await.unwrap();
        assert!(detail
            .tracking_events
            .iter()
            .any(|e| e.event_type == "classified"));
    }

    #[tokio::test]
    async fn classify_bl_defaults_to_sea_transport() {
        let service = service();
        let whr = service.create(valid_input("TRK-BL")).await.unwrap();

        let departure = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let updated = service
            .classify(
                whr.id,
                ClassifyWhrInput {
                    classification: Classification::Bl,
                    transport: None,
                    departure_date: Some(departure),
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.transport, Transport::Sea);
        assert_eq!(
            updated.estimated_arrival_cr,
            Some(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
    }

    #[tokio::test]
    async fn classify_transport_override_wins() {
        let service = service();
        let whr = service.create(valid_input("TRK-OVR")).await.unwrap();

        let updated = service
            .classify(
                whr.id,
                ClassifyWhrInput {
                    classification: Classification::Bl,
                    transport: Some(Transport::Air),
                    departure_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.classification, Classification::Bl);
        assert_eq!(updated.transport, Transport::Air);
    }

    #[tokio::test]
    async fn classify_to_pending_is_rejected_as_validation_error() {
        let service = service();
        let whr = service.create(valid_input("TRK-PEND")).await.unwrap();

        let err = service
            .classify(
                whr.id,
                ClassifyWhrInput {
                    classification: Classification::Pending,
                    transport: None,
                    departure_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();

        match err {
            AppError::Validation { field, .. } => assert_eq!(field, "classification"),
            other => panic!("expected field validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn classify_unknown_id_is_not_found() {
        let service = service();
        let err = service
            .classify(
                Uuid::new_v4(),
                ClassifyWhrInput {
                    classification: Classification::Awb,
                    transport: None,
                    departure_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_notified_is_idempotent() {
        let service = service();
        let whr = service.create(valid_input("TRK-MAIL")).await.unwrap();

        let first = service.mark_notified(whr.id).await.unwrap();
        assert!(first.email_sent);
        let sent_at = first.email_sent_at;
        assert!(sent_at.is_some());

        let second = service.mark_notified(whr.id).await.unwrap();
        assert_eq!(second.email_sent_at, sent_at);
        assert_eq!(second.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn concurrent_notifications_stamp_exactly_once() {
        let service = service();
        let whr = service.create(valid_input("TRK-RACE")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            let id = whr.id;
            handles.push(tokio::spawn(async move { service.mark_notified(id).await }));
        }

        let mut stamps = HashSet::new();
        for handle in handles {
            let notified = handle.await.unwrap().unwrap();
            assert!(notified.email_sent);
            stamps.insert(notified.email_sent_at.unwrap());
        }
        assert_eq!(stamps.len(), 1, "email_sent_at stamped more than once");
    }

    #[tokio::test]
    async fn update_status_appends_event() {
        let service = service();
        let whr = service.create(valid_input("TRK-ST")).await.unwrap();

        let updated = service
            .update_status(whr.id, WhrStatus::EnTransito)
            .await
            .unwrap();
        assert_eq!(updated.status, WhrStatus::EnTransito);

        let detail = service.get(whr.id).await.unwrap();
        let event = detail
            .tracking_events
            .iter()
            .find(|e| e.event_type == "status_updated")
            .unwrap();
        assert!(event.description.contains("En Tránsito"));
    }

    #[tokio::test]
    async fn update_recomputes_derived_metrics() {
        let service = service();
        let whr = service.create(valid_input("TRK-UPD")).await.unwrap();

        let updated = service
            .update(
                whr.id,
                UpdateWhrInput {
                    length: Some(Decimal::from(20)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // 20 x 10 x 10 in => 2000 * 0.000578746 ft3
        assert_eq!(updated.volume, Decimal::new(1_157_492, 6));
        assert_eq!(updated.volume_weight, Decimal::new(12_038, 3));
    }

    #[tokio::test]
    async fn update_re_derives_estimated_arrival() {
        let service = service();
        let whr = service.create(valid_input("TRK-ETA")).await.unwrap();

        let departure = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let updated = service
            .update(
                whr.id,
                UpdateWhrInput {
                    departure_date: Some(departure),
                    transport: Some(Transport::Sea),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            updated.estimated_arrival_cr,
            Some(NaiveDate::from_ymd_opt(2024, 6, 24).unwrap())
        );
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let service = service();
        let whr = service.create(valid_input("TRK-DEL")).await.unwrap();

        let removed = service.delete(whr.id).await.unwrap();
        assert_eq!(removed.id, whr.id);

        let err = service.get(whr.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_pagination_partitions_the_collection() {
        let service = service();
        for i in 0..5 {
            let mut input = valid_input(&format!("TRK-PAGE-{}", i));
            input.arrival_date = NaiveDate::from_ymd_opt(2024, 1, 10 + i);
            service.create(input).await.unwrap();
        }

        let mut seen = HashSet::new();
        for offset in [0, 2, 4] {
            let page = service
                .list(ListWhrQuery {
                    limit: Some(2),
                    offset: Some(offset),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(page.pagination.total, 5);
            assert_eq!(page.pagination.has_more, offset + 2 < 5);
            for whr in page.items {
                assert!(seen.insert(whr.id), "page overlap at offset {}", offset);
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn list_orders_by_arrival_date_desc() {
        let service = service();
        for (i, day) in [5u32, 20, 10].iter().enumerate() {
            let mut input = valid_input(&format!("TRK-ORD-{}", i));
            input.arrival_date = NaiveDate::from_ymd_opt(2024, 2, *day);
            service.create(input).await.unwrap();
        }

        let page = service.list(ListWhrQuery::default()).await.unwrap();
        let days: Vec<u32> = page
            .items
            .iter()
            .map(|w| w.arrival_date.format("%d").to_string().parse().unwrap())
            .collect();
        assert_eq!(days, vec![20, 10, 5]);
    }

    #[tokio::test]
    async fn list_filters_by_classification() {
        let service = service();
        let a = service.create(valid_input("TRK-FA")).await.unwrap();
        service.create(valid_input("TRK-FB")).await.unwrap();
        service
            .classify(
                a.id,
                ClassifyWhrInput {
                    classification: Classification::Awb,
                    transport: None,
                    departure_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let page = service
            .list(ListWhrQuery {
                classification: Some("awb".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, a.id);

        let err = service
            .list(ListWhrQuery {
                classification: Some("AWB".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn search_requires_three_characters() {
        let service = service();
        let err = service.search("ab").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn search_matches_any_field() {
        let service = service();
        service.create(valid_input("ZXQ-777")).await.unwrap();

        // tracking number
        assert_eq!(service.search("zxq").await.unwrap().len(), 1);
        // consignee name
        assert_eq!(service.search("rodríguez").await.unwrap().len(), 1);
        // content
        assert_eq!(service.search("electr").await.unwrap().len(), 1);
        // no match
        assert!(service.search("nothing-here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn public_track_returns_reduced_view() {
        let service = service();
        let whr = service.create(valid_input("TRK-PUB")).await.unwrap();

        let by_tracking = service.public_track("TRK-PUB").await.unwrap();
        assert_eq!(by_tracking.whr.whr_number, whr.whr_number);
        assert_eq!(by_tracking.whr.status_display, "En Miami");
        assert_eq!(by_tracking.tracking_events.len(), 1);

        let by_number = service.public_track(&whr.whr_number).await.unwrap();
        assert_eq!(by_number.whr.tracking_number, "TRK-PUB");

        let err = service.public_track("UNKNOWN").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_counts_and_averages() {
        let service = service();
        let a = service.create(valid_input("TRK-S1")).await.unwrap();
        service.create(valid_input("TRK-S2")).await.unwrap();
        service
            .classify(
                a.id,
                ClassifyWhrInput {
                    classification: Classification::Bl,
                    transport: None,
                    departure_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        service.mark_notified(a.id).await.unwrap();

        let stats = service.stats(30).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.bl, 1);
        assert_eq!(stats.emails_pending, 1);
        assert_eq!(stats.in_miami, 2);
        assert_eq!(stats.by_sea, 1);
        assert_eq!(stats.avg_weight, Decimal::from(50));
        assert_eq!(stats.date_range_days, 30);
        assert!(stats.last_whr_created.is_some());
    }

    #[tokio::test]
    async fn stats_empty_window_has_zero_averages() {
        let service = service();
        let stats = service.stats(7).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.avg_weight, Decimal::ZERO);
        assert_eq!(stats.avg_volume, Decimal::ZERO);
        assert!(stats.last_whr_created.is_none());

        let err = service.stats(0).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn concurrent_creates_issue_unique_numbers() {
        let service = service();
        let mut handles = Vec::new();
        for i in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.create(valid_input(&format!("TRK-C{}", i))).await
            }));
        }

        let mut numbers = HashSet::new();
        for handle in handles {
            let whr = handle.await.unwrap().unwrap();
            assert!(numbers.insert(whr.whr_number.clone()), "duplicate number");
        }
        assert_eq!(numbers.len(), 10);
    }

    #[tokio::test]
    async fn export_csv_contains_every_receipt() {
        let service = service();
        let a = service.create(valid_input("TRK-CSV1")).await.unwrap();
        let b = service.create(valid_input("TRK-CSV2")).await.unwrap();

        let csv_data = service.export_csv().await.unwrap();
        assert!(csv_data.contains(&a.whr_number));
        assert!(csv_data.contains(&b.whr_number));
        assert!(csv_data.lines().next().unwrap().contains("whr_number"));
        assert_eq!(csv_data.lines().count(), 3);
    }
}
