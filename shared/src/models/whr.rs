//! Warehouse receipt (WHR) entity and related types
//!
//! A WHR is the record created when a shipment arrives at the Miami
//! consolidation warehouse. Its volume and volume weight are always derived
//! from the stored dimensions and are never caller-supplied.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Onward classification of a receipt: pending until an operator assigns it
/// to an Air Waybill or a Bill of Lading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    #[default]
    Pending,
    Awb,
    Bl,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Pending => "pending",
            Classification::Awb => "awb",
            Classification::Bl => "bl",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Classification::Pending),
            "awb" => Some(Classification::Awb),
            "bl" => Some(Classification::Bl),
            _ => None,
        }
    }

    /// Display label used by the operations dashboard
    pub fn display_es(&self) -> &'static str {
        match self {
            Classification::Pending => "Pendiente",
            Classification::Awb => "AWB (Aéreo)",
            Classification::Bl => "BL (Marítimo)",
        }
    }
}

/// Warehouse handling status, driven by explicit status updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WhrStatus {
    #[default]
    EnMiami,
    PorAire,
    PorMar,
    EnTransito,
    Entregado,
}

impl WhrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhrStatus::EnMiami => "en_miami",
            WhrStatus::PorAire => "por_aire",
            WhrStatus::PorMar => "por_mar",
            WhrStatus::EnTransito => "en_transito",
            WhrStatus::Entregado => "entregado",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "en_miami" => Some(WhrStatus::EnMiami),
            "por_aire" => Some(WhrStatus::PorAire),
            "por_mar" => Some(WhrStatus::PorMar),
            "en_transito" => Some(WhrStatus::EnTransito),
            "entregado" => Some(WhrStatus::Entregado),
            _ => None,
        }
    }

    pub fn display_es(&self) -> &'static str {
        match self {
            WhrStatus::EnMiami => "En Miami",
            WhrStatus::PorAire => "Por Aire",
            WhrStatus::PorMar => "Por Mar",
            WhrStatus::EnTransito => "En Tránsito",
            WhrStatus::Entregado => "Entregado",
        }
    }
}

/// Onward transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    #[default]
    Air,
    Sea,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Air => "air",
            Transport::Sea => "sea",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "air" => Some(Transport::Air),
            "sea" => Some(Transport::Sea),
            _ => None,
        }
    }

    /// Transport mode implied by a classification (awb flies, bl sails)
    pub fn implied_by(classification: Classification) -> Self {
        match classification {
            Classification::Bl => Transport::Sea,
            _ => Transport::Air,
        }
    }
}

/// Originating party of the shipment
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Shipper {
    pub name: String,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Receiving party in Costa Rica; email is required for arrival notices
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Consignee {
    pub name: String,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: String,
}

/// The warehouse receipt entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarehouseReceipt {
    pub id: Uuid,
    pub whr_number: String,
    pub tracking_number: String,
    pub arrival_date: NaiveDate,
    pub received_by: String,
    pub carrier: String,
    pub shipper: Shipper,
    pub consignee: Consignee,
    pub content: String,
    pub pieces: u32,
    /// Actual weight in pounds
    pub weight: Decimal,
    /// Dimensions in inches
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    /// Derived: cubic feet, recomputed whenever dimensions change
    pub volume: Decimal,
    /// Derived: chargeable weight proxy in pounds
    pub volume_weight: Decimal,
    pub invoice_number: Option<String>,
    pub declared_value: Decimal,
    pub po_number: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub transport: Transport,
    pub estimated_arrival_cr: Option<NaiveDate>,
    pub classification: Classification,
    pub status: WhrStatus,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub classified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WarehouseReceipt {
    /// Case-insensitive substring match over the searchable fields:
    /// whr_number, tracking_number, consignee name, shipper name, content.
    pub fn matches_search(&self, needle_lower: &str) -> bool {
        self.whr_number.to_lowercase().contains(needle_lower)
            || self.tracking_number.to_lowercase().contains(needle_lower)
            || self.consignee.name.to_lowercase().contains(needle_lower)
            || self.shipper.name.to_lowercase().contains(needle_lower)
            || self.content.to_lowercase().contains(needle_lower)
    }

    /// Reduced view for the unauthenticated tracking endpoint: no internal
    /// ids, no financial fields.
    pub fn public_view(&self) -> PublicTrackingView {
        PublicTrackingView {
            whr_number: self.whr_number.clone(),
            tracking_number: self.tracking_number.clone(),
            status: self.status,
            status_display: self.status.display_es().to_string(),
            classification: self.classification,
            consignee_name: self.consignee.name.clone(),
            arrival_date: self.arrival_date,
            departure_date: self.departure_date,
            estimated_arrival_cr: self.estimated_arrival_cr,
        }
    }
}

/// Append-only tracking trail entry for a receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingEvent {
    pub event_type: String,
    pub description: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl TrackingEvent {
    pub fn received(at: DateTime<Utc>) -> Self {
        Self {
            event_type: "created".to_string(),
            description: "Paquete recibido en Miami".to_string(),
            location: "Miami, FL".to_string(),
            created_at: at,
        }
    }

    pub fn classified(classification: Classification, at: DateTime<Utc>) -> Self {
        Self {
            event_type: "classified".to_string(),
            description: format!("Clasificado como {}", classification.display_es()),
            location: "Miami, FL".to_string(),
            created_at: at,
        }
    }

    pub fn status_changed(status: WhrStatus, at: DateTime<Utc>) -> Self {
        Self {
            event_type: "status_updated".to_string(),
            description: format!("Estado actualizado: {}", status.display_es()),
            location: "Miami, FL".to_string(),
            created_at: at,
        }
    }
}

/// Public tracking lookup response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicTrackingView {
    pub whr_number: String,
    pub tracking_number: String,
    pub status: WhrStatus,
    pub status_display: String,
    pub classification: Classification,
    pub consignee_name: String,
    pub arrival_date: NaiveDate,
    pub departure_date: Option<NaiveDate>,
    pub estimated_arrival_cr: Option<NaiveDate>,
}

/// Aggregate counters over the receipts created in a recent window
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub total: u64,
    pub pending: u64,
    pub awb: u64,
    pub bl: u64,
    pub emails_pending: u64,
    pub in_miami: u64,
    pub por_aire: u64,
    pub por_mar: u64,
    pub in_transit: u64,
    pub delivered: u64,
    pub by_air: u64,
    pub by_sea: u64,
    pub total_weight: Decimal,
    pub total_value: Decimal,
    pub total_pieces: u64,
    pub avg_weight: Decimal,
    pub avg_volume: Decimal,
    pub last_whr_created: Option<DateTime<Utc>>,
    pub date_range_days: i64,
}
