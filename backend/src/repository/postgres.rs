//! PostgreSQL repository implementation
//!
//! Receipts live in the `whrs` table (unique constraint on `whr_number`,
//! monotonic `row_seq` for insertion order); tracking events are append-only
//! rows in `whr_tracking_events`. The receipt-number sequence is a database
//! sequence, so concurrent creations never observe the same value.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Classification, Consignee, Shipper, StatsSnapshot, TrackingEvent, Transport, WarehouseReceipt,
    WhrStatus,
};
use crate::repository::{apply_changes, WhrChanges, WhrFilter, WhrRepository, SEARCH_RESULT_LIMIT};

const WHR_COLUMNS: &str = "id, whr_number, tracking_number, arrival_date, received_by, carrier, \
     shipper_name, shipper_company, shipper_address, shipper_phone, \
     consignee_name, consignee_company, consignee_address, consignee_phone, consignee_email, \
     content, pieces, weight, length_inches, width_inches, height_inches, \
     volume_cubic_feet, volume_weight, invoice_number, declared_value, po_number, \
     departure_date, transport, estimated_arrival_cr, classification, status, \
     email_sent, email_sent_at, classified_at, notes, created_at, updated_at";

/// Flat row shape of the `whrs` table
#[derive(Debug, sqlx::FromRow)]
struct WhrRow {
    id: Uuid,
    whr_number: String,
    tracking_number: String,
    arrival_date: NaiveDate,
    received_by: String,
    carrier: String,
    shipper_name: String,
    shipper_company: Option<String>,
    shipper_address: Option<String>,
    shipper_phone: Option<String>,
    consignee_name: String,
    consignee_company: Option<String>,
    consignee_address: Option<String>,
    consignee_phone: Option<String>,
    consignee_email: String,
    content: String,
    pieces: i32,
    weight: Decimal,
    length_inches: Decimal,
    width_inches: Decimal,
    height_inches: Decimal,
    volume_cubic_feet: Decimal,
    volume_weight: Decimal,
    invoice_number: Option<String>,
    declared_value: Decimal,
    po_number: Option<String>,
    departure_date: Option<NaiveDate>,
    transport: String,
    estimated_arrival_cr: Option<NaiveDate>,
    classification: String,
    status: String,
    email_sent: bool,
    email_sent_at: Option<DateTime<Utc>>,
    classified_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WhrRow {
    fn into_entity(self) -> AppResult<WarehouseReceipt> {
        let transport = Transport::from_str(&self.transport)
            .ok_or_else(|| AppError::Internal(format!("bad transport value: {}", self.transport)))?;
        let classification = Classification::from_str(&self.classification).ok_or_else(|| {
            AppError::Internal(format!("bad classification value: {}", self.classification))
        })?;
        let status = WhrStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("bad status value: {}", self.status)))?;

        Ok(WarehouseReceipt {
            id: self.id,
            whr_number: self.whr_number,
            tracking_number: self.tracking_number,
            arrival_date: self.arrival_date,
            received_by: self.received_by,
            carrier: self.carrier,
            shipper: Shipper {
                name: self.shipper_name,
                company: self.shipper_company,
                address: self.shipper_address,
                phone: self.shipper_phone,
            },
            consignee: Consignee {
                name: self.consignee_name,
                company: self.consignee_company,
                address: self.consignee_address,
                phone: self.consignee_phone,
                email: self.consignee_email,
            },
            content: self.content,
            pieces: self.pieces.max(0) as u32,
            weight: self.weight,
            length: self.length_inches,
            width: self.width_inches,
            height: self.height_inches,
            volume: self.volume_cubic_feet,
            volume_weight: self.volume_weight,
            invoice_number: self.invoice_number,
            declared_value: self.declared_value,
            po_number: self.po_number,
            departure_date: self.departure_date,
            transport,
            estimated_arrival_cr: self.estimated_arrival_cr,
            classification,
            status,
            email_sent: self.email_sent,
            email_sent_at: self.email_sent_at,
            classified_at: self.classified_at,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total: i64,
    pending: i64,
    awb: i64,
    bl: i64,
    emails_pending: i64,
    in_miami: i64,
    por_aire: i64,
    por_mar: i64,
    in_transit: i64,
    delivered: i64,
    by_air: i64,
    by_sea: i64,
    total_weight: Decimal,
    total_value: Decimal,
    total_pieces: i64,
    avg_weight: Decimal,
    avg_volume: Decimal,
    last_whr_created: Option<DateTime<Utc>>,
}

/// Repository backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PostgresWhrRepository {
    db: PgPool,
}

impl PostgresWhrRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &WhrFilter) {
        if let Some(ref search) = filter.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (whr_number ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR tracking_number ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR consignee_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR shipper_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR content ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(classification) = filter.classification {
            qb.push(" AND classification = ")
                .push_bind(classification.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.date_from {
            qb.push(" AND arrival_date >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND arrival_date <= ").push_bind(to);
        }
    }

    /// Map unique-constraint violations on whr_number/id to DuplicateEntry
    fn map_insert_error(err: sqlx::Error) -> AppError {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                let field = if db_err.constraint() == Some("whrs_whr_number_key") {
                    "whr_number"
                } else {
                    "id"
                };
                return AppError::DuplicateEntry(field.to_string());
            }
        }
        AppError::DatabaseError(err)
    }
}

#[async_trait]
impl WhrRepository for PostgresWhrRepository {
    async fn create(&self, whr: WarehouseReceipt) -> AppResult<WarehouseReceipt> {
        let row = sqlx::query_as::<_, WhrRow>(&format!(
            r#"
            INSERT INTO whrs (
                id, whr_number, tracking_number, arrival_date, received_by, carrier,
                shipper_name, shipper_company, shipper_address, shipper_phone,
                consignee_name, consignee_company, consignee_address, consignee_phone, consignee_email,
                content, pieces, weight, length_inches, width_inches, height_inches,
                volume_cubic_feet, volume_weight, invoice_number, declared_value, po_number,
                departure_date, transport, estimated_arrival_cr, classification, status,
                email_sent, email_sent_at, classified_at, notes, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32,
                $33, $34, $35, $36, $37
            )
            RETURNING {WHR_COLUMNS}
            "#
        ))
        .bind(whr.id)
        .bind(&whr.whr_number)
        .bind(&whr.tracking_number)
        .bind(whr.arrival_date)
        .bind(&whr.received_by)
        .bind(&whr.carrier)
        .bind(&whr.shipper.name)
        .bind(&whr.shipper.company)
        .bind(&whr.shipper.address)
        .bind(&whr.shipper.phone)
        .bind(&whr.consignee.name)
        .bind(&whr.consignee.company)
        .bind(&whr.consignee.address)
        .bind(&whr.consignee.phone)
        .bind(&whr.consignee.email)
        .bind(&whr.content)
        .bind(whr.pieces as i32)
        .bind(whr.weight)
        .bind(whr.length)
        .bind(whr.width)
        .bind(whr.height)
        .bind(whr.volume)
        .bind(whr.volume_weight)
        .bind(&whr.invoice_number)
        .bind(whr.declared_value)
        .bind(&whr.po_number)
        .bind(whr.departure_date)
        .bind(whr.transport.as_str())
        .bind(whr.estimated_arrival_cr)
        .bind(whr.classification.as_str())
        .bind(whr.status.as_str())
        .bind(whr.email_sent)
        .bind(whr.email_sent_at)
        .bind(whr.classified_at)
        .bind(&whr.notes)
        .bind(whr.created_at)
        .bind(whr.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(Self::map_insert_error)?;

        row.into_entity()
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<WarehouseReceipt> {
        let row = sqlx::query_as::<_, WhrRow>(&format!(
            "SELECT {WHR_COLUMNS} FROM whrs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("WHR".to_string()))?;

        row.into_entity()
    }

    async fn find_by_token(&self, token: &str) -> AppResult<WarehouseReceipt> {
        let row = sqlx::query_as::<_, WhrRow>(&format!(
            "SELECT {WHR_COLUMNS} FROM whrs WHERE tracking_number = $1 OR whr_number = $1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("WHR".to_string()))?;

        row.into_entity()
    }

    async fn list(
        &self,
        filter: &WhrFilter,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<WarehouseReceipt>, u64)> {
        let mut qb = QueryBuilder::new(format!("SELECT {WHR_COLUMNS} FROM whrs WHERE TRUE"));
        Self::push_filter(&mut qb, filter);
        qb.push(" ORDER BY arrival_date DESC, created_at DESC, row_seq DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        let rows: Vec<WhrRow> = qb.build_query_as().fetch_all(&self.db).await?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM whrs WHERE TRUE");
        Self::push_filter(&mut count_qb, filter);
        let total: i64 = count_qb.build().fetch_one(&self.db).await?.get(0);

        let items = rows
            .into_iter()
            .map(WhrRow::into_entity)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((items, total.max(0) as u64))
    }

    async fn update(&self, id: Uuid, changes: WhrChanges) -> AppResult<WarehouseReceipt> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, WhrRow>(&format!(
            "SELECT {WHR_COLUMNS} FROM whrs WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("WHR".to_string()))?;

        let mut whr = row.into_entity()?;
        apply_changes(&mut whr, &changes, Utc::now());

        sqlx::query(
            r#"
            UPDATE whrs SET
                tracking_number = $1, received_by = $2, carrier = $3,
                shipper_name = $4, shipper_company = $5, shipper_address = $6, shipper_phone = $7,
                consignee_name = $8, consignee_company = $9, consignee_address = $10,
                consignee_phone = $11, consignee_email = $12,
                content = $13, pieces = $14, weight = $15,
                length_inches = $16, width_inches = $17, height_inches = $18,
                volume_cubic_feet = $19, volume_weight = $20,
                invoice_number = $21, declared_value = $22, po_number = $23,
                departure_date = $24, transport = $25, estimated_arrival_cr = $26,
                classification = $27, status = $28,
                email_sent = $29, email_sent_at = $30, classified_at = $31,
                notes = $32, updated_at = $33
            WHERE id = $34
            "#,
        )
        .bind(&whr.tracking_number)
        .bind(&whr.received_by)
        .bind(&whr.carrier)
        .bind(&whr.shipper.name)
        .bind(&whr.shipper.company)
        .bind(&whr.shipper.address)
        .bind(&whr.shipper.phone)
        .bind(&whr.consignee.name)
        .bind(&whr.consignee.company)
        .bind(&whr.consignee.address)
        .bind(&whr.consignee.phone)
        .bind(&whr.consignee.email)
        .bind(&whr.content)
        .bind(whr.pieces as i32)
        .bind(whr.weight)
        .bind(whr.length)
        .bind(whr.width)
        .bind(whr.height)
        .bind(whr.volume)
        .bind(whr.volume_weight)
        .bind(&whr.invoice_number)
        .bind(whr.declared_value)
        .bind(&whr.po_number)
        .bind(whr.departure_date)
        .bind(whr.transport.as_str())
        .bind(whr.estimated_arrival_cr)
        .bind(whr.classification.as_str())
        .bind(whr.status.as_str())
        .bind(whr.email_sent)
        .bind(whr.email_sent_at)
        .bind(whr.classified_at)
        .bind(&whr.notes)
        .bind(whr.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(whr)
    }

    async fn mark_notified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<WarehouseReceipt> {
        // Conditional update: the flag check and the stamp are one statement,
        // so concurrent callers cannot both write email_sent_at.
        let updated = sqlx::query_as::<_, WhrRow>(&format!(
            r#"
            UPDATE whrs SET email_sent = TRUE, email_sent_at = $2, updated_at = $2
            WHERE id = $1 AND email_sent = FALSE
            RETURNING {WHR_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;

        match updated {
            Some(row) => row.into_entity(),
            // Already notified, or missing; get_by_id sorts out which
            None => self.get_by_id(id).await,
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<WarehouseReceipt> {
        let row = sqlx::query_as::<_, WhrRow>(&format!(
            "DELETE FROM whrs WHERE id = $1 RETURNING {WHR_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("WHR".to_string()))?;

        row.into_entity()
    }

    async fn search(&self, token: &str) -> AppResult<Vec<WarehouseReceipt>> {
        let pattern = format!("%{}%", token);
        let rows = sqlx::query_as::<_, WhrRow>(&format!(
            r#"
            SELECT {WHR_COLUMNS} FROM whrs
            WHERE whr_number ILIKE $1
               OR tracking_number ILIKE $1
               OR consignee_name ILIKE $1
               OR shipper_name ILIKE $1
               OR content ILIKE $1
            ORDER BY created_at DESC, row_seq DESC
            LIMIT $2
            "#
        ))
        .bind(&pattern)
        .bind(SEARCH_RESULT_LIMIT as i64)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(WhrRow::into_entity).collect()
    }

    async fn aggregate(&self, since: DateTime<Utc>) -> AppResult<StatsSnapshot> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                COUNT(*) as total,
                COUNT(*) FILTER (WHERE classification = 'pending') as pending,
                COUNT(*) FILTER (WHERE classification = 'awb') as awb,
                COUNT(*) FILTER (WHERE classification = 'bl') as bl,
                COUNT(*) FILTER (WHERE email_sent = FALSE) as emails_pending,
                COUNT(*) FILTER (WHERE status = 'en_miami') as in_miami,
                COUNT(*) FILTER (WHERE status = 'por_aire') as por_aire,
                COUNT(*) FILTER (WHERE status = 'por_mar') as por_mar,
                COUNT(*) FILTER (WHERE status = 'en_transito') as in_transit,
                COUNT(*) FILTER (WHERE status = 'entregado') as delivered,
                COUNT(*) FILTER (WHERE transport = 'air') as by_air,
                COUNT(*) FILTER (WHERE transport = 'sea') as by_sea,
                COALESCE(SUM(weight), 0) as total_weight,
                COALESCE(SUM(declared_value), 0) as total_value,
                COALESCE(SUM(pieces), 0) as total_pieces,
                COALESCE(ROUND(AVG(weight), 2), 0) as avg_weight,
                COALESCE(ROUND(AVG(volume_cubic_feet), 2), 0) as avg_volume,
                MAX(created_at) as last_whr_created
            FROM whrs
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(StatsSnapshot {
            total: row.total.max(0) as u64,
            pending: row.pending.max(0) as u64,
            awb: row.awb.max(0) as u64,
            bl: row.bl.max(0) as u64,
            emails_pending: row.emails_pending.max(0) as u64,
            in_miami: row.in_miami.max(0) as u64,
            por_aire: row.por_aire.max(0) as u64,
            por_mar: row.por_mar.max(0) as u64,
            in_transit: row.in_transit.max(0) as u64,
            delivered: row.delivered.max(0) as u64,
            by_air: row.by_air.max(0) as u64,
            by_sea: row.by_sea.max(0) as u64,
            total_weight: row.total_weight,
            total_value: row.total_value,
            total_pieces: row.total_pieces.max(0) as u64,
            avg_weight: row.avg_weight,
            avg_volume: row.avg_volume,
            last_whr_created: row.last_whr_created,
            date_range_days: 0,
        })
    }

    async fn next_whr_sequence(&self) -> AppResult<u64> {
        let next: i64 = sqlx::query_scalar("SELECT nextval('whr_number_seq')")
            .fetch_one(&self.db)
            .await?;
        Ok(next.max(0) as u64)
    }

    async fn append_event(&self, whr_id: Uuid, event: TrackingEvent) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO whr_tracking_events (whr_id, event_type, description, location, created_at)
            SELECT $1, $2, $3, $4, $5 WHERE EXISTS (SELECT 1 FROM whrs WHERE id = $1)
            "#,
        )
        .bind(whr_id)
        .bind(&event.event_type)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.created_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("WHR".to_string()));
        }
        Ok(())
    }

    async fn events_for(&self, whr_id: Uuid) -> AppResult<Vec<TrackingEvent>> {
        let rows = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            r#"
            SELECT event_type, description, location, created_at
            FROM whr_tracking_events
            WHERE whr_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(whr_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(event_type, description, location, created_at)| TrackingEvent {
                event_type,
                description,
                location,
                created_at,
            })
            .collect())
    }

    async fn all(&self) -> AppResult<Vec<WarehouseReceipt>> {
        let rows = sqlx::query_as::<_, WhrRow>(&format!(
            "SELECT {WHR_COLUMNS} FROM whrs ORDER BY created_at DESC, row_seq DESC"
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(WhrRow::into_entity).collect()
    }
}
