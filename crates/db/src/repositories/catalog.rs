use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use repricer_core::domain::device::{BrandId, DeviceKind, DeviceModel, DeviceModelId};
use repricer_core::domain::pricing::{
    CandidateDevice, PartTypeId, PricingEntry, PricingEntryId, RepairTypeId,
};

use super::{CatalogStore, MissingCombination, StoreError};
use crate::DbPool;

pub struct SqlCatalogStore {
    pool: DbPool,
}

impl SqlCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for SqlCatalogStore {
    async fn find_current_price(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<Option<PricingEntry>, StoreError> {
        let today = Utc::now().date_naive();

        let row = sqlx::query(
            r#"
            SELECT
                id, device_model_id, repair_type_id, part_type_id, price, cost,
                is_estimated, confidence_score, valid_from, valid_until,
                is_active, notes, created_at
            FROM pricing
            WHERE device_model_id = ? AND repair_type_id = ? AND part_type_id = ?
              AND is_active = 1
              AND (valid_until IS NULL OR valid_until >= ?)
            ORDER BY valid_from DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(device_model_id.0)
        .bind(repair_type_id.0)
        .bind(part_type_id.0)
        .bind(today.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| pricing_entry_from_row(&value)).transpose()
    }

    async fn get_device(
        &self,
        device_model_id: DeviceModelId,
    ) -> Result<Option<DeviceModel>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                dm.id, dm.name, dm.brand_id, b.name AS brand_name,
                dm.release_year, dm.device_kind, dm.screen_size, dm.is_active
            FROM device_models dm
            JOIN brands b ON b.id = dm.brand_id
            WHERE dm.id = ?
            "#,
        )
        .bind(device_model_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| device_from_row(&value)).transpose()
    }

    async fn find_candidate_devices(
        &self,
        brand_id: BrandId,
        kind: DeviceKind,
        exclude_device_id: DeviceModelId,
        year_lower: i32,
        year_upper: i32,
    ) -> Result<Vec<CandidateDevice>, StoreError> {
        let today = Utc::now().date_naive();

        // The window is symmetric around the target year, so doubling both
        // sides of the distance comparison keeps the ordering in integers.
        let rows = sqlx::query(
            r#"
            SELECT
                dm.id AS device_model_id, dm.name AS device_name,
                dm.release_year, dm.screen_size,
                p.repair_type_id, p.part_type_id, p.price
            FROM device_models dm
            JOIN pricing p ON p.device_model_id = dm.id
            WHERE dm.brand_id = ? AND dm.device_kind = ? AND dm.id != ?
              AND dm.release_year BETWEEN ? AND ?
              AND p.is_active = 1
              AND (p.valid_until IS NULL OR p.valid_until >= ?)
            ORDER BY ABS(2 * dm.release_year - ?), dm.id, p.id
            "#,
        )
        .bind(brand_id.0)
        .bind(kind.as_str())
        .bind(exclude_device_id.0)
        .bind(year_lower)
        .bind(year_upper)
        .bind(today.to_string())
        .bind(year_lower + year_upper)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    async fn average_price(
        &self,
        brand_id: Option<BrandId>,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
    ) -> Result<Option<f64>, StoreError> {
        let today = Utc::now().date_naive();

        let row = match brand_id {
            Some(brand_id) => {
                sqlx::query(
                    r#"
                    SELECT AVG(p.price) AS avg_price
                    FROM pricing p
                    JOIN device_models dm ON dm.id = p.device_model_id
                    WHERE dm.brand_id = ?
                      AND p.repair_type_id = ? AND p.part_type_id = ?
                      AND p.is_active = 1
                      AND (p.valid_until IS NULL OR p.valid_until >= ?)
                    "#,
                )
                .bind(brand_id.0)
                .bind(repair_type_id.0)
                .bind(part_type_id.0)
                .bind(today.to_string())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT AVG(price) AS avg_price
                    FROM pricing
                    WHERE repair_type_id = ? AND part_type_id = ?
                      AND is_active = 1
                      AND (valid_until IS NULL OR valid_until >= ?)
                    "#,
                )
                .bind(repair_type_id.0)
                .bind(part_type_id.0)
                .bind(today.to_string())
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(row.try_get::<Option<f64>, _>("avg_price")?)
    }

    async fn insert_estimated_price(
        &self,
        device_model_id: DeviceModelId,
        repair_type_id: RepairTypeId,
        part_type_id: PartTypeId,
        price: f64,
        confidence: f64,
        note: &str,
    ) -> Result<PricingEntryId, StoreError> {
        let today = Utc::now().date_naive();
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO pricing (
                device_model_id, repair_type_id, part_type_id, price,
                is_estimated, confidence_score, valid_from, is_active,
                notes, created_at
            ) VALUES (?, ?, ?, ?, 1, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(device_model_id.0)
        .bind(repair_type_id.0)
        .bind(part_type_id.0)
        .bind(price)
        .bind(confidence)
        .bind(today.to_string())
        .bind(note)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(PricingEntryId(result.last_insert_rowid()))
    }

    async fn missing_combinations(&self) -> Result<Vec<MissingCombination>, StoreError> {
        let today = Utc::now().date_naive();

        let rows = sqlx::query(
            r#"
            SELECT dm.id AS device_model_id, rt.id AS repair_type_id,
                   pt.id AS part_type_id
            FROM device_models dm
            CROSS JOIN repair_types rt
            CROSS JOIN part_types pt
            WHERE dm.is_active = 1 AND rt.is_active = 1 AND pt.is_active = 1
              AND NOT EXISTS (
                  SELECT 1 FROM pricing p
                  WHERE p.device_model_id = dm.id
                    AND p.repair_type_id = rt.id
                    AND p.part_type_id = pt.id
                    AND p.is_active = 1
                    AND (p.valid_until IS NULL OR p.valid_until >= ?)
              )
            ORDER BY dm.id, rt.id, pt.id
            "#,
        )
        .bind(today.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    DeviceModelId(row.try_get("device_model_id")?),
                    RepairTypeId(row.try_get("repair_type_id")?),
                    PartTypeId(row.try_get("part_type_id")?),
                ))
            })
            .collect()
    }
}

fn pricing_entry_from_row(row: &SqliteRow) -> Result<PricingEntry, StoreError> {
    let valid_from = parse_date("pricing valid_from", &row.try_get::<String, _>("valid_from")?)?;
    let valid_until = row
        .try_get::<Option<String>, _>("valid_until")?
        .as_deref()
        .map(|date| parse_date("pricing valid_until", date))
        .transpose()?;
    let created_at =
        parse_rfc3339("pricing created_at", &row.try_get::<String, _>("created_at")?)?;

    Ok(PricingEntry {
        id: PricingEntryId(row.try_get("id")?),
        device_model_id: DeviceModelId(row.try_get("device_model_id")?),
        repair_type_id: RepairTypeId(row.try_get("repair_type_id")?),
        part_type_id: PartTypeId(row.try_get("part_type_id")?),
        price: row.try_get("price")?,
        cost: row.try_get("cost")?,
        is_estimated: row.try_get("is_estimated")?,
        confidence_score: row.try_get("confidence_score")?,
        valid_from,
        valid_until,
        is_active: row.try_get("is_active")?,
        notes: row.try_get("notes")?,
        created_at,
    })
}

fn device_from_row(row: &SqliteRow) -> Result<DeviceModel, StoreError> {
    let kind_raw: String = row.try_get("device_kind")?;
    let kind =
        kind_raw.parse::<DeviceKind>().map_err(|err| StoreError::Decode(err.to_string()))?;

    Ok(DeviceModel {
        id: DeviceModelId(row.try_get("id")?),
        name: row.try_get("name")?,
        brand_id: BrandId(row.try_get("brand_id")?),
        brand_name: row.try_get("brand_name")?,
        release_year: row.try_get("release_year")?,
        kind,
        screen_size: row.try_get("screen_size")?,
        is_active: row.try_get("is_active")?,
    })
}

fn candidate_from_row(row: &SqliteRow) -> Result<CandidateDevice, StoreError> {
    Ok(CandidateDevice {
        device_model_id: DeviceModelId(row.try_get("device_model_id")?),
        device_name: row.try_get("device_name")?,
        release_year: row.try_get("release_year")?,
        screen_size: row.try_get("screen_size")?,
        repair_type_id: RepairTypeId(row.try_get("repair_type_id")?),
        part_type_id: PartTypeId(row.try_get("part_type_id")?),
        price: row.try_get("price")?,
    })
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| StoreError::Decode(format!("invalid {field} date '{value}': {err}")))
}

fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        StoreError::Decode(format!("invalid {field} timestamp '{value}': {err}"))
    })
}
