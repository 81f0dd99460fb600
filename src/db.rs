use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::aqi;
use crate::models::{
    Coordinates, GuidancePayload, GuidanceRecord, Location, Pollutant, PollutantReading, RiskLevel,
    SensitivityProfile, SeverityTier, StoredReading, UserRecord,
};
use crate::notify::NotificationPreferences;
use crate::wire::{PollutantLevels, ReadingInput, ThresholdSettings};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Register a new user. Fails when the email is already taken.
pub async fn create_user(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    postcode: &str,
    profile: &SensitivityProfile,
    preferences: &NotificationPreferences,
) -> anyhow::Result<Uuid> {
    let inserted = insert_user(
        pool,
        Uuid::new_v4(),
        full_name,
        email,
        postcode,
        profile,
        preferences,
    )
    .await?;
    let Some(user_id) = inserted else {
        anyhow::bail!("a user is already registered with email {email}");
    };
    tracing::info!(%user_id, %email, %postcode, "user registered");
    Ok(user_id)
}

/// Returns `None` when the email already exists.
async fn insert_user(
    pool: &PgPool,
    id: Uuid,
    full_name: &str,
    email: &str,
    postcode: &str,
    profile: &SensitivityProfile,
    preferences: &NotificationPreferences,
) -> anyhow::Result<Option<Uuid>> {
    let thresholds = ThresholdSettings::from_map(&profile.thresholds);
    let row = sqlx::query(
        r#"
        INSERT INTO asthma_guardian.users
        (id, full_name, email, postcode, asthma_severity,
         pm25_threshold, pm10_threshold, ozone_threshold, no2_threshold, so2_threshold,
         email_enabled, sms_enabled, push_enabled, frequency)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (email) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(full_name)
    .bind(email)
    .bind(postcode)
    .bind(profile.severity.as_str())
    .bind(thresholds.pm25_threshold)
    .bind(thresholds.pm10_threshold)
    .bind(thresholds.ozone_threshold)
    .bind(thresholds.no2_threshold)
    .bind(thresholds.so2_threshold)
    .bind(preferences.email_enabled)
    .bind(preferences.sms_enabled)
    .bind(preferences.push_enabled)
    .bind(preferences.frequency.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| row.get("id")))
}

/// Overwrite a user's name, postcode, profile and preferences.
pub async fn update_user(pool: &PgPool, user: &UserRecord) -> anyhow::Result<()> {
    let thresholds = ThresholdSettings::from_map(&user.profile.thresholds);
    let result = sqlx::query(
        r#"
        UPDATE asthma_guardian.users
        SET full_name = $2, postcode = $3, asthma_severity = $4,
            pm25_threshold = $5, pm10_threshold = $6, ozone_threshold = $7,
            no2_threshold = $8, so2_threshold = $9,
            email_enabled = $10, sms_enabled = $11, push_enabled = $12, frequency = $13
        WHERE id = $1
        "#,
    )
    .bind(user.id)
    .bind(&user.full_name)
    .bind(&user.postcode)
    .bind(user.profile.severity.as_str())
    .bind(thresholds.pm25_threshold)
    .bind(thresholds.pm10_threshold)
    .bind(thresholds.ozone_threshold)
    .bind(thresholds.no2_threshold)
    .bind(thresholds.so2_threshold)
    .bind(user.preferences.email_enabled)
    .bind(user.preferences.sms_enabled)
    .bind(user.preferences.push_enabled)
    .bind(user.preferences.frequency.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("user {} no longer exists", user.id);
    }
    tracing::info!(user_id = %user.id, email = %user.email, "user updated");
    Ok(())
}

/// Insert a reading unless its source key was already ingested.
/// Returns whether a row was written.
async fn insert_reading(
    pool: &PgPool,
    reading: &PollutantReading,
    source_key: &str,
) -> anyhow::Result<bool> {
    let aqi = aqi::calculate_aqi(reading);
    let levels = PollutantLevels::from_map(&reading.concentrations);
    let result = sqlx::query(
        r#"
        INSERT INTO asthma_guardian.readings
        (id, location_key, postcode, latitude, longitude, observed_at,
         pm25, pm10, ozone, no2, so2, aqi, quality_rating, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(reading.location.label())
    .bind(reading.location.postcode.as_deref())
    .bind(reading.location.coordinates.map(|c| c.latitude))
    .bind(reading.location.coordinates.map(|c| c.longitude))
    .bind(reading.captured_at)
    .bind(levels.pm25)
    .bind(levels.pm10)
    .bind(levels.ozone)
    .bind(levels.no2)
    .bind(levels.so2)
    .bind(aqi)
    .bind(aqi::quality_rating(aqi))
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        (
            Uuid::parse_str("6b1d0c1e-4f7e-4c55-9d0a-3a0f8f2b7c11")?,
            "Priya Raman",
            "priya.raman@example.com",
            "2000",
            SeverityTier::Mild,
        ),
        (
            Uuid::parse_str("a3c9e2d4-7b61-4f0e-8c2a-91d5e6f4b2a7")?,
            "Tom Nguyen",
            "tom.nguyen@example.com",
            "2150",
            SeverityTier::Moderate,
        ),
        (
            Uuid::parse_str("f2e8b7a1-0c3d-4e59-a6b4-5d7c8e9f0a12")?,
            "Grace O'Connor",
            "grace.oconnor@example.com",
            "2750",
            SeverityTier::Severe,
        ),
    ];

    for (id, name, email, postcode, severity) in users {
        insert_user(
            pool,
            id,
            name,
            email,
            postcode,
            &SensitivityProfile::with_defaults(severity),
            &NotificationPreferences::default(),
        )
        .await?;
    }

    let readings = vec![
        (
            "seed-001",
            "2000",
            [(Pollutant::Pm25, 10.0), (Pollutant::Pm10, 15.0), (Pollutant::Ozone, 0.02)],
            Utc.with_ymd_and_hms(2026, 1, 12, 8, 0, 0)
                .single()
                .context("invalid timestamp")?,
        ),
        (
            "seed-002",
            "2150",
            [(Pollutant::Pm25, 24.0), (Pollutant::Pm10, 46.0), (Pollutant::No2, 0.12)],
            Utc.with_ymd_and_hms(2026, 1, 12, 8, 0, 0)
                .single()
                .context("invalid timestamp")?,
        ),
        (
            "seed-003",
            "2750",
            [(Pollutant::Pm25, 60.0), (Pollutant::Pm10, 70.0), (Pollutant::Ozone, 0.09)],
            Utc.with_ymd_and_hms(2026, 1, 12, 8, 0, 0)
                .single()
                .context("invalid timestamp")?,
        ),
    ];

    for (source_key, postcode, values, captured_at) in readings {
        let reading = PollutantReading {
            concentrations: values.into_iter().collect(),
            captured_at,
            location: Location::postcode(postcode),
        };
        insert_reading(pool, &reading, source_key).await?;
    }

    tracing::info!("seed data written");
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    #[serde(default)]
    postcode: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    observed_at: DateTime<Utc>,
    pm25: Option<f64>,
    pm10: Option<f64>,
    ozone: Option<f64>,
    no2: Option<f64>,
    so2: Option<f64>,
    source_key: Option<String>,
}

/// Validate one CSV row. A row may carry a postcode, a coordinate pair or both.
fn reading_from_csv_row(
    row: CsvRow,
) -> crate::error::Result<(PollutantReading, Option<String>)> {
    let reading = PollutantReading::try_from(ReadingInput {
        postcode: row.postcode,
        latitude: row.latitude,
        longitude: row.longitude,
        timestamp: row.observed_at,
        pollutants: PollutantLevels {
            pm25: row.pm25,
            pm10: row.pm10,
            ozone: row.ozone,
            no2: row.no2,
            so2: row.so2,
        },
    })?;
    let source_key = row.source_key.filter(|key| !key.trim().is_empty());
    Ok((reading, source_key))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row at line {line}"))?;
        let (reading, source_key) =
            reading_from_csv_row(row).with_context(|| format!("rejected reading at line {line}"))?;
        let source_key = source_key.unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_reading(pool, &reading, &source_key).await? {
            inserted += 1;
        } else {
            tracing::debug!(%source_key, "reading already ingested");
        }
    }

    tracing::info!(inserted, path = %csv_path.display(), "csv import finished");
    Ok(inserted)
}

fn user_from_row(row: &PgRow) -> anyhow::Result<UserRecord> {
    let severity: String = row.get("asthma_severity");
    let thresholds = ThresholdSettings {
        pm25_threshold: row.get("pm25_threshold"),
        pm10_threshold: row.get("pm10_threshold"),
        ozone_threshold: row.get("ozone_threshold"),
        no2_threshold: row.get("no2_threshold"),
        so2_threshold: row.get("so2_threshold"),
    };
    let profile = SensitivityProfile {
        severity: severity.parse()?,
        thresholds: thresholds.to_map(),
    };
    let frequency: String = row.get("frequency");

    Ok(UserRecord {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        postcode: row.get("postcode"),
        profile,
        preferences: NotificationPreferences {
            email_enabled: row.get("email_enabled"),
            sms_enabled: row.get("sms_enabled"),
            push_enabled: row.get("push_enabled"),
            frequency: frequency.parse()?,
        },
    })
}

const USER_COLUMNS: &str = "id, full_name, email, postcode, asthma_severity, \
     pm25_threshold, pm10_threshold, ozone_threshold, no2_threshold, so2_threshold, \
     email_enabled, sms_enabled, push_enabled, frequency";

pub async fn fetch_user(pool: &PgPool, email: &str) -> anyhow::Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM asthma_guardian.users WHERE email = $1");
    let row = sqlx::query(&query).bind(email).fetch_optional(pool).await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn fetch_users(pool: &PgPool, postcode: Option<&str>) -> anyhow::Result<Vec<UserRecord>> {
    let mut query = format!("SELECT {USER_COLUMNS} FROM asthma_guardian.users");
    if postcode.is_some() {
        query.push_str(" WHERE postcode = $1");
    }
    query.push_str(" ORDER BY email");

    let mut rows = sqlx::query(&query);
    if let Some(value) = postcode {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    records.iter().map(user_from_row).collect()
}

const READING_COLUMNS: &str = "id, postcode, latitude, longitude, observed_at, \
     pm25, pm10, ozone, no2, so2, aqi, quality_rating";

fn reading_from_row(row: &PgRow) -> StoredReading {
    let mut concentrations = BTreeMap::new();
    for pollutant in Pollutant::ALL {
        let value: Option<f64> = row.get(pollutant.as_str());
        if let Some(value) = value {
            concentrations.insert(pollutant, value);
        }
    }
    let latitude: Option<f64> = row.get("latitude");
    let longitude: Option<f64> = row.get("longitude");

    StoredReading {
        id: row.get("id"),
        reading: PollutantReading {
            concentrations,
            captured_at: row.get("observed_at"),
            location: Location {
                postcode: row.get("postcode"),
                coordinates: latitude
                    .zip(longitude)
                    .map(|(latitude, longitude)| Coordinates {
                        latitude,
                        longitude,
                    }),
            },
        },
        aqi: row.get("aqi"),
        quality_rating: row.get("quality_rating"),
    }
}

/// Most recent reading for a location key: a postcode, or `lat,lon` for
/// readings that arrived with coordinates only.
pub async fn fetch_latest_reading(
    pool: &PgPool,
    location_key: &str,
) -> anyhow::Result<Option<StoredReading>> {
    let query = format!(
        "SELECT {READING_COLUMNS} FROM asthma_guardian.readings \
         WHERE location_key = $1 ORDER BY observed_at DESC LIMIT 1"
    );
    let row = sqlx::query(&query)
        .bind(location_key)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(reading_from_row))
}

/// Readings observed since `since`, newest first, optionally for one location.
pub async fn fetch_readings(
    pool: &PgPool,
    location_key: Option<&str>,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<StoredReading>> {
    let mut query =
        format!("SELECT {READING_COLUMNS} FROM asthma_guardian.readings WHERE observed_at >= $1");
    if location_key.is_some() {
        query.push_str(" AND location_key = $2");
    }
    query.push_str(" ORDER BY observed_at DESC");

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = location_key {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(reading_from_row).collect())
}

pub async fn store_guidance(
    pool: &PgPool,
    user_id: Uuid,
    reading_id: Option<Uuid>,
    payload: &GuidancePayload,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO asthma_guardian.guidance
        (id, user_id, reading_id, risk_level, severity_score, explanation, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(reading_id)
    .bind(payload.risk_level().as_str())
    .bind(payload.assessment.severity_score)
    .bind(&payload.explanation)
    .bind(Json(payload))
    .execute(pool)
    .await?;

    tracing::debug!(guidance_id = %id, %user_id, risk_level = %payload.risk_level(), "guidance stored");
    Ok(id)
}

/// Level of the user's most recent stored guidance, notified or not.
pub async fn fetch_latest_level(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Option<RiskLevel>> {
    let row = sqlx::query(
        r#"
        SELECT risk_level
        FROM asthma_guardian.guidance
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        None => Ok(None),
        Some(row) => {
            let level: String = row.get("risk_level");
            Ok(Some(level.parse()?))
        }
    }
}

pub async fn mark_notified(pool: &PgPool, guidance_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE asthma_guardian.guidance SET notified = TRUE WHERE id = $1")
        .bind(guidance_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_guidance_history(
    pool: &PgPool,
    since: DateTime<Utc>,
    postcode: Option<&str>,
) -> anyhow::Result<Vec<GuidanceRecord>> {
    let mut query = String::from(
        "SELECT u.full_name, u.email, u.postcode, \
         g.risk_level, g.severity_score, g.explanation, g.created_at \
         FROM asthma_guardian.guidance g \
         JOIN asthma_guardian.users u ON u.id = g.user_id \
         WHERE g.created_at >= $1",
    );
    if postcode.is_some() {
        query.push_str(" AND u.postcode = $2");
    }
    query.push_str(" ORDER BY g.created_at DESC");

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = postcode {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut history = Vec::with_capacity(records.len());

    for row in records {
        let level: String = row.get("risk_level");
        history.push(GuidanceRecord {
            user_name: row.get("full_name"),
            user_email: row.get("email"),
            postcode: row.get("postcode"),
            risk_level: level.parse()?,
            severity_score: row.get("severity_score"),
            explanation: row.get("explanation"),
            created_at: row.get("created_at"),
        });
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &str) -> Vec<CsvRow> {
        csv::Reader::from_reader(data.as_bytes())
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    const HEADER: &str = "postcode,latitude,longitude,observed_at,pm25,pm10,ozone,no2,so2,source_key";

    #[test]
    fn coordinates_only_row_is_keyed_by_coordinates() {
        let data = format!("{HEADER}\n,-33.86882,151.20929,2026-01-13T08:00:00Z,18.2,,,,,sensor-7\n");
        let row = rows(&data).remove(0);
        let (reading, source_key) = reading_from_csv_row(row).unwrap();
        assert!(reading.location.postcode.is_none());
        assert_eq!(reading.location.label(), "-33.8688,151.2093");
        assert_eq!(source_key.as_deref(), Some("sensor-7"));
    }

    #[test]
    fn postcode_row_is_keyed_by_postcode() {
        let data = format!("{HEADER}\n 2150 ,,,2026-01-13T08:00:00Z,27.5,52.0,,,,\n");
        let row = rows(&data).remove(0);
        let (reading, source_key) = reading_from_csv_row(row).unwrap();
        assert_eq!(reading.location.label(), "2150");
        assert_eq!(reading.concentrations.len(), 2);
        assert!(source_key.is_none());
    }

    #[test]
    fn row_without_any_location_is_rejected() {
        let data = format!("{HEADER}\n,,,2026-01-13T08:00:00Z,27.5,,,,,row-1\n");
        let row = rows(&data).remove(0);
        assert!(reading_from_csv_row(row).is_err());
    }
}
