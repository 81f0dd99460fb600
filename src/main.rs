use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use asthma_guardian::config::{self, GuardianConfig};
use asthma_guardian::models::{
    GuidancePayload, PollutantReading, SensitivityProfile, SeverityTier, UserRecord,
};
use asthma_guardian::notify::{
    self, Dispatch, Frequency, NotificationMessage, NotificationPreferences, PreferencesUpdate,
};
use asthma_guardian::wire::{ProfileInput, ReadingInput, ThresholdSettings};
use asthma_guardian::{db, guidance, report, RiskPolicy};

#[derive(Parser)]
#[command(name = "asthma-guardian")]
#[command(about = "Personal asthma risk guidance from air quality readings", long_about = None)]
struct Cli {
    /// JSON file overriding the risk score breakpoints
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed users and readings
    Seed,
    /// Import air quality readings from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print a default sensitivity profile for a severity tier
    Profile {
        #[arg(long, default_value = "mild")]
        severity: String,
    },
    /// Register a user. Thresholds default to the severity tier's values
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        postcode: String,
        #[arg(long, default_value = "mild")]
        severity: String,
        /// JSON file with explicit `*_threshold` values
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// Change a user's name, postcode or sensitivity profile.
    /// A new severity without thresholds resets to that tier's defaults
    UpdateProfile {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        postcode: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// Change a user's notification channels or frequency
    Preferences {
        #[arg(long)]
        email: String,
        #[arg(long)]
        email_enabled: Option<bool>,
        #[arg(long)]
        sms_enabled: Option<bool>,
        #[arg(long)]
        push_enabled: Option<bool>,
        /// immediate or daily
        #[arg(long)]
        frequency: Option<String>,
    },
    /// List stored readings, optionally for one postcode
    Readings {
        #[arg(long)]
        postcode: Option<String>,
        #[arg(long, default_value_t = 7)]
        since_days: i64,
    },
    /// Evaluate a reading against a profile without touching the database
    Evaluate {
        #[arg(long)]
        reading: PathBuf,
        #[arg(long)]
        profile: PathBuf,
    },
    /// Generate guidance for one user from the latest reading at their postcode
    Guidance {
        #[arg(long)]
        email: String,
    },
    /// Generate guidance for every user, optionally within one postcode
    Sweep {
        #[arg(long)]
        postcode: Option<String>,
    },
    /// Generate a markdown report of recent guidance
    Report {
        #[arg(long)]
        postcode: Option<String>,
        #[arg(long, default_value_t = 7)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GUARDIAN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = config::database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

async fn require_user(pool: &PgPool, email: &str) -> anyhow::Result<UserRecord> {
    db::fetch_user(pool, email)
        .await?
        .with_context(|| format!("no user registered with email {email}"))
}

/// Compose and store guidance for one user, then decide on notification.
async fn guide_user(
    pool: &PgPool,
    policy: &RiskPolicy,
    user: &UserRecord,
) -> anyhow::Result<Option<GuidancePayload>> {
    let Some(stored) = db::fetch_latest_reading(pool, &user.postcode).await? else {
        tracing::warn!(email = %user.email, postcode = %user.postcode, "no readings for postcode");
        return Ok(None);
    };

    tracing::debug!(
        postcode = %user.postcode,
        aqi = stored.aqi,
        rating = %stored.quality_rating,
        "latest reading loaded"
    );
    let payload = guidance::guidance_for(policy, &stored.reading, &user.profile)
        .with_context(|| format!("failed to evaluate guidance for {}", user.email))?;
    let previous_level = db::fetch_latest_level(pool, user.id).await?;
    let guidance_id = db::store_guidance(pool, user.id, Some(stored.id), &payload).await?;

    match notify::decide(previous_level, &payload.assessment, &user.preferences) {
        Dispatch::Suppress => {
            tracing::debug!(email = %user.email, risk_level = %payload.risk_level(), "notification suppressed");
        }
        Dispatch::Now(channels) => {
            let message = NotificationMessage::from_payload(&user.postcode, &payload);
            let names: Vec<&str> = channels.iter().map(|c| c.as_str()).collect();
            tracing::info!(email = %user.email, channels = %names.join(","), subject = %message.subject, "notification dispatched");
            db::mark_notified(pool, guidance_id).await?;
        }
        Dispatch::Digest(channels) => {
            let names: Vec<&str> = channels.iter().map(|c| c.as_str()).collect();
            tracing::info!(email = %user.email, channels = %names.join(","), "queued for daily digest");
            db::mark_notified(pool, guidance_id).await?;
        }
    }

    Ok(Some(payload))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let policy = GuardianConfig::load_or_default(cli.config.as_deref())?.policy()?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} readings from {}.", csv.display());
        }
        Commands::Profile { severity } => {
            let severity: SeverityTier = severity.parse()?;
            let profile = SensitivityProfile::with_defaults(severity);
            println!(
                "{}",
                serde_json::to_string_pretty(&ProfileInput::from(&profile))?
            );
        }
        Commands::Register {
            email,
            name,
            postcode,
            severity,
            thresholds,
        } => {
            let settings = match thresholds {
                Some(path) => read_json::<ThresholdSettings>(&path)?,
                None => ThresholdSettings::default(),
            };
            let profile = ProfileInput {
                asthma_severity: severity,
                sensitivity_settings: settings,
            }
            .into_profile()?;
            let pool = connect().await?;
            let user_id = db::create_user(
                &pool,
                name.trim(),
                email.trim(),
                postcode.trim(),
                &profile,
                &NotificationPreferences::default(),
            )
            .await?;
            println!("Registered {email} as {user_id}.");
        }
        Commands::UpdateProfile {
            email,
            name,
            postcode,
            severity,
            thresholds,
        } => {
            let pool = connect().await?;
            let mut user = require_user(&pool, &email).await?;
            if let Some(name) = name {
                user.full_name = name.trim().to_string();
            }
            if let Some(postcode) = postcode {
                user.postcode = postcode.trim().to_string();
            }
            if severity.is_some() || thresholds.is_some() {
                let settings = match thresholds {
                    Some(path) => read_json::<ThresholdSettings>(&path)?,
                    None => ThresholdSettings::default(),
                };
                user.profile = ProfileInput {
                    asthma_severity: severity
                        .unwrap_or_else(|| user.profile.severity.as_str().to_string()),
                    sensitivity_settings: settings,
                }
                .into_profile()?;
            }
            db::update_user(&pool, &user).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&ProfileInput::from(&user.profile))?
            );
        }
        Commands::Preferences {
            email,
            email_enabled,
            sms_enabled,
            push_enabled,
            frequency,
        } => {
            let update = PreferencesUpdate {
                email_enabled,
                sms_enabled,
                push_enabled,
                frequency: frequency.as_deref().map(str::parse::<Frequency>).transpose()?,
            };
            let pool = connect().await?;
            let mut user = require_user(&pool, &email).await?;
            if !update.is_empty() {
                user.preferences = update.apply(&user.preferences);
                db::update_user(&pool, &user).await?;
            }
            println!("{}", serde_json::to_string_pretty(&user.preferences)?);
        }
        Commands::Readings {
            postcode,
            since_days,
        } => {
            let pool = connect().await?;
            let cutoff = report::cutoff(since_days);
            let readings = db::fetch_readings(&pool, postcode.as_deref(), cutoff).await?;
            if readings.is_empty() {
                println!("No readings in the last {since_days} days.");
                return Ok(());
            }
            for stored in &readings {
                println!(
                    "- {} {} AQI {} ({})",
                    stored.reading.captured_at.to_rfc3339(),
                    stored.reading.location.label(),
                    stored.aqi,
                    stored.quality_rating
                );
            }
        }
        Commands::Evaluate { reading, profile } => {
            let reading = PollutantReading::try_from(read_json::<ReadingInput>(&reading)?)?;
            let profile = SensitivityProfile::try_from(read_json::<ProfileInput>(&profile)?)?;
            let payload = guidance::guidance_for(&policy, &reading, &profile)?;
            tracing::info!(
                location = %reading.location.label(),
                risk_level = %payload.risk_level(),
                "reading evaluated"
            );
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Guidance { email } => {
            let pool = connect().await?;
            let user = require_user(&pool, &email).await?;
            match guide_user(&pool, &policy, &user).await? {
                Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
                None => println!("No air quality data available for {}.", user.postcode),
            }
        }
        Commands::Sweep { postcode } => {
            let pool = connect().await?;
            let users = db::fetch_users(&pool, postcode.as_deref()).await?;

            if users.is_empty() {
                println!("No users found for this scope.");
                return Ok(());
            }

            println!("Guidance generated:");
            for user in users.iter() {
                if let Some(payload) = guide_user(&pool, &policy, user).await? {
                    println!(
                        "- {} ({}, {}) {} score {:.2}",
                        user.full_name,
                        user.email,
                        user.postcode,
                        payload.risk_level(),
                        payload.assessment.severity_score
                    );
                }
            }
        }
        Commands::Report {
            postcode,
            since_days,
            out,
        } => {
            let pool = connect().await?;
            let cutoff = report::cutoff(since_days);
            let history = db::fetch_guidance_history(&pool, cutoff, postcode.as_deref()).await?;
            let report = report::build_report(postcode.as_deref(), cutoff, &history);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
