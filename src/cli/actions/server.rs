use crate::{
    api::{self, AppState},
    auth::{AuditRecorder, AuthConfig, AuthService, Campus, LockoutPolicy, TokenService},
    clock::{SharedClock, SystemClock},
    records::Records,
    store::{DocumentStore, MemoryStore, PartitionPath, PgStore, ResilientStore, StoreOptions},
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

const MEMORY_DSN: &str = "memory://";

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: Option<SecretString>,
    pub token_ttl: Duration,
    pub lockout_threshold: u32,
    pub lockout_duration: Duration,
    pub bcrypt_cost: u32,
    pub default_campus: Campus,
    pub appointment_partition: PartitionPath,
    pub request_timeout: Duration,
    pub store_retry_delay: Duration,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store is unreachable, the token secret is too
/// short, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let clock: SharedClock = Arc::new(SystemClock);

    let backend = open_store(&args.dsn, args.request_timeout).await?;
    let store = ResilientStore::new(
        backend,
        StoreOptions::new().with_retry_delay(args.store_retry_delay),
    );

    let tokens = match &args.token_secret {
        Some(secret) => TokenService::new(secret, clock.clone())
            .map_err(|err| anyhow!("invalid token secret: {err}"))?,
        None => {
            warn!("No token secret configured; sessions will not survive a restart");
            TokenService::ephemeral(clock.clone())
        }
    };

    let config = AuthConfig::new()
        .with_token_ttl(chrono::Duration::from_std(args.token_ttl).context("token ttl too large")?)
        .with_lockout(LockoutPolicy::new(
            args.lockout_threshold,
            chrono::Duration::from_std(args.lockout_duration)
                .context("lockout duration too large")?,
        ))
        .with_bcrypt_cost(args.bcrypt_cost)
        .with_default_campus(args.default_campus);

    let audit = Arc::new(AuditRecorder::new(store.clone(), clock.clone()));
    let auth = AuthService::new(&config, store.clone(), tokens, audit.clone(), clock.clone());
    let records = Records::new(store.clone(), audit, clock, args.appointment_partition);

    api::serve(
        args.port,
        AppState {
            auth: Arc::new(auth),
            records: Arc::new(records),
            store,
            request_timeout: args.request_timeout,
        },
    )
    .await
}

/// `memory://` selects the in-process store, anything else is a postgres DSN.
async fn open_store(dsn: &str, acquire_timeout: Duration) -> Result<Arc<dyn DocumentStore>> {
    if dsn == MEMORY_DSN {
        warn!("Using the in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(dsn, acquire_timeout)
        .await
        .context("Failed to connect to database")?;
    store
        .migrate()
        .await
        .context("Failed to apply database schema")?;
    Ok(Arc::new(store))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("token_secret_set", args.token_secret.is_some().to_string()),
        ("token_ttl", format!("{}s", args.token_ttl.as_secs())),
        (
            "lockout",
            format!(
                "{} failures / {}m",
                args.lockout_threshold,
                args.lockout_duration.as_secs() / 60
            ),
        ),
        ("bcrypt_cost", args.bcrypt_cost.to_string()),
        ("default_campus", args.default_campus.to_string()),
        ("appointment_partition", args.appointment_partition.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
