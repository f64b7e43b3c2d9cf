use crate::auth::Campus;
use crate::cli::actions::{server::Args, Action};
use crate::store::PartitionPath;
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// Turn parsed arguments into the action to run.
///
/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let default_campus = matches
        .get_one::<String>("default-campus")
        .map_or(Ok(Campus::LlanoLargo), |value| value.parse::<Campus>())
        .map_err(|err| anyhow!("invalid --default-campus: {err}"))?;

    let appointment_partition = matches
        .get_one::<String>("appointment-partition-path")
        .map_or(Ok(PartitionPath::Field("student_id".to_string())), |value| {
            value.parse::<PartitionPath>()
        })
        .map_err(|err| anyhow!("invalid --appointment-partition-path: {err}"))?;

    let seconds = |name: &str, default: u64| {
        Duration::from_secs(matches.get_one::<u64>(name).copied().unwrap_or(default))
    };

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret: matches
            .get_one::<String>("token-secret")
            .map(|secret| SecretString::from(secret.clone())),
        token_ttl: seconds("token-ttl-seconds", 28_800),
        lockout_threshold: matches
            .get_one::<u32>("lockout-threshold")
            .copied()
            .unwrap_or(5),
        lockout_duration: Duration::from_secs(
            u64::from(
                matches
                    .get_one::<u32>("lockout-minutes")
                    .copied()
                    .unwrap_or(30),
            ) * 60,
        ),
        bcrypt_cost: matches.get_one::<u32>("bcrypt-cost").copied().unwrap_or(12),
        default_campus,
        appointment_partition,
        request_timeout: seconds("request-timeout-seconds", 30),
        store_retry_delay: Duration::from_millis(
            matches
                .get_one::<u64>("store-retry-delay-ms")
                .copied()
                .unwrap_or(200),
        ),
    }))
}
