use anyhow::Context;
use std::sync::Arc;
use stockroom_api::auth::StaticOverrideAuthorizer;
use stockroom_api::events::{self, EventSender};
use stockroom_api::{config, db, AppServices, AppState};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Parses `user:secret,user:secret` pairs from the environment.
fn parse_override_secrets(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (user, secret) = pair.split_once(':')?;
            Some((user.trim().to_string(), secret.trim().to_string()))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load_config().context("failed to load configuration")?;
    info!(environment = %cfg.environment, "Starting stockroom worker");

    let pool = db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        db::run_migrations(&pool).await?;
    }
    let db_arc = Arc::new(pool);

    let (event_tx, event_rx) = mpsc::channel(256);
    let event_sender = EventSender::new(event_tx);
    let event_task = tokio::spawn(events::process_events(event_rx));

    let authorizer = Arc::new(StaticOverrideAuthorizer::new(
        std::env::var("STOCKROOM_OVERRIDE_SECRETS")
            .map(|raw| parse_override_secrets(&raw))
            .unwrap_or_default(),
    ));

    let services = AppServices::new(db_arc.clone(), event_sender.clone(), authorizer);
    let state = AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
    };

    // The request layer is wired elsewhere; this binary is the background
    // worker that reclaims abandoned carts on a fixed interval.
    let idle = cfg.cart_idle();
    let mut ticker = tokio::time::interval(cfg.sweep_interval());
    info!(
        interval_secs = cfg.sweep_interval_secs,
        idle_minutes = cfg.cart_idle_minutes,
        "Expiry sweep scheduled"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match state
                    .services
                    .approvals
                    .sweep_expired_carts(idle, chrono::Utc::now())
                    .await
                {
                    Ok(count) if count > 0 => info!(count = count, "Swept expired carts"),
                    Ok(_) => {}
                    Err(e) => error!("Expiry sweep failed: {}", e),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    event_task.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_override_secrets;

    #[test]
    fn parses_user_secret_pairs() {
        let pairs = parse_override_secrets("manager:s3cret, lead:0verride");
        assert_eq!(
            pairs,
            vec![
                ("manager".to_string(), "s3cret".to_string()),
                ("lead".to_string(), "0verride".to_string()),
            ]
        );
    }

    #[test]
    fn skips_malformed_pairs() {
        let pairs = parse_override_secrets("no-colon,user:ok");
        assert_eq!(pairs, vec![("user".to_string(), "ok".to_string())]);
    }
}
