//! AuthSession binary entry point

use authsession::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging from the `logging` section
/// 3. Initialize AppState
/// 4. Reconcile the session with the backend
/// 5. Start background recheck task (if configured)
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging (RUST_LOG overrides logging.level)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.filter_directive().into());

    if config.logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!(
        base_url = %config.authority.base_url,
        timeout_ms = config.authority.timeout_ms,
        "Starting AuthSession..."
    );

    // 3. Initialize metrics
    authsession::metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config)?;

    // 5. Resolve the initial Unknown state
    state.session.reconcile().await;
    let current = state.session.state();
    tracing::info!(
        status = current.status().as_str(),
        user_id = current.identity().map(|identity| identity.id),
        "Session reconciled"
    );

    // 6. Keep the session fresh until interrupted
    if state.config.session.recheck_interval_seconds > 0 {
        spawn_recheck_task(state.clone());
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
    }

    tracing::debug!(metrics = %authsession::metrics::gather_text(), "Final metrics");

    Ok(())
}

/// Spawn background recheck task
fn spawn_recheck_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.session.recheck_interval_seconds;
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick; the boot reconcile already ran.
        interval.tick().await;

        let mut last = state.session.status();
        loop {
            interval.tick().await;

            state.session.reconcile().await;
            let status = state.session.status();
            if status != last {
                tracing::info!(
                    from = last.as_str(),
                    to = status.as_str(),
                    "Session status changed on recheck"
                );
                last = status;
            }
        }
    });

    tracing::info!("Session recheck task spawned");
}
