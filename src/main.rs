//! SafeTrail - Tourist safety monitoring and incident response.
//!
//! # API Endpoints
//!
//! - `POST /auth/login`, `POST /auth/logout`, `POST /auth/signup`
//! - `PUT /tourists/:id` - Record a telemetry snapshot
//! - `GET /tourists` - Score cards filtered by tier or search, with tier counts
//! - `GET /tourists/:id/assessment` - Safety score and tier
//! - `GET /tourists/at-risk` - Tourists below the at-risk threshold
//! - `POST /incidents`, `GET /incidents`, `GET /incidents/board`
//! - `GET /incidents/:id`, `POST /incidents/:id/{status,stage,notes}`
//! - `GET /incidents/:id/protocol` - Suggested response protocol
//! - `GET|POST /zones`, `GET /zones/containing`, `GET|PUT|DELETE /zones/:id`
//! - `POST /emergency` - Dispatch an emergency report
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use safetrail::api::{self, AppState};
use safetrail::config::Config;
use safetrail::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials and tokens are never logged, even at debug
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("safetrail=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(port = config.port, db_url = %config.database_url, "Starting SafeTrail server");

    if config.demo_credentials {
        warn!("Using demo credentials; set SAFETRAIL_TOURIST_* and SAFETRAIL_AUTHORITY_* to override");
    }
    if config.tiers_rejected {
        warn!(
            safe_above = config.tiers.safe_above,
            caution_above = config.tiers.caution_above,
            "SAFETRAIL_TIER_SAFE_ABOVE must be greater than SAFETRAIL_TIER_CAUTION_ABOVE; using defaults"
        );
    }
    if config.report_webhook.is_none() {
        warn!("SAFETRAIL_REPORT_WEBHOOK not set; emergency reports will only be logged");
    }

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let state = AppState::new(storage, &config)?;
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "SafeTrail is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
