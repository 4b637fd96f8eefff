use std::sync::Arc;
use till_client::HttpOrderService;
use till_pos::{PosConfig, StartupOutcome, TabSessionManager, init_logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env is optional)
    dotenv::dotenv().ok();
    let config = PosConfig::from_env();

    // 2. Logging
    init_logger(
        &config.log_level,
        config.log_json,
        config.log_dir.as_deref(),
        config.log_retention_days,
    )?;
    tracing::info!(
        environment = %config.environment,
        order_service = %config.order_service_url,
        "Till starting"
    );

    // 3. Order service
    let service = Arc::new(HttpOrderService::new(&config.client_config())?);

    // 4. Cold-start reconciliation
    let mut tabs = TabSessionManager::new(service, config.order_type, config.windows);
    match tabs.start().await {
        Ok(StartupOutcome::Restored { tabs: count }) => {
            tracing::info!(tabs = count, "Open tabs restored");
        }
        Ok(StartupOutcome::NoStagedOrders) => {
            tracing::info!("No open tabs; waiting for the cashier to open one");
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup reconciliation failed");
            return Err(e.into());
        }
    }

    Ok(())
}
