use std::sync::Arc;

use tgw_core::config::Config;
use tgw_ngrok::NgrokBroker;

#[tokio::main]
async fn main() -> Result<(), tgw_core::Error> {
    tgw_core::logging::init("tgw")?;

    let cfg = Arc::new(Config::load()?);
    let broker = Arc::new(NgrokBroker::new(cfg.ngrok_authtoken.clone()));

    tgw_telegram::router::run_webhook(cfg, broker)
        .await
        .map_err(|e| tgw_core::Error::External(format!("webhook gateway failed: {e:#}")))?;

    Ok(())
}
