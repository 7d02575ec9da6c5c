//! OCPP CSMS - charging station management system
//!
//! Listens for charging stations, authenticates them with HTTP Basic auth,
//! negotiates an OCPP subprotocol and answers their calls. Takes no
//! arguments; credentials and bind address are fixed configuration.
//!
//! # Usage
//!
//! ```bash
//! ocpp-csms
//! ```

use std::sync::Arc;

use ocpp_session::{Credentials, Csms, CsmsConfig, CsmsServer, LogFormat, Settings};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// Station credentials accepted by this deployment.
const USERNAME: &str = "test";
const PASSWORD: &str = "123";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::default();
    let config = CsmsConfig::default();

    // Setup logging
    let level = match settings.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    match settings.log_format {
        LogFormat::Compact => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_thread_ids(false)
                .compact()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Full => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_thread_ids(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    // Print banner
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          OCPP CSMS - Charging Station Management             ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Bind:     {:<50} ║", settings.bind_addr());
    println!("║  Protocol: {:<50} ║", settings.ocpp_subprotocols.join(", "));
    println!("║  Stations: {:<50} ║", config.provisioned_stations.join(", "));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let server = CsmsServer::bind(
        settings,
        Credentials::new(USERNAME, PASSWORD),
        Arc::new(Csms::new(config)),
    )
    .await?;
    server.run().await?;

    Ok(())
}
