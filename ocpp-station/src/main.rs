//! OCPP Station - CLI charging point
//!
//! Connects to the CSMS, registers with a BootNotification and reports its
//! connector state, then shuts the session down.
//!
//! # Usage
//!
//! ```bash
//! ocpp-station --username test --password 123
//! ```

use clap::Parser;
use ocpp_session::{Credentials, LogFormat, Settings, Station, StationConfig, Supervisor};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// OCPP 2.0.1 charging station
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Username presented in the Basic Authorization header
    #[arg(short, long)]
    username: String,

    /// Password presented in the Basic Authorization header
    #[arg(short, long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = Settings::default();
    let station = Station::new(StationConfig::default());

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

    let url = settings.station_url(station.charge_point_id());

    // Print banner
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               OCPP Station - EV Charging Point               ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Station:  {:<50} ║", station.charge_point_id());
    println!("║  CSMS URL: {:<50} ║", truncate(&url, 50));
    println!("║  Username: {:<50} ║", args.username);
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let credentials = Credentials::new(&args.username, &args.password);

    // Failures are already logged by the supervisor; exit cleanly either way.
    let _ = Supervisor::run_station(&settings, &credentials, &station).await;

    Ok(())
}

/// Truncate string with ellipsis, cutting on a character boundary
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn test_truncate_keeps_short_strings() {
        assert_eq!(truncate("ws://127.0.0.1:6000/CP_01", 50), "ws://127.0.0.1:6000/CP_01");
    }

    #[test]
    fn test_truncate_cuts_on_character_boundaries() {
        assert_eq!(truncate(&"Ø".repeat(10), 8), format!("{}...", "Ø".repeat(5)));
    }
}
