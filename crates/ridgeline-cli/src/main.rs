//! Ridgeline - operator tool for R307 fingerprint sensors

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ridgeline_biometric::{FingerprintScanner, ScannerConfig};
use ridgeline_core::constants::{
    DEFAULT_ADDRESS, DEFAULT_BAUD_RATE, DEFAULT_CAPTURE_TIMEOUT_SECS, DEFAULT_IMAGE_DIR,
};
use ridgeline_core::{Disposition, SearchOutcome, SensorConfig, parse_u32_literal};
use ridgeline_hardware::AnyConnector;
use ridgeline_hardware::mock::MockConnector;
use ridgeline_hardware::r307::SerialConnector;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Ridgeline - enroll, identify and maintain fingerprints on an R307 sensor
#[derive(Parser, Debug)]
#[command(name = "ridgeline", version, about)]
struct Cli {
    /// Serial port the sensor is attached to
    #[arg(long, env = "RIDGELINE_PORT", default_value = "/dev/ttyUSB0", global = true)]
    port: String,

    /// Serial speed
    #[arg(long, env = "RIDGELINE_BAUD", default_value_t = DEFAULT_BAUD_RATE, global = true)]
    baud: u32,

    /// Module address (decimal or 0x hex)
    #[arg(long, env = "RIDGELINE_ADDRESS", value_parser = parse_u32_arg, default_value_t = DEFAULT_ADDRESS, global = true)]
    address: u32,

    /// Module password (decimal or 0x hex)
    #[arg(long, env = "RIDGELINE_PASSWORD", value_parser = parse_u32_arg, default_value_t = 0, hide_env_values = true, global = true)]
    password: u32,

    /// Seconds to wait for a finger
    #[arg(long, env = "RIDGELINE_TIMEOUT", default_value_t = DEFAULT_CAPTURE_TIMEOUT_SECS, global = true)]
    timeout: u64,

    /// Directory captured images are written to
    #[arg(long, env = "RIDGELINE_IMAGES_DIR", default_value = DEFAULT_IMAGE_DIR, global = true)]
    images_dir: PathBuf,

    /// Never fall back to slot 0 when storing a template
    #[arg(long, global = true)]
    no_slot_zero: bool,

    /// Use a simulated sensor with a finger always on it
    #[arg(long, global = true)]
    simulate: bool,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture one image and save it as BMP
    Capture,

    /// Enroll a finger (two captures)
    Enroll,

    /// Identify a finger against the stored templates
    Search,

    /// Show the template count and occupied slots
    Status,

    /// List occupied slots
    List,

    /// Delete the template at a slot
    Delete {
        /// Slot to delete
        position: u16,
    },

    /// Erase every stored template
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn parse_u32_arg(input: &str) -> std::result::Result<u32, String> {
    parse_u32_literal(input).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Exit status by failure class: 2 fix the request, 3 sensor unavailable,
/// 4 try again, 1 anything else.
fn exit_code(error: &anyhow::Error) -> u8 {
    match error
        .downcast_ref::<ridgeline_core::Error>()
        .map(|e| e.disposition())
    {
        Some(Disposition::ClientCorrectable) => 2,
        Some(Disposition::ServiceUnavailable) => 3,
        Some(Disposition::ClientRetryable) => 4,
        None => 1,
    }
}

fn scanner_config(cli: &Cli) -> Result<ScannerConfig> {
    let sensor = SensorConfig::new(cli.port.clone())
        .baud_rate(cli.baud)
        .address(cli.address)
        .password(cli.password);

    let config = ScannerConfig::new(sensor)
        .with_capture_timeout_secs(cli.timeout)
        .with_images_dir(cli.images_dir.clone())
        .with_slot_zero_fallback(!cli.no_slot_zero);
    config.validate()?;
    Ok(config)
}

fn connector(cli: &Cli) -> AnyConnector {
    if cli.simulate {
        let (connector, handle) = MockConnector::new();
        handle.rest_finger(Some(vec![0x5A; 32]));
        AnyConnector::Mock(connector)
    } else {
        AnyConnector::Serial(SerialConnector::new())
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = scanner_config(&cli)?;
    debug!("Using {:?}", config);
    let timeout = Duration::from_secs(cli.timeout);
    let scanner = FingerprintScanner::new(config, connector(&cli));

    match &cli.command {
        Commands::Capture => cmd_capture(&scanner, &cli, timeout).await,
        Commands::Enroll => cmd_enroll(&scanner, &cli, timeout).await,
        Commands::Search => cmd_search(&scanner, &cli, timeout).await,
        Commands::Status => cmd_status(&scanner, &cli).await,
        Commands::List => cmd_list(&scanner, &cli).await,
        Commands::Delete { position } => cmd_delete(&scanner, &cli, *position).await,
        Commands::Clear { yes } => cmd_clear(&scanner, &cli, *yes).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

type Scanner = FingerprintScanner<AnyConnector>;

async fn cmd_capture(scanner: &Scanner, cli: &Cli, timeout: Duration) -> Result<()> {
    eprintln!("Place finger on the sensor...");
    let path = scanner.capture(timeout).await?;

    if cli.json {
        println!("{}", json!({ "path": path }));
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

async fn cmd_enroll(scanner: &Scanner, cli: &Cli, timeout: Duration) -> Result<()> {
    eprintln!("Place finger on the sensor, lift it when asked, then place it again...");
    let enrollment = scanner.enroll(timeout).await?;

    if cli.json {
        println!("{}", serde_json::to_string(&enrollment)?);
    } else {
        println!("{}", enrollment.slot);
        if enrollment.verification_skipped {
            eprintln!("warning: the sensor could not compare the two captures");
        }
        eprintln!("Template stored at slot {}", enrollment.slot);
    }
    Ok(())
}

async fn cmd_search(scanner: &Scanner, cli: &Cli, timeout: Duration) -> Result<()> {
    eprintln!("Place finger on the sensor...");
    let outcome = scanner.search(timeout).await?;

    if cli.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        match outcome {
            SearchOutcome::Found { slot, score } => {
                println!("{slot}");
                eprintln!("Found template at slot {slot} (score {score})");
            }
            SearchOutcome::NotFound => eprintln!("No match found"),
        }
    }
    Ok(())
}

async fn cmd_status(scanner: &Scanner, cli: &Cli) -> Result<()> {
    let status = scanner.report().await?;

    if cli.json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        match status.template_count {
            Some(count) => println!("Templates stored: {count}"),
            None => println!("Templates stored: unknown"),
        }
        if !status.is_empty() {
            println!(
                "Occupied slots (0-{}): {:?}",
                scanner.config().scan_capacity - 1,
                status.occupied
            );
        }
        if status.is_partial() {
            eprintln!("note: some templates live outside the scanned slot range");
        }
    }
    Ok(())
}

async fn cmd_list(scanner: &Scanner, cli: &Cli) -> Result<()> {
    let slots = scanner.list_occupied().await?;

    if cli.json {
        println!("{}", json!({ "occupied": slots }));
    } else if slots.is_empty() {
        eprintln!("No templates found");
    } else {
        for slot in slots {
            println!("{slot}");
        }
    }
    Ok(())
}

async fn cmd_delete(scanner: &Scanner, cli: &Cli, position: u16) -> Result<()> {
    scanner.delete_slot(position).await?;

    if cli.json {
        println!("{}", json!({ "deleted": position }));
    } else {
        eprintln!("Deleted template at slot {position}");
    }
    Ok(())
}

async fn cmd_clear(scanner: &Scanner, cli: &Cli, yes: bool) -> Result<()> {
    if !yes {
        if cli.json {
            bail!("Refusing to clear without --yes in JSON mode");
        }
        if !confirm(&format!(
            "Erase ALL templates on {}? This cannot be undone. [y/N] ",
            cli.port
        ))? {
            eprintln!("Aborted");
            return Ok(());
        }
    }

    let previous = scanner.clear_all().await?;
    if cli.json {
        println!("{}", json!({ "cleared": previous }));
    } else {
        match previous {
            Some(0) => eprintln!("Database already empty"),
            Some(count) => eprintln!("Erased {count} templates"),
            None => eprintln!("Database erased"),
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    io::stderr().flush().context("Failed to write prompt")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ridgeline").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["status"]);
        assert_eq!(cli.baud, 57_600);
        assert_eq!(cli.address, 0xFFFF_FFFF);
        assert_eq!(cli.password, 0);
        assert_eq!(cli.timeout, 10);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_hex_password_and_delete() {
        let cli = parse(&["--password", "0x0000ABCD", "delete", "12"]);
        assert_eq!(cli.password, 0xABCD);
        assert!(matches!(cli.command, Commands::Delete { position: 12 }));
    }

    #[test]
    fn test_invalid_password_rejected() {
        assert!(Cli::try_parse_from(["ridgeline", "--password", "0xZZ", "status"]).is_err());
    }

    #[test]
    fn test_clear_requires_flag_for_yes() {
        assert!(matches!(parse(&["clear"]).command, Commands::Clear { yes: false }));
        assert!(matches!(parse(&["clear", "--yes"]).command, Commands::Clear { yes: true }));
    }

    #[test]
    fn test_exit_codes_follow_disposition() {
        let timeout = anyhow::Error::new(ridgeline_core::Error::CaptureTimeout { timeout_ms: 1 });
        let missing = anyhow::Error::new(ridgeline_core::Error::SlotNotFound(3));
        let offline = anyhow::Error::new(ridgeline_core::Error::HardwareUnavailable("x".into()));

        assert_eq!(exit_code(&timeout), 4);
        assert_eq!(exit_code(&missing), 2);
        assert_eq!(exit_code(&offline), 3);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_invalid_baud_is_config_error() {
        let cli = parse(&["--baud", "1234", "status"]);
        let error = scanner_config(&cli).unwrap_err();
        assert_eq!(exit_code(&error), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_simulated_enroll() {
        let cli = parse(&["--simulate", "--no-slot-zero", "enroll"]);
        let scanner = FingerprintScanner::new(scanner_config(&cli).unwrap(), connector(&cli));

        let enrollment = scanner.enroll(Duration::from_secs(1)).await.unwrap();
        assert_eq!(enrollment.slot, 0);
    }
}
