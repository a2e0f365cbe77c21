use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use mbus_heatmeter::logging::{log_debug, log_error, log_warn};
use mbus_heatmeter::mbus::frame::validate_frame;
use mbus_heatmeter::mbus::handshake::{init_request, poll_request, InitState};
use mbus_heatmeter::util::hex::{decode_hex, format_hex_pretty};
use mbus_heatmeter::{
    decode_telegram, init_logger, log_info, Channel, Indicator, MBusError, Meter, MeterConfig,
    MeterSink, SerialConfig, SerialTransport,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "mbus-heatmeter")]
#[command(about = "Reads a heat meter over wired M-Bus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the meter and poll it until interrupted
    Run {
        #[arg(short, long)]
        port: String,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        baudrate: Option<u32>,
        #[arg(long)]
        energy_decimals: Option<u8>,
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Validate and decode a captured telegram given as hex
    Decode { hex: String },
    /// Print the handshake and poll requests
    Requests,
}

/// Prints every published value as a JSON line.
struct ConsoleSink;

impl MeterSink for ConsoleSink {
    fn publish(&mut self, channel: Channel, value: f64) {
        let line = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "channel": channel,
            "value": value,
            "unit": channel.unit(),
        });
        println!("{line}");
    }

    fn publish_status(&mut self, text: &str) {
        let line = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "channel": Channel::Status,
            "status": text,
        });
        println!("{line}");
    }
}

/// Reports the data indicator in the log.
struct LogIndicator;

impl Indicator for LogIndicator {
    fn set(&mut self, on: bool) {
        debug!("Data indicator {}", if on { "on" } else { "off" });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            port,
            config,
            baudrate,
            energy_decimals,
            poll_interval_ms,
        } => {
            let mut config = match config {
                Some(path) => MeterConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => MeterConfig::default(),
            };
            if let Some(baudrate) = baudrate {
                config.baud_rate = baudrate;
            }
            if let Some(decimals) = energy_decimals {
                config.energy_decimals = decimals;
            }
            if let Some(interval) = poll_interval_ms {
                config.poll_interval_ms = interval;
            }
            run(&port, config).await?;
        }
        Commands::Decode { hex } => decode(&hex)?,
        Commands::Requests => {
            for step in [
                InitState::Step1,
                InitState::Step2,
                InitState::Step3,
                InitState::Step4,
                InitState::Step5,
            ] {
                if let Some(request) = init_request(step) {
                    println!("{step}: {}", format_hex_pretty(&request));
                }
            }
            println!("poll: {}", format_hex_pretty(&poll_request(false)));
        }
    }

    Ok(())
}

async fn run(port: &str, config: MeterConfig) -> Result<()> {
    let mut meter = Meter::new(config.clone()).context("invalid configuration")?;
    let serial_config = SerialConfig {
        baudrate: config.baud_rate,
        ..SerialConfig::default()
    };
    let mut transport = SerialTransport::connect_with_config(port, serial_config)
        .with_context(|| format!("opening {port}"))?;
    meter.dump_config();

    let mut sink = ConsoleSink;
    let mut indicator = LogIndicator;
    let mut ticks = tokio::time::interval(config.tick_interval());
    let mut polls = tokio::time::interval(config.poll_interval());

    loop {
        tokio::select! {
            _ = polls.tick() => meter.trigger(),
            _ = ticks.tick() => {
                let now = Instant::now();
                let result = meter.tick(now, &mut transport, &mut sink, Some(&mut indicator));
                let report = match result {
                    Ok(report) => report,
                    Err(err) => {
                        log_error(&format!("Serial line failed: {err}"));
                        return Err(err.into());
                    }
                };
                if report.errors > 0 {
                    log_debug(&format!("{report:?}"));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log_info("Interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn decode(hex: &str) -> Result<()> {
    let bytes = decode_hex(hex).map_err(MBusError::from)?;
    let frame = validate_frame(&bytes).context("frame rejected")?;
    let telegram = decode_telegram(&frame).context("not a data telegram")?;

    let header = &telegram.header;
    match header.id {
        Some(id) => println!("Identification: {id:08}"),
        None => println!("Identification: invalid BCD"),
    }
    println!("Manufacturer: {}", header.manufacturer);
    println!(
        "Version: {}, medium: 0x{:02X}, access number: {}, status: 0x{:02X}",
        header.version, header.medium, header.access_number, header.status
    );
    for record in &telegram.records {
        println!("{record}");
    }
    if let Some(abort) = &telegram.abort {
        log_warn(&format!("Decoding stopped: {abort}"));
        println!("Decoding stopped: {abort}");
    }
    Ok(())
}
