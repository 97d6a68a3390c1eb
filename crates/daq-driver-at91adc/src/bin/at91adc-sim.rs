//! Simulated AT91 ADC session.
//!
//! Drives the acquisition driver against the simulated SoC, so the full
//! open / stream / close cycle can be exercised without the board.
//!
//! # Usage
//!
//! Stream five buffers from channels 0 and 1 at 8 bits:
//! ```bash
//! at91adc-sim stream --channels 0x3 --resolution 8 --buffers 5
//! ```
//!
//! Single-shot read of every channel on an idle converter:
//! ```bash
//! at91adc-sim sample
//! ```
//!
//! Set `RUST_LOG=daq_driver_at91adc=debug` to see the derived hardware values.

use std::io::Read;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_driver_at91adc::settings::CHANNEL_COUNT;
use daq_driver_at91adc::sim::SimulatedSoc;
use daq_driver_at91adc::{AdcError, At91Adc, Attribute, DeviceConfig, ReadMode, Resolution};

#[derive(Parser)]
#[command(name = "at91adc-sim")]
#[command(about = "Run the AT91 ADC driver against a simulated SoC", long_about = None)]
struct Cli {
    /// Device configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream completed buffers and report throughput
    Stream {
        /// Scan frequency in Hz
        #[arg(long)]
        frequency: Option<u32>,

        /// Resolution in bits (8 or 10)
        #[arg(long)]
        resolution: Option<u32>,

        /// Channel mask, e.g. 0xF or 5
        #[arg(long)]
        channels: Option<String>,

        /// Number of PDC transfers to simulate
        #[arg(long, default_value = "4")]
        buffers: u32,

        /// Delay between simulated transfers in milliseconds
        #[arg(long, default_value = "50")]
        interval_ms: u64,
    },

    /// Single-shot read of every channel while idle
    Sample,

    /// Print every attribute
    Attrs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DeviceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DeviceConfig::default(),
    };

    let soc = SimulatedSoc::new();
    for channel in 0..CHANNEL_COUNT {
        soc.set_input(channel, 0x080 + u16::from(channel) * 0x0C0);
    }
    let adc = At91Adc::new(soc.hardware(), config).context("creating device")?;

    match cli.command {
        Commands::Stream {
            frequency,
            resolution,
            channels,
            buffers,
            interval_ms,
        } => {
            if let Some(frequency) = frequency {
                adc.set_attribute("frequency", &frequency.to_string())?;
            }
            if let Some(resolution) = resolution {
                adc.set_attribute("resolution", &resolution.to_string())?;
            }
            if let Some(channels) = channels {
                apply_channel_mask(&adc, &channels)?;
            }
            stream(&soc, &adc, buffers, Duration::from_millis(interval_ms))
        }
        Commands::Sample => sample(&adc),
        Commands::Attrs => {
            for attribute in Attribute::all() {
                let name = attribute.to_string();
                println!("{name:<12} {}", adc.attribute(&name)?);
            }
            Ok(())
        }
    }
}

fn apply_channel_mask(adc: &At91Adc, text: &str) -> Result<()> {
    let mask = daq_driver_at91adc::attributes::parse_unsigned(text)?;
    for channel in 0..CHANNEL_COUNT {
        let enabled = mask & (1 << channel) != 0;
        adc.set_attribute(&format!("ch{channel}_enable"), if enabled { "1" } else { "0" })?;
    }
    Ok(())
}

fn stream(soc: &SimulatedSoc, adc: &At91Adc, buffers: u32, interval: Duration) -> Result<()> {
    let settings = adc.open().context("opening device")?;
    println!(
        "Streaming {} at {} Hz, channels {:#06b}",
        settings.resolution,
        settings.frequency,
        settings.channels.bits()
    );

    let started = Instant::now();
    let total = thread::scope(|scope| -> Result<usize> {
        scope.spawn(|| {
            for _ in 0..buffers {
                thread::sleep(interval);
                soc.complete_transfer();
            }
            thread::sleep(interval);
            adc.close();
        });

        let mut reader = adc.stream_reader(ReadMode::Blocking);
        let mut chunk = vec![0u8; 4096];
        let mut total = 0usize;
        loop {
            match reader.read(&mut chunk) {
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => match e.get_ref().and_then(|inner| inner.downcast_ref::<AdcError>()) {
                    Some(AdcError::NotOpen) => break,
                    _ => return Err(e.into()),
                },
            }
        }
        Ok(total)
    })?;

    let elapsed = started.elapsed().as_secs_f64();
    let samples = total / settings.resolution.sample_width();
    println!(
        "Read {total} bytes ({samples} samples) in {elapsed:.3} s, {:.0} samples/s",
        samples as f64 / elapsed.max(f64::EPSILON)
    );
    Ok(())
}

fn sample(adc: &At91Adc) -> Result<()> {
    let settings = adc.settings();
    for channel in 0..CHANNEL_COUNT {
        let value = adc.read_value(channel)?;
        let full_scale = match settings.resolution {
            Resolution::Bits8 => 0xFF,
            Resolution::Bits10 => 0x3FF,
        };
        println!(
            "ch{channel}: {value:>4} ({:>5.1}% of full scale)",
            f64::from(value) * 100.0 / f64::from(full_scale)
        );
    }
    Ok(())
}
