//! Subcommand handlers
//!
//! Thin wrappers around `murmur_core`: parse arguments, call the library,
//! print the result.

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use crossbeam_channel::{select, unbounded, Receiver};
use tracing::{info, warn};

use murmur_core::{
    run_batch, AudioDevice, AudioEngine, BatchEffect, BatchOptions, DeviceType, EngineConfig,
    Event, DEFAULT_BLOCK_SIZE,
};

use crate::console::{self, ConsoleCommand};

/// How often the live loop wakes to drain engine events
const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Args)]
pub struct LiveArgs {
    /// Engine config (JSON); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture device name
    #[arg(long)]
    input: Option<String>,

    /// Playback device name
    #[arg(long)]
    output: Option<String>,
}

#[derive(Args)]
pub struct DevicesArgs {
    /// Print the device list as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Effect to measure: noisegate, limiter, eq, deesser
    #[arg(value_parser = parse_effect)]
    effect: BatchEffect,

    /// Input WAV file
    input: PathBuf,

    /// Output WAV file (mono, 32-bit float)
    output: PathBuf,

    /// Per-block statistics table
    #[arg(long, default_value = "analysis.csv")]
    csv: PathBuf,

    /// Block length in samples
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block: usize,
}

fn parse_effect(s: &str) -> Result<BatchEffect, String> {
    s.parse().map_err(|e: murmur_core::EngineError| e.to_string())
}

pub fn live(args: LiveArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(input) = args.input {
        config.input_device = Some(input);
    }
    if let Some(output) = args.output {
        config.output_device = Some(output);
    }

    let mut engine = AudioEngine::new();
    engine.start(config).context("Failed to start audio engine")?;
    let Some(controls) = engine.controls() else {
        bail!("Engine started without a processing chain");
    };

    println!("{}", console::HELP);
    let lines = spawn_stdin_reader();

    loop {
        select! {
            recv(lines) -> line => {
                // Stdin closed: treat like quit
                let Ok(line) = line else { break };
                let mut quit = false;
                for command in ConsoleCommand::parse_line(&line) {
                    match command {
                        ConsoleCommand::Quit => quit = true,
                        ConsoleCommand::Status => {
                            println!("{}", console::status_line(&controls, &engine.stats()));
                        }
                        ConsoleCommand::Help => println!("{}", console::HELP),
                        other => {
                            if let Some(message) = console::apply(other, &controls) {
                                println!("{message}");
                            }
                        }
                    }
                }
                if quit {
                    break;
                }
            }
            default(EVENT_POLL) => {}
        }

        while let Some(event) = engine.poll_event() {
            report_event(&event);
        }
    }

    engine.stop().context("Failed to stop audio engine")?;
    while let Some(event) = engine.poll_event() {
        report_event(&event);
    }
    Ok(())
}

/// Forward stdin lines to a channel so the live loop can also wait on events
fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = unbounded();
    let spawned = thread::Builder::new()
        .name("murmur-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Could not read console input: {}", e);
    }
    receiver
}

fn report_event(event: &Event) {
    match event {
        Event::Started {
            input_device,
            output_device,
        } => println!("Running: {input_device} -> {output_device}"),
        Event::Stopped => println!("Stopped"),
        Event::Error { message } => eprintln!("Error: {message}"),
        Event::StreamFault { message } => eprintln!("Stream fault: {message}"),
        // Counted in the status line; printing each one would flood the console
        Event::BufferUnderrun | Event::InputOverflow => {}
        Event::ProcessingFinished { blocks } => info!("Processed {} blocks", blocks),
    }
}

pub fn devices(args: DevicesArgs) -> anyhow::Result<()> {
    let devices = AudioDevice::enumerate_all()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let sections = [
        ("Input Devices:", DeviceType::Input),
        ("Output Devices:", DeviceType::Output),
    ];
    for (title, device_type) in sections {
        println!("{title}");
        for device in devices.iter().filter(|d| d.device_type == device_type) {
            println!("  {device}");
        }
        println!();
    }
    println!("* = system default");
    Ok(())
}

pub fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let mut options = BatchOptions::for_effect(args.effect);
    options.block_size = args.block;

    let summary = run_batch(&args.input, &args.output, &args.csv, &options)
        .with_context(|| format!("Batch {} failed on {}", args.effect, args.input.display()))?;

    println!(
        "{}: {} blocks ({} frames at {} Hz)",
        args.effect, summary.blocks, summary.frames, summary.sample_rate
    );
    println!(
        "  RMS  {:.4} -> {:.4}\n  Peak {:.4} -> {:.4}",
        summary.input_rms, summary.output_rms, summary.input_peak, summary.output_peak
    );
    println!(
        "Output saved to {} and analysis to {}",
        args.output.display(),
        args.csv.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_effect() {
        assert_eq!(parse_effect("limiter"), Ok(BatchEffect::Limiter));
        assert!(parse_effect("chorus").unwrap_err().contains("chorus"));
    }
}
