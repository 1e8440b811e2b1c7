//! keymux CLI
//!
//! Inspection and configuration tool for keymux.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use evdev::InputEventKind;
use miette::IntoDiagnostic;

#[derive(Parser, Debug)]
#[command(name = "keymux")]
#[command(about = "Input event multiplexing tool")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/keymux/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// List available input devices
    Devices,

    /// Print the event stream of one device
    Events {
        /// Device node (e.g., /dev/input/event3)
        path: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Devices => cmd_devices(),
        Commands::Events { path } => cmd_events(&path),
    }
}

fn cmd_validate(config_path: &PathBuf) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = keymux_config::parse_config(config_path).map_err(miette::Report::new)?;

    println!("Configuration is valid!");
    println!("  Virtual device name: {}", config.global.device_name);
    println!("  Captures: {}", config.captures.len());
    for capture in &config.captures {
        let rules: usize = capture.buckets.iter().map(Vec::len).sum();
        println!(
            "    - {} ({} rule(s), grab: {})",
            capture.name, rules, capture.grab
        );
    }

    Ok(())
}

fn cmd_devices() -> miette::Result<()> {
    println!("Available input devices:\n");

    for entry in std::fs::read_dir("/dev/input").into_diagnostic()? {
        let entry = entry.into_diagnostic()?;
        let path = entry.path();

        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false)
        {
            continue;
        }

        match evdev::Device::open(&path) {
            Ok(device) => {
                let name = device.name().unwrap_or("Unknown");
                let id = device.input_id();
                let vendor_product = format!("{:04x}:{:04x}", id.vendor(), id.product());

                // Check if it's a keyboard
                let is_keyboard = device.supported_events().contains(evdev::EventType::KEY)
                    && device
                        .supported_keys()
                        .map(|keys| keys.contains(evdev::Key::KEY_A))
                        .unwrap_or(false);

                let device_type = if is_keyboard { "keyboard" } else { "other" };

                println!("  {} [{}]", name, device_type);
                println!("    Path: {}", path.display());
                println!("    ID: {}", vendor_product);
                println!();
            }
            Err(_) => {
                // Skip devices we can't open
            }
        }
    }

    Ok(())
}

fn cmd_events(path: &PathBuf) -> miette::Result<()> {
    let mut device = evdev::Device::open(path).into_diagnostic()?;

    println!(
        "Reading events from '{}' ({}), Ctrl-C to stop\n",
        device.name().unwrap_or("Unknown"),
        path.display()
    );

    loop {
        for event in device.fetch_events().into_diagnostic()? {
            let seconds = event
                .timestamp()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            match event.kind() {
                InputEventKind::Synchronization(_) => {
                    println!("[{}] SYN", seconds);
                }
                InputEventKind::Key(key) => {
                    let action = match event.value() {
                        0 => "up",
                        1 => "down",
                        2 => "repeat",
                        _ => "?",
                    };
                    println!("[{}] KEY {:?} {}", seconds, key, action);
                }
                kind => {
                    println!("[{}] {:?} {}", seconds, kind, event.value());
                }
            }
        }
    }
}
