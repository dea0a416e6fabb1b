//! BLE setup tool for lamps
//!
//! Finds a lamp, shows its identity and sends it a name and WiFi settings.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lamp_ble_controller::btle::{AdapterScanSource, BtlePeripheral, default_adapter};
use lamp_ble_controller::{
    CentralScanner, CentralServiceResolver, DiscoveryError, Resolution, ScanEvent, ScanSource,
    SearchOutcome,
};
use lamp_proto::ble::ADVERTISED_NAME;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lamp-ble")]
#[command(about = "BLE setup tool for lamps")]
struct Cli {
    /// Advertised name of the lamp
    #[arg(short, long, global = true, default_value = ADVERTISED_NAME)]
    name: String,
    /// Seconds to search for the lamp
    #[arg(short, long, global = true, default_value = "10")]
    timeout: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List advertising devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Show the lamp's name, MAC address and network
    Show,
    /// Rename the lamp
    SetName {
        /// New name, at most 64 bytes
        value: String,
    },
    /// Send WiFi settings to the lamp
    SetNetwork {
        /// WiFi credentials file (SSID on line 1, password on line 2)
        #[arg(short, long, conflicts_with_all = ["ssid", "password"])]
        file: Option<String>,
        #[arg(long, requires = "password")]
        ssid: Option<String>,
        #[arg(long, requires = "ssid")]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Scan { duration } => scan_devices(&cli.name, duration).await?,
        Commands::Show => {
            let lamp = connect_lamp(&cli.name, timeout).await?;
            println!("Name:     {}", lamp.read_device_name().await?);
            println!("MAC:      {}", lamp.read_device_mac().await?);
            let ssid = lamp.read_network_ssid().await?;
            if ssid.is_empty() {
                println!("Network:  (not configured)");
            } else {
                println!("Network:  {}", ssid);
            }
            let _ = lamp.disconnect().await;
        }
        Commands::SetName { value } => {
            let lamp = connect_lamp(&cli.name, timeout).await?;
            lamp.set_device_name(&value).await?;
            println!("Name set to {}", value);
            let _ = lamp.disconnect().await;
        }
        Commands::SetNetwork {
            file,
            ssid,
            password,
        } => {
            let (ssid, password) = match (file, ssid, password) {
                (Some(file), _, _) => read_wifi_credentials(&file)?,
                (None, Some(ssid), Some(password)) => (ssid, password),
                _ => read_wifi_credentials("wifi_credentials.txt")?,
            };
            let lamp = connect_lamp(&cli.name, timeout).await?;
            println!("Sending WiFi settings...");
            println!("  SSID: {}", ssid);
            lamp.set_network(&ssid, &password).await?;
            println!("WiFi settings sent!");
            let _ = lamp.disconnect().await;
        }
    }

    Ok(())
}

fn read_wifi_credentials(file: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let mut lines = content.lines();
    let ssid = lines.next().ok_or("Missing SSID in credentials file")?.trim().to_string();
    let password = lines.next().ok_or("Missing password in credentials file")?.trim().to_string();
    Ok((ssid, password))
}

async fn scan_devices(target: &str, duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for devices ({} seconds)...", duration);

    let mut source = AdapterScanSource::new(default_adapter().await?);
    source.start_scan().await?;

    let mut seen = BTreeMap::new();
    let collect = async {
        while let Some(event) = source.next_event().await {
            match event {
                ScanEvent::Discovered(p) => {
                    seen.insert(p.id, p.advertised_name);
                }
                ScanEvent::Error(e) => eprintln!("Scan error: {}", e),
                ScanEvent::Finished => break,
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(duration), collect).await;
    source.stop_scan().await?;

    println!("\nFound {} devices:", seen.len());
    for (id, name) in seen {
        let name = name.unwrap_or_else(|| "Unknown".to_string());
        let marker = if name == target { " [LAMP]" } else { "" };
        println!("  {} ({}){}", name, id, marker);
    }
    Ok(())
}

async fn connect_lamp(
    target: &str,
    timeout: Duration,
) -> Result<CentralServiceResolver<BtlePeripheral>, Box<dyn std::error::Error>> {
    println!("Searching for {}...", target);

    let mut source = AdapterScanSource::new(default_adapter().await?);
    let found = match CentralScanner::new()
        .start_search(&mut source, target, timeout)
        .await?
    {
        SearchOutcome::DeviceFound(found) => found,
        _ => return Err(DiscoveryError::DeviceNotFound.into()),
    };
    println!("Found device: {}", found.id);

    println!("Connecting...");
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let lamp = CentralServiceResolver::new(BtlePeripheral::new(found.handle), tx);
    match lamp.connect().await? {
        Resolution::Ready => println!("Connected!"),
        Resolution::PartialFailure {
            missing_services,
            invalid_characteristics,
        } => {
            for service in missing_services {
                eprintln!("  {} service not found", service);
            }
            for characteristic in invalid_characteristics {
                eprintln!("  {} characteristic is invalid", characteristic);
            }
            let _ = lamp.disconnect().await;
            return Err("lamp services are incomplete".into());
        }
    }
    Ok(lamp)
}
