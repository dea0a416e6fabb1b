use std::path::PathBuf;

use lamp_ble_server::config::{CONFIG_FILE, RECORD_FILE};
use lamp_ble_server::{DeviceRecord, Persistence, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[command(name = "rpi-ble-srv")]
#[command(about = "Serve lamp identity and WiFi settings over BLE")]
struct Cli {
    /// Device record file (default: $LAMP_HOME/device.info)
    #[arg(long)]
    record: Option<PathBuf>,
    /// Advertised local name
    #[arg(long)]
    name: Option<String>,
    /// Wireless interface to take the MAC address from
    #[arg(long)]
    interface: Option<String>,
    /// Save record changes on disconnect instead of on every write
    #[arg(long)]
    deferred: bool,
    /// Rewrite this wpa_supplicant.conf with provisioned WiFi settings
    #[arg(long)]
    wpa_supplicant: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli: Cli = clap::Parser::parse();
    let home = lamp_ble_server::lamp_home()?;

    let mut config = ServerConfig::load_or_create(&home.join(CONFIG_FILE))?;
    if let Some(name) = cli.name {
        config.advertised_name = name;
    }
    if let Some(interface) = cli.interface {
        config.interface = interface;
    }
    if cli.deferred {
        config.persistence = Persistence::Deferred;
    }
    if let Some(conf) = cli.wpa_supplicant {
        config.wpa_supplicant = Some(conf);
    }

    let record_path = cli.record.unwrap_or_else(|| home.join(RECORD_FILE));
    let (record, created) =
        DeviceRecord::load_or_create(&record_path, &config.interface, config.persistence)?;
    if created {
        tracing::info!(path = %record_path.display(), mac = %record.mac(), "created device record");
    }

    serve(record, &config).await
}

#[cfg(target_os = "linux")]
async fn serve(record: DeviceRecord, config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    use lamp_ble_server::bluez::BluezBackend;
    use lamp_ble_server::{ConnectionEventLog, PeripheralController, RegistrationError, build_services};

    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let backend = BluezBackend::new(tx).await?;
    let mut controller = PeripheralController::new(backend, record);
    if let Some(wifi) = config.wifi_applier() {
        tracing::info!(path = %wifi.conf_path.display(), "applying provisioned WiFi settings");
        controller = controller.with_wifi(wifi);
    }
    ConnectionEventLog::attach(&mut controller);

    let services = build_services(controller.record());
    match controller.start(services, &config.advertised_name).await {
        Ok(()) => {}
        Err(RegistrationError::Backend(e)) => {
            tracing::error!(error = %e, "could not start advertising, will retry");
        }
        Err(e) => return Err(e.into()),
    }

    tokio::select! {
        _ = controller.run(rx) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    controller.shutdown().await;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn serve(_record: DeviceRecord, _config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    Err("rpi-ble-srv needs BlueZ and only runs on Linux".into())
}
