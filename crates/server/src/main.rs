//! remote-usb server
//!
//! Binds a TCP listener, accepts one connection at a time, and serves the
//! USB call protocol against the machine's host controller. All native
//! USB state lives here; clients hold nothing but portable identities.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use protocol::{Role, Session};
use server::config::ServerConfig;
use server::usb::{NativeHost, UsbHost};
use server::Dispatcher;
use std::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "remote-usb-server")]
#[command(
    author,
    version,
    about = "Expose this machine's USB devices to a remote client over TCP"
)]
struct Args {
    /// Address to listen on (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ServerConfig::default();
        let path = ServerConfig::default_path();
        config.save(&path).context("failed to save configuration")?;
        println!("configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ServerConfig::load(Some(path.clone())).context("failed to load configuration")?
    } else {
        ServerConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);
    setup_logging(log_level).context("failed to setup logging")?;

    info!("remote-usb server v{}", env!("CARGO_PKG_VERSION"));

    if args.list_devices {
        return list_devices_mode();
    }

    let bind_addr = args.bind.as_deref().unwrap_or(&config.server.bind_addr);
    let listener = TcpListener::bind(bind_addr)
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("listening on {}", bind_addr);

    // One client at a time; the protocol is strictly half-duplex with no
    // correlation ids, so connections are served sequentially.
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!("client connected: {peer}");

        let mut session = Session::from_tcp(stream, Role::Server);
        let mut dispatcher = Dispatcher::new(NativeHost::new());
        match dispatcher.serve(&mut session) {
            Ok(()) => info!("client disconnected: {peer}"),
            Err(e) => warn!("session ended with error: {e}"),
        }
    }

    Ok(())
}

/// Enumerate devices locally and print them, without serving.
fn list_devices_mode() -> Result<()> {
    let mut host = NativeHost::new();
    host.init().context("failed to initialize USB context")?;

    let devices = host.devices().context("failed to enumerate devices")?;
    println!("{} device(s)", devices.len());
    for device in &devices {
        let id = match host.identify(device) {
            Ok(id) => id,
            Err(e) => {
                warn!("skipping unidentifiable device: {e}");
                continue;
            }
        };
        match host.descriptor(device) {
            Ok(desc) => println!(
                "bus {:03} addr {:03} id {:04x}:{:04x} configs {}",
                id.bus_number, id.device_address, desc.idVendor, desc.idProduct, id.num_configurations
            ),
            Err(e) => println!(
                "bus {:03} addr {:03} (descriptor unavailable: {e})",
                id.bus_number, id.device_address
            ),
        }
    }
    host.exit();
    Ok(())
}
