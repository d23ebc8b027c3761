//! remote-usb client
//!
//! Connects to a remote-usb server and drives the USB call protocol from
//! the command line: list devices, fetch descriptors, open by vendor and
//! product id, read string descriptors.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client::config::ClientConfig;
use client::RemoteUsb;
use common::setup_logging;
use protocol::{DeviceId, Status};
use std::net::TcpStream;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "remote-usb-client")]
#[command(
    author,
    version,
    about = "Talk to a remote-usb server as if its USB bus were local"
)]
struct Args {
    /// Server address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    addr: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices with their identities and vendor/product ids
    List,
    /// Print the full device descriptor for one device
    Descriptor {
        /// Session id from a previous `list`
        #[arg(value_parser = parse_i32)]
        session_id: i32,
    },
    /// Open the first device matching vendor and product id
    OpenVidPid {
        #[arg(value_parser = parse_usb_id)]
        vendor_id: u16,
        #[arg(value_parser = parse_usb_id)]
        product_id: u16,
    },
    /// Read a string descriptor from a device opened by vendor/product id
    String {
        #[arg(value_parser = parse_usb_id)]
        vendor_id: u16,
        #[arg(value_parser = parse_usb_id)]
        product_id: u16,
        /// String descriptor index (for example iProduct)
        #[arg(value_parser = parse_i32)]
        index: i32,
    },
}

/// Accept `0x05ac` or `1452`.
fn parse_usb_id(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid id {s:?}: {e}"))
}

fn parse_i32(s: &str) -> Result<i32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ClientConfig::default();
        let path = ClientConfig::default_path();
        config.save(&path).context("failed to save configuration")?;
        println!("configuration saved to: {}", path.display());
        return Ok(());
    }

    let Some(command) = args.command else {
        bail!("no command given (try `list`)");
    };

    let config = if let Some(ref path) = args.config {
        ClientConfig::load(Some(path.clone())).context("failed to load configuration")?
    } else {
        ClientConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.client.log_level);
    setup_logging(log_level).context("failed to setup logging")?;

    let addr = args.addr.as_deref().unwrap_or(&config.client.server_addr);
    debug!("connecting to {addr}");
    let mut remote =
        RemoteUsb::connect(addr).with_context(|| format!("failed to connect to {addr}"))?;

    if !remote.init()?.is_success() {
        bail!("remote USB init failed");
    }

    match command {
        Command::List => list(&mut remote)?,
        Command::Descriptor { session_id } => descriptor(&mut remote, session_id)?,
        Command::OpenVidPid {
            vendor_id,
            product_id,
        } => open_vid_pid(&mut remote, vendor_id, product_id)?,
        Command::String {
            vendor_id,
            product_id,
            index,
        } => string_descriptor(&mut remote, vendor_id, product_id, index)?,
    }

    remote.exit()?;
    Ok(())
}

/// Print the device list, then each device's vendor/product pair.
fn list(remote: &mut RemoteUsb<TcpStream>) -> Result<()> {
    let list = remote.device_list()?;
    println!("{} device(s)", list.n);

    for (i, dev) in list.entries().iter().enumerate() {
        println!(
            "[{i}] bus {:03} addr {:03} configs {} session {:#x}",
            dev.bus_number, dev.device_address, dev.num_configurations, dev.session_id
        );
    }
    for (i, dev) in list.entries().iter().enumerate() {
        let (desc, status) = remote.device_descriptor(*dev)?;
        if status.is_success() {
            println!("[{i}] id {:04x}:{:04x}", desc.idVendor, desc.idProduct);
        } else {
            println!("[{i}] descriptor unavailable");
        }
    }
    Ok(())
}

fn descriptor(remote: &mut RemoteUsb<TcpStream>, session_id: i32) -> Result<()> {
    // Lookup goes by session id; the rest of the identity is advisory
    let dev = DeviceId {
        session_id,
        ..DeviceId::default()
    };
    let (desc, status) = remote.device_descriptor(dev)?;
    if status != Status::Success {
        bail!("no device with session id {session_id:#x}");
    }

    println!("bLength            {}", desc.bLength);
    println!("bDescriptorType    {}", desc.bDescriptorType);
    println!("bcdUSB             {:04x}", desc.bcdUSB);
    println!("bDeviceClass       {:02x}", desc.bDeviceClass);
    println!("bDeviceSubClass    {:02x}", desc.bDeviceSubClass);
    println!("bDeviceProtocol    {:02x}", desc.bDeviceProtocol);
    println!("bMaxPacketSize0    {}", desc.bMaxPacketSize0);
    println!("idVendor           {:04x}", desc.idVendor);
    println!("idProduct          {:04x}", desc.idProduct);
    println!("bcdDevice          {:04x}", desc.bcdDevice);
    println!("iManufacturer      {}", desc.iManufacturer);
    println!("iProduct           {}", desc.iProduct);
    println!("iSerialNumber      {}", desc.iSerialNumber);
    println!("bNumConfigurations {}", desc.bNumConfigurations);
    Ok(())
}

fn open_vid_pid(remote: &mut RemoteUsb<TcpStream>, vendor_id: u16, product_id: u16) -> Result<()> {
    match remote.open_with_vid_pid(vendor_id, product_id)? {
        Some(handle) => {
            println!(
                "opened bus {:03} addr {:03} session {:#x}",
                handle.dev.bus_number, handle.dev.device_address, handle.dev.session_id
            );
            remote.close()?;
        }
        None => bail!("no device matched {vendor_id:04x}:{product_id:04x}"),
    }
    Ok(())
}

fn string_descriptor(
    remote: &mut RemoteUsb<TcpStream>,
    vendor_id: u16,
    product_id: u16,
    index: i32,
) -> Result<()> {
    let Some(handle) = remote.open_with_vid_pid(vendor_id, product_id)? else {
        bail!("no device matched {vendor_id:04x}:{product_id:04x}");
    };

    let reply = remote.string_descriptor_ascii(handle, index, 255)?;
    if reply.retcode < 0 {
        remote.close()?;
        bail!("string descriptor {index} unavailable");
    }
    let text = String::from_utf8_lossy(reply.data.data(reply.retcode as usize)).into_owned();
    println!("{text}");

    remote.close()?;
    Ok(())
}
