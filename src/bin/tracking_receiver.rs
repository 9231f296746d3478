//! Reference tracking receiver
//!
//! Waits for one sender, reassembles every message on the connection, and
//! prints each header.
//!
//! # Usage
//!
//! ```bash
//! # Receive 256 x 256 images on the default address
//! tracking_receiver --side 256
//!
//! # Also preview the first image in the terminal
//! RUST_LOG=debug tracking_receiver -s 64 -p --bind 0.0.0.0:31000
//! ```

use clap::Parser;
use mlc_tracking_rust::config::{ReceiverConfig, DEFAULT_CONSUMER_ADDR, DEFAULT_READ_CHUNK_SIZE};
use mlc_tracking_rust::error::Result;
use mlc_tracking_rust::io::TrackingReceiver;
use mlc_tracking_rust::protocol::{message_size, TrackingHeader, TrackingMessage};
use ndarray::Array2;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Grey levels from dark to bright
const RAMP: &[u8] = b" .:-=+*#%@";

/// Display window upper bound
const DISPLAY_MAX: f64 = 4096.0;

/// Columns of the terminal preview
const PREVIEW_COLUMNS: usize = 64;

#[derive(Parser)]
#[command(
    name = "tracking_receiver",
    version = env!("CARGO_PKG_VERSION"),
    about = "Receive and decode MLC tracking messages"
)]
struct Cli {
    /// Side length of the incoming images (e.g., 64 or 256)
    #[arg(short, long)]
    side: usize,

    /// Preview the first incoming image
    #[arg(short = 'p', long, alias = "plot")]
    display: bool,

    /// Address to listen on
    #[arg(long, default_value = DEFAULT_CONSUMER_ADDR)]
    bind: String,

    /// Maximum bytes requested per read
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE)]
    chunk_size: usize,
}

impl Cli {
    fn into_config(self) -> ReceiverConfig {
        ReceiverConfig {
            bind_addr: self.bind,
            side: self.side,
            display: self.display,
            read_chunk_size: self.chunk_size,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    if let Err(e) = run(&config) {
        eprintln!("[ERROR] Receiver failed: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &ReceiverConfig) -> Result<()> {
    let receiver = TrackingReceiver::from_config(config)?;
    println!(
        "Expecting messages of {} bytes ({} x {} samples).",
        message_size(config.side)?,
        config.side,
        config.side
    );

    let mut conn = receiver.accept()?;
    if let Ok(peer) = conn.peer_addr() {
        println!("Connected by {}.", peer);
    }

    let mut counter = 0usize;
    while let Some(msg) = conn.receive()? {
        counter += 1;
        println!("Received image {}", counter);
        print_header(&msg.header);

        if config.display && counter == 1 {
            preview(&msg, config.side)?;
        }
    }

    info!(images = counter, "Receiver finished");
    Ok(())
}

fn print_header(h: &TrackingHeader) {
    println!("headersize: {}", h.header_byte_count);
    println!("imagesize: {}", h.payload_byte_count);
    println!(
        "header: ({}, {}, {}, {}, {}, {}, {}, {}, {})",
        h.slice_position_sagittal,
        h.slice_position_coronal,
        h.slice_position_transverse,
        h.voxel_size_z,
        h.inter_slice_spacing,
        h.voxel_size_x,
        h.voxel_size_y,
        h.width,
        h.height
    );
}

fn preview(msg: &TrackingMessage, side: usize) -> Result<()> {
    let image = msg.image(side)?;
    print_stats(&image);

    if side == 0 {
        return Ok(());
    }
    let step = side.div_ceil(PREVIEW_COLUMNS).max(1);
    for row in image.outer_iter().step_by(step * 2) {
        let line: String = row
            .iter()
            .step_by(step)
            .map(|&v| {
                let level = (v as f64 / DISPLAY_MAX).clamp(0.0, 1.0);
                let idx = (level * (RAMP.len() - 1) as f64).round() as usize;
                RAMP[idx] as char
            })
            .collect();
        println!("{}", line);
    }
    Ok(())
}

fn print_stats(image: &Array2<u16>) {
    let count = image.len();
    if count == 0 {
        println!("empty image");
        return;
    }
    let min = image.iter().copied().min().unwrap_or(0);
    let max = image.iter().copied().max().unwrap_or(0);
    let mean = image.iter().map(|&v| v as f64).sum::<f64>() / count as f64;
    println!("min: {}  max: {}  mean: {:.1}", min, max, mean);
}
