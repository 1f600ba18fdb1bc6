use std::{fs::File, path::PathBuf};

use clap::Parser;
use memmap2::MmapOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use isobmff::{IsoBmffBuffer, ParseOptions};

/// Print the box tree of an ISOBMFF file.
#[derive(Parser)]
#[command(version)]
struct Args {
    path: PathBuf,

    /// Rewrite the size of a box that runs past the end of the file
    #[arg(long)]
    correct_box_size: bool,

    /// Replace the track id of every tkhd
    #[arg(long)]
    override_track_id: Option<u32>,
}

fn main() -> isobmff::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let options = ParseOptions {
        correct_box_size: args.correct_box_size,
        override_track_id: args.override_track_id,
    };

    // Copy-on-write, corrections never reach the file
    let file = File::open(&args.path)?;
    let mut mmap = unsafe { MmapOptions::new().map_copy(&file)? };

    let mut buffer = IsoBmffBuffer::new(&mut mmap[..]);
    if !buffer.parse_buffer_with(&options) {
        info!(path = %args.path.display(), "No boxes found");
        return Ok(());
    }
    buffer.print_boxes();

    if let Some(chunked) = buffer.get_chunked_box() {
        info!(box_type = %chunked.box_type(), offset = chunked.offset(), size = chunked.size(), "Last box is incomplete");
    }
    info!(
        init_segment = buffer.is_init_segment(),
        mdat_size = ?buffer.get_mdat_box_size(),
        first_pts = ?buffer.get_first_pts(),
        timescale = ?buffer.get_time_scale(),
        "Parsed {} bytes",
        buffer.get_parsed_boxes_size()
    );
    Ok(())
}
