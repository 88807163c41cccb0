use anyhow::Context;
use bbox_export::logger::StderrLogger;
use bbox_export::{AccessMode, export, load_image, sys_sync, wait_partition};
use clap::Parser;
use log::LevelFilter;
use std::fs;
use std::path::PathBuf;

/// Write the crash record held in a region image out as text.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Raw image of the reserved region.
    image: PathBuf,
    /// Directory receiving the text files; created if missing.
    #[arg(short, long, default_value = "bbox")]
    out: PathBuf,
    /// Wait for this path (e.g. the data partition's mount point) first.
    #[arg(long)]
    wait_for: Option<PathBuf>,
    /// Probes of `--wait-for`, 100 ms apart.
    #[arg(long, default_value_t = 50)]
    retries: u32,
    #[arg(long, value_enum, default_value_t = AccessMode::ReadWrite)]
    mode: AccessMode,
    /// More output; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    StderrLogger::new(level).init()?;

    if let Some(partition) = &args.wait_for {
        wait_partition(partition, args.retries, args.mode)?;
    }
    fs::create_dir_all(&args.out).with_context(|| format!("creating {}", args.out.display()))?;

    let region = load_image(&args.image)?;
    let files = export(&region, &args.out)?;
    sys_sync(&files)?;
    eprintln!("exported {} files into {}", files.len(), args.out.display());
    Ok(())
}
