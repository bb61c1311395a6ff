//! FAT12 image CLI - edit 1.44MB floppy images from the command line.
//!
//! Usage:
//!   fat12img <image> <command> [args]
//!
//! Examples:
//!   fat12img boot.img format                 # Blank, formatted volume
//!   fat12img boot.img write boot.bin 0       # Install a boot sector
//!   fat12img boot.img save kernel.bin        # Add KERNEL.BIN
//!   fat12img boot.img dir                    # List files
//!   fat12img boot.img load kernel.bin        # Extract KERNEL.BIN
//!   fat12img boot.img del kernel.bin         # Remove KERNEL.BIN

mod logger;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use fat12_core::{
    format_image, write_sectors, Fat12Error, Fat12Result, ImageLayout, ShortName, Volume,
};

/// FAT12 floppy image tool
#[derive(Parser, Debug)]
#[command(name = "fat12img")]
#[command(about = "Format, list and edit FAT12 floppy images")]
struct Args {
    /// Disk image file
    image: PathBuf,

    /// JSON geometry file (defaults to a 1.44MB floppy)
    #[arg(long, global = true)]
    layout: Option<PathBuf>,

    /// More output on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or overwrite the image with an empty volume
    Format,
    /// List files in the root directory
    Dir {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy a host file into the image under its 8.3 name
    Save { file: PathBuf },
    /// Copy a file out of the image to the host
    Load {
        file: PathBuf,
        /// Where to write the contents (defaults to FILE)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file from the image
    Del { file: PathBuf },
    /// Copy raw bytes into the image at a sector, bypassing the filesystem
    Write { file: PathBuf, sector: u64 },
}

/// One line of `dir --json`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingEntry {
    name: String,
    size: u32,
    start_cluster: u16,
    created: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Listing {
    files: Vec<ListingEntry>,
    free_bytes: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logger::init(logger::level_for(args.verbose)) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", args.image.display(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Fat12Result<()> {
    let layout = match &args.layout {
        Some(path) => ImageLayout::from_json_file(path)?,
        None => ImageLayout::floppy_1440(),
    };

    match &args.command {
        Command::Format => {
            let mut file = File::create(&args.image)?;
            format_image(&mut file, &layout)?;
        }
        Command::Dir { json } => {
            let file = File::open(&args.image)?;
            let vol = Volume::open_with_layout(file, layout)?;
            print_listing(&vol, *json)?;
        }
        Command::Save { file } => {
            let name = ShortName::from_host_path(file)?;
            let data = read_host_file(file)?;
            let mut vol = Volume::open_with_layout(open_rw(&args.image)?, layout)?;
            vol.save(&name, &data)?;
        }
        Command::Load { file, output } => {
            let name = ShortName::from_host_path(file)?;
            let mut vol = Volume::open_with_layout(File::open(&args.image)?, layout)?;
            let data = vol.load(&name)?;
            std::fs::write(output.as_ref().unwrap_or(file), data)?;
        }
        Command::Del { file } => {
            let name = ShortName::from_host_path(file)?;
            let mut vol = Volume::open_with_layout(open_rw(&args.image)?, layout)?;
            vol.delete(&name)?;
        }
        Command::Write { file, sector } => {
            let data = read_host_file(file)?;
            let mut image = open_rw(&args.image)?;
            write_sectors(&mut image, &layout, *sector, &data)?;
        }
    }
    Ok(())
}

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// Read a host file, reporting a missing file as `NotFound`.
fn read_host_file(path: &Path) -> Fat12Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Fat12Error::NotFound(path.display().to_string()),
        _ => Fat12Error::Io(e),
    })
}

fn print_listing(vol: &Volume<File>, json: bool) -> Fat12Result<()> {
    if json {
        let listing = Listing {
            files: vol
                .entries()
                .map(|entry| {
                    let (y, mo, d) = entry.timestamp.date_parts();
                    let (h, mi, s) = entry.timestamp.time_parts();
                    ListingEntry {
                        name: entry.name.to_string(),
                        size: entry.size,
                        start_cluster: entry.start_cluster,
                        created: format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}"),
                    }
                })
                .collect(),
            free_bytes: vol.free_bytes(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let mut count = 0;
    for entry in vol.entries() {
        let (y, mo, d) = entry.timestamp.date_parts();
        let (h, mi, s) = entry.timestamp.time_parts();
        println!(
            "{:<12} {:>8} bytes {}/{}/{} {}:{:02}:{:02}",
            entry.name.to_string(),
            entry.size,
            y,
            mo,
            d,
            h,
            mi,
            s
        );
        count += 1;
    }
    println!("{} file(s), {} bytes free", count, vol.free_bytes());
    Ok(())
}
