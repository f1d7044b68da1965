use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use walkdir::WalkDir;
use z64_formats::{GfxToolchain, RoomOptions, convert_room};

#[derive(Parser, Debug)]
#[command(about = "Convert room files from F3DEX to F3DEX2 display lists", version)]
struct Args {
    /// Room file to convert
    #[arg(value_name = "IN", required_unless_present = "dir", conflicts_with = "dir")]
    input: Option<PathBuf>,

    /// Where to write the converted room (defaults to overwriting IN)
    #[arg(value_name = "OUT", requires = "input")]
    output: Option<PathBuf>,

    /// Convert every .zmap file below this directory in place
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Also empty the actor and object lists
    #[arg(long)]
    clear_actors: bool,

    /// F3DEX disassembler
    #[arg(long, value_name = "PATH", default_value = "bin/gfxdis.f3dex")]
    gfxdis: PathBuf,

    /// F3DEX2 assembler
    #[arg(long, value_name = "PATH", default_value = "bin/gfxasm.f3dex2")]
    gfxasm: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let toolchain = GfxToolchain::new(&args.gfxdis, &args.gfxasm);
    let options = RoomOptions {
        clear_actor_lists: args.clear_actors,
    };

    if let Some(dir) = args.dir.as_ref() {
        let rooms = collect_rooms(dir);
        if rooms.is_empty() {
            bail!("no .zmap files below {}", dir.display());
        }
        let mut failed = 0usize;
        for room in &rooms {
            if let Err(err) = convert_file(room, room, &toolchain, options) {
                warn!("{err:#}");
                failed += 1;
            }
        }
        println!("Converted {} of {} rooms", rooms.len() - failed, rooms.len());
        if failed > 0 {
            bail!("{failed} room(s) could not be converted");
        }
        return Ok(());
    }

    let Some(input) = args.input.as_ref() else {
        bail!("either a room file or --dir is required");
    };
    let output = args.output.as_ref().unwrap_or(input);
    convert_file(input, output, &toolchain, options)?;
    println!("'{}' written successfully", output.display());
    Ok(())
}

fn collect_rooms(dir: &Path) -> Vec<PathBuf> {
    let mut rooms: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|res| res.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("zmap"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    rooms.sort();
    rooms
}

fn convert_file(
    input: &Path,
    output: &Path,
    toolchain: &GfxToolchain,
    options: RoomOptions,
) -> Result<()> {
    let mut room = fs::read(input).with_context(|| format!("reading room {}", input.display()))?;
    let summary = convert_room(&mut room, toolchain, options)
        .with_context(|| format!("converting room {}", input.display()))?;
    info!(
        "{}: {:?} mesh, {} display lists",
        input.display(),
        summary.mesh,
        summary.display_lists
    );
    fs::write(output, &room).with_context(|| format!("writing room {}", output.display()))?;
    Ok(())
}
