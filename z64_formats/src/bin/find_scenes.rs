//! List every scene header that can be found in a ROM dump, together with
//! the rooms each one claims.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use z64_formats::find_scene_headers;

#[derive(Parser, Debug)]
#[command(about = "Locate scene headers in a ROM dump", version)]
struct Args {
    /// ROM dump to scan
    rom: PathBuf,

    /// Print the full scan report (including rejected candidates) as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut rom =
        fs::read(&args.rom).with_context(|| format!("reading ROM {}", args.rom.display()))?;
    let report = find_scene_headers(&mut rom);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        out.write_all(report.render_text().as_bytes())?;
    }
    out.flush()?;

    Ok(())
}
