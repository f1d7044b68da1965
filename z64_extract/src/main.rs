use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use z64_formats::{ExtractedScene, GfxToolchain, extract_scene};

mod catalog;
mod cli;
mod manifest;

use cli::{ExtractConfig, SceneRequest};
use manifest::{ExtractionManifest, room_file_name, scene_directory_name};

fn main() -> Result<()> {
    env_logger::init();
    let config = cli::parse()?;
    run(&config)
}

fn run(config: &ExtractConfig) -> Result<()> {
    let mut rom =
        fs::read(&config.rom).with_context(|| format!("reading ROM {}", config.rom.display()))?;
    let toolchain = GfxToolchain::new(&config.gfxdis, &config.gfxasm);

    fs::create_dir_all(&config.dest)
        .with_context(|| format!("creating destination {}", config.dest.display()))?;

    let mut manifest = ExtractionManifest::new(&config.rom, &config.dest);
    for request in &config.scenes {
        let options = config.options_for(request);
        match extract_scene(&mut rom, request.offset, &options, &toolchain) {
            Ok(scene) => {
                let directory = write_scene(&config.dest, request, &scene)?;
                println!(
                    "{:08X} {:<28} {:>2} room(s) -> {}",
                    request.offset,
                    request.name,
                    scene.rooms.len(),
                    directory.display()
                );
                manifest.record_extracted(request, &directory, &scene);
            }
            Err(err) => {
                warn!("skipping scene {:08X} ({}): {err}", request.offset, request.name);
                manifest.record_failed(request, err.to_string());
            }
        }
    }

    println!(
        "Extracted {} of {} scenes into {}",
        manifest.extracted(),
        config.scenes.len(),
        config.dest.display()
    );

    if let Some(path) = config.manifest.as_ref() {
        manifest.persist(path)?;
        println!("Saved extraction manifest to {}", path.display());
    }

    if let Some(path) = config.zeroed_rom.as_ref() {
        fs::write(path, &rom)
            .with_context(|| format!("writing zeroed ROM to {}", path.display()))?;
        println!("Saved zeroed ROM to {}", path.display());
    }

    Ok(())
}

fn write_scene(dest: &Path, request: &SceneRequest, scene: &ExtractedScene) -> Result<PathBuf> {
    let directory = dest.join(scene_directory_name(request));
    fs::create_dir_all(&directory)
        .with_context(|| format!("creating {}", directory.display()))?;

    let scene_path = directory.join("scene.zscene");
    fs::write(&scene_path, &scene.data)
        .with_context(|| format!("writing {}", scene_path.display()))?;

    for room in &scene.rooms {
        let room_path = directory.join(room_file_name(room.index));
        fs::write(&room_path, &room.data)
            .with_context(|| format!("writing {}", room_path.display()))?;
    }

    Ok(directory)
}
