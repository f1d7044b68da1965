use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use z64_formats::ExtractOptions;

use crate::catalog::{KNOWN_SCENES, KnownScene};

#[derive(Parser, Debug)]
#[command(
    about = "Extract and patch the scenes and rooms of a ROM overdump",
    version
)]
pub struct Args {
    /// ROM dump to extract from
    pub rom: PathBuf,

    /// Directory that receives one folder per scene
    #[arg(long, value_name = "DIR", default_value = "scene")]
    pub dest: PathBuf,

    /// Extract this scene instead of the built-in catalog (OFFSET[:NAME[:STRIDE]],
    /// offset in hex, may repeat)
    #[arg(long = "scene", value_name = "SCENE", value_parser = parse_scene)]
    pub scenes: Vec<SceneRequest>,

    /// Write rooms without re-encoding their display lists
    #[arg(long)]
    pub no_convert: bool,

    /// Leave scene headers, doors, spawns and collision untouched
    #[arg(long)]
    pub no_patch_scenes: bool,

    /// Keep the actor and object lists of rooms
    #[arg(long)]
    pub no_patch_rooms: bool,

    /// F3DEX disassembler used for room conversion
    #[arg(long, value_name = "PATH", default_value = "bin/gfxdis.f3dex")]
    pub gfxdis: PathBuf,

    /// F3DEX2 assembler used for room conversion
    #[arg(long, value_name = "PATH", default_value = "bin/gfxasm.f3dex2")]
    pub gfxasm: PathBuf,

    /// Path to write a JSON manifest of every scene attempted
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Path to write the ROM with all extracted structures zeroed
    #[arg(long, value_name = "PATH")]
    pub zeroed_rom: Option<PathBuf>,
}

/// One scene to extract, either from the catalog or the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneRequest {
    pub offset: usize,
    pub name: String,
    pub door_stride: usize,
}

impl From<&KnownScene> for SceneRequest {
    fn from(scene: &KnownScene) -> Self {
        Self {
            offset: scene.offset,
            name: scene.name.to_string(),
            door_stride: scene.door_stride,
        }
    }
}

#[derive(Debug)]
pub struct ExtractConfig {
    pub rom: PathBuf,
    pub dest: PathBuf,
    pub scenes: Vec<SceneRequest>,
    pub patch_scene: bool,
    pub patch_rooms: bool,
    pub convert_rooms: bool,
    pub gfxdis: PathBuf,
    pub gfxasm: PathBuf,
    pub manifest: Option<PathBuf>,
    pub zeroed_rom: Option<PathBuf>,
}

impl ExtractConfig {
    pub fn options_for(&self, scene: &SceneRequest) -> ExtractOptions {
        ExtractOptions {
            door_stride: scene.door_stride,
            patch_scene: self.patch_scene,
            patch_rooms: self.patch_rooms,
            convert_rooms: self.convert_rooms,
        }
    }
}

pub fn parse() -> Result<ExtractConfig> {
    let args = Args::parse();
    args.into_config()
}

impl Args {
    fn into_config(self) -> Result<ExtractConfig> {
        if self.manifest.is_some() && self.manifest == self.zeroed_rom {
            bail!("--manifest and --zeroed-rom must name different files");
        }

        let scenes = if self.scenes.is_empty() {
            KNOWN_SCENES.iter().map(SceneRequest::from).collect()
        } else {
            self.scenes
        };

        Ok(ExtractConfig {
            rom: self.rom,
            dest: self.dest,
            scenes,
            patch_scene: !self.no_patch_scenes,
            patch_rooms: !self.no_patch_rooms,
            convert_rooms: !self.no_convert,
            gfxdis: self.gfxdis,
            gfxasm: self.gfxasm,
            manifest: self.manifest,
            zeroed_rom: self.zeroed_rom,
        })
    }
}

fn parse_scene(text: &str) -> Result<SceneRequest, String> {
    let mut parts = text.splitn(3, ':');
    let offset = parts.next().unwrap_or_default().trim();
    let digits = offset
        .strip_prefix("0x")
        .or_else(|| offset.strip_prefix("0X"))
        .unwrap_or(offset);
    let offset = usize::from_str_radix(digits, 16)
        .map_err(|err| format!("invalid scene offset '{offset}': {err}"))?;

    let name = match parts.next().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("scene_{offset:08X}"),
    };

    let door_stride = match parts.next().map(str::trim) {
        None | Some("") => 0,
        Some(stride) => match stride.strip_prefix("0x") {
            Some(hex) => usize::from_str_radix(hex, 16),
            None => stride.parse(),
        }
        .map_err(|err| format!("invalid door stride '{stride}': {err}"))?,
    };

    Ok(SceneRequest {
        offset,
        name,
        door_stride,
    })
}
