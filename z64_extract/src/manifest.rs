use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use z64_formats::{ExtractedScene, RoomSummary, ScenePatches};

use crate::cli::SceneRequest;

/// Record of one extraction run, written with `--manifest`.
#[derive(Debug, Serialize)]
pub struct ExtractionManifest {
    pub rom: PathBuf,
    pub dest: PathBuf,
    pub scenes: Vec<SceneRecord>,
}

#[derive(Debug, Serialize)]
pub struct SceneRecord {
    pub offset: usize,
    pub name: String,
    #[serde(flatten)]
    pub outcome: SceneOutcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SceneOutcome {
    Extracted {
        directory: PathBuf,
        original_size: usize,
        scene_size: usize,
        patches: ScenePatches,
        rooms: Vec<RoomRecord>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Serialize)]
pub struct RoomRecord {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RoomSummary>,
}

impl ExtractionManifest {
    pub fn new(rom: &Path, dest: &Path) -> Self {
        Self {
            rom: rom.to_path_buf(),
            dest: dest.to_path_buf(),
            scenes: Vec::new(),
        }
    }

    pub fn record_extracted(&mut self, request: &SceneRequest, directory: &Path, scene: &ExtractedScene) {
        let rooms = scene
            .rooms
            .iter()
            .map(|room| RoomRecord {
                index: room.index,
                start: room.range.start,
                end: room.range.end,
                file: room_file_name(room.index),
                summary: room.summary,
            })
            .collect();
        self.scenes.push(SceneRecord {
            offset: request.offset,
            name: request.name.clone(),
            outcome: SceneOutcome::Extracted {
                directory: directory.to_path_buf(),
                original_size: scene.original_size,
                scene_size: scene.data.len(),
                patches: scene.patches,
                rooms,
            },
        });
    }

    pub fn record_failed(&mut self, request: &SceneRequest, error: String) {
        self.scenes.push(SceneRecord {
            offset: request.offset,
            name: request.name.clone(),
            outcome: SceneOutcome::Failed { error },
        });
    }

    pub fn extracted(&self) -> usize {
        self.scenes
            .iter()
            .filter(|scene| matches!(scene.outcome, SceneOutcome::Extracted { .. }))
            .count()
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let json =
            serde_json::to_string_pretty(self).context("serializing extraction manifest to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("writing extraction manifest to {}", path.display()))?;
        Ok(())
    }
}

pub fn scene_directory_name(request: &SceneRequest) -> String {
    format!("{:08X} - {}", request.offset, request.name)
}

pub fn room_file_name(index: usize) -> String {
    format!("room_{index}.zmap")
}
