//! Re-encoding display lists between microcode dialects.
//!
//! The actual translation is delegated to an external disassembler and
//! assembler pair; the patcher only sees a bytes-in/bytes-out function.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use log::debug;
use serde::Serialize;
use thiserror::Error;

/// Display list encodings understood by the patcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dialect {
    F3dex,
    F3dex2,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::F3dex => f.write_str("F3DEX"),
            Dialect::F3dex2 => f.write_str("F3DEX2"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no translation available from {0}")]
    Unsupported(Dialect),
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("staging display list: {0}")]
    Io(#[from] io::Error),
    #[error("transform produced no output")]
    Empty,
}

/// Translates a triangle section written for `from` into the other dialect.
///
/// Implementations must return a buffer of the same length as `section`;
/// callers reject anything else.
pub trait MicrocodeTransform {
    fn reencode(&self, from: Dialect, section: &[u8]) -> Result<Vec<u8>, TransformError>;
}

impl<T: MicrocodeTransform + ?Sized> MicrocodeTransform for &T {
    fn reencode(&self, from: Dialect, section: &[u8]) -> Result<Vec<u8>, TransformError> {
        (**self).reencode(from, section)
    }
}

/// `gfxdis.f3dex` | `gfxasm.f3dex2` round trip through a text listing.
#[derive(Debug, Clone)]
pub struct GfxToolchain {
    pub disassembler: PathBuf,
    pub assembler: PathBuf,
}

impl Default for GfxToolchain {
    fn default() -> Self {
        Self {
            disassembler: PathBuf::from("bin/gfxdis.f3dex"),
            assembler: PathBuf::from("bin/gfxasm.f3dex2"),
        }
    }
}

impl GfxToolchain {
    pub fn new(disassembler: impl Into<PathBuf>, assembler: impl Into<PathBuf>) -> Self {
        Self {
            disassembler: disassembler.into(),
            assembler: assembler.into(),
        }
    }

    fn disassemble(&self, section: &[u8]) -> Result<Vec<u8>, TransformError> {
        let staging = tempfile::tempdir()?;
        let input = staging.path().join("dlist.bin");
        fs::write(&input, section)?;

        let tool = self.disassembler.display().to_string();
        let output = Command::new(&self.disassembler)
            .arg("-f")
            .arg(&input)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| TransformError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TransformError::ToolFailed {
                tool,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }

    fn assemble(&self, listing: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        let tool = self.assembler.display().to_string();
        let mut child = Command::new(&self.assembler)
            .arg("-b")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransformError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "assembler stdin unavailable"))?;
        // stdout has to be drained while the listing is still being written.
        let feeder = thread::spawn(move || stdin.write_all(&listing));

        let output = child.wait_with_output()?;
        feeder
            .join()
            .map_err(|_| io::Error::other("assembler feeder thread panicked"))??;

        if !output.status.success() {
            return Err(TransformError::ToolFailed {
                tool,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        if !output.stderr.is_empty() {
            debug!("{tool}: {}", String::from_utf8_lossy(&output.stderr).trim_end());
        }
        Ok(output.stdout)
    }
}

impl MicrocodeTransform for GfxToolchain {
    fn reencode(&self, from: Dialect, section: &[u8]) -> Result<Vec<u8>, TransformError> {
        if from != Dialect::F3dex {
            return Err(TransformError::Unsupported(from));
        }
        let listing = self.disassemble(section)?;
        let binary = self.assemble(listing)?;
        if binary.is_empty() {
            return Err(TransformError::Empty);
        }
        Ok(binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_surface_as_spawn_errors() {
        let toolchain = GfxToolchain::new("/nonexistent/gfxdis.f3dex", "/nonexistent/gfxasm.f3dex2");
        let err = toolchain
            .reencode(Dialect::F3dex, &[0xb8, 0, 0, 0, 0, 0, 0, 0])
            .unwrap_err();
        assert!(matches!(err, TransformError::Spawn { .. }), "{err}");
    }

    #[test]
    fn only_translates_from_f3dex() {
        let toolchain = GfxToolchain::default();
        let err = toolchain.reencode(Dialect::F3dex2, &[0xdf, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, TransformError::Unsupported(Dialect::F3dex2)));
    }
}
