use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{ParleyError, Result};
use crate::transcript::Transcript;

/// Where a finished transcript goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    Console,
    File(PathBuf),
}

impl Sink {
    /// Console when no path is given, otherwise a file carrying `extension`.
    #[must_use]
    pub fn from_output(path: Option<&Path>, extension: &str) -> Self {
        path.map_or(Self::Console, |p| {
            Self::File(with_extension(p, extension))
        })
    }

    pub fn write(&self, transcript: &Transcript) -> Result<()> {
        let body = transcript.render();
        match self {
            Self::Console => {
                let mut stdout = io::stdout().lock();
                stdout
                    .write_all(body.as_bytes())
                    .and_then(|()| stdout.flush())
                    .map_err(|e| ParleyError::Output(format!("failed to write transcript: {e}")))?;
            }
            Self::File(path) => {
                fs::write(path, body.as_bytes()).map_err(|e| {
                    ParleyError::Output(format!("failed to write {}: {e}", path.display()))
                })?;
                tracing::info!("transcript saved to {}", path.display());
            }
        }
        Ok(())
    }
}

/// Append `.{extension}` unless the path already ends with it.
#[must_use]
pub fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let has_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension));

    if has_extension {
        return path.to_path_buf();
    }

    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
