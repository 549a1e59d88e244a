use std::fs;
use std::io;
use std::path::Path;

use crate::error::{ParleyError, Result};

/// Ensure a model file exists at `path`, downloading it from `url` if missing.
///
/// Downloads to a `{path}.part` temp file first, then renames into place so
/// interrupted downloads don't leave a corrupt file behind.
pub fn ensure_model(path: &Path, url: &str, description: &str) -> Result<()> {
    if path.exists() {
        tracing::debug!("{description} present at {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let part_path = path.with_extension(
        path.extension()
            .map_or_else(|| "part".to_string(), |e| format!("{}.part", e.to_string_lossy())),
    );

    tracing::info!("downloading {description}...");

    let response = ureq::get(url)
        .call()
        .map_err(|e| ParleyError::Network(format!("failed to download {description}: {e}")))?;

    let mut reader = response.into_body().into_reader();
    let mut file = fs::File::create(&part_path)?;
    if let Err(e) = io::copy(&mut reader, &mut file) {
        let _ = fs::remove_file(&part_path);
        return Err(ParleyError::Network(format!(
            "download of {description} interrupted: {e}"
        )));
    }

    fs::rename(&part_path, path)?;

    tracing::info!("downloaded {description} to {}", path.display());
    Ok(())
}

/// Ensure an unpacked model directory exists at `dir`, fetching the zip
/// archive at `url` and extracting it if missing.
///
/// The archive must hold a single top-level directory named like `dir`. It
/// is unpacked into a staging directory next to `dir` and renamed into place.
#[cfg(feature = "vosk")]
pub fn ensure_model_dir(dir: &Path, url: &str, description: &str) -> Result<()> {
    if dir.is_dir() {
        tracing::debug!("{description} present at {}", dir.display());
        return Ok(());
    }

    let name = dir.file_name().ok_or_else(|| {
        ParleyError::Config(format!("invalid model directory {}", dir.display()))
    })?;
    let mut archive_name = name.to_os_string();
    archive_name.push(".zip");
    let archive = dir.with_file_name(archive_name);

    ensure_model(&archive, url, description)?;

    tracing::info!("extracting {description}...");
    let unpacked = unpack_archive(&archive, dir);
    let _ = fs::remove_file(&archive);
    unpacked?;

    tracing::info!("{description} ready at {}", dir.display());
    Ok(())
}

#[cfg(feature = "vosk")]
fn unpack_archive(archive: &Path, dir: &Path) -> Result<()> {
    let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) else {
        return Err(ParleyError::Config(format!(
            "invalid model directory {}",
            dir.display()
        )));
    };

    let invalid = |e: zip::result::ZipError| {
        ParleyError::Config(format!("invalid model archive {}: {e}", archive.display()))
    };

    let staging = tempfile::tempdir_in(parent)?;
    let mut zip = zip::ZipArchive::new(fs::File::open(archive)?).map_err(invalid)?;
    zip.extract(staging.path()).map_err(invalid)?;

    let extracted = staging.path().join(name);
    if !extracted.is_dir() {
        return Err(ParleyError::Config(format!(
            "model archive {} does not contain {}",
            archive.display(),
            name.to_string_lossy()
        )));
    }

    fs::rename(&extracted, dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_model_is_left_alone() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("ggml-tiny.en.bin");
        fs::write(&path, b"weights").unwrap_or_else(|e| panic!("{e}"));

        ensure_model(&path, "http://127.0.0.1:9/unreachable", "test model")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(fs::read(&path).unwrap_or_else(|e| panic!("{e}")), b"weights");
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("models/ggml-tiny.en.bin");

        let result = ensure_model(&path, "http://127.0.0.1:9/unreachable", "test model");
        assert!(matches!(result, Err(ParleyError::Network(_))));
        assert!(!path.exists());
    }
}
