// src/process/extract.rs

use anyhow::{anyhow, bail, Context, Result};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};
use zip::ZipArchive;

/// Extract every member of `zip_path` into `target_dir`, returning the paths of
/// the files written (directories are created but not listed).
#[instrument(level = "debug", skip_all, fields(zip = %zip_path.as_ref().display()))]
pub fn extract_archive<P: AsRef<Path>, Q: AsRef<Path>>(
    zip_path: P,
    target_dir: Q,
) -> Result<Vec<PathBuf>> {
    let zip_path = zip_path.as_ref();
    let target_dir = target_dir.as_ref();

    let file = File::open(zip_path)
        .with_context(|| format!("failed to open ZIP file: {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read ZIP archive: {}", zip_path.display()))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).with_context(|| {
            format!("failed to access ZIP entry #{} in {}", i, zip_path.display())
        })?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| anyhow!("refusing to extract unsafe path {:?}", entry.name()))?;
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        let written = io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting {}", out_path.display()))?;
        debug!(path = %out_path.display(), bytes = written, "extracted");
        extracted.push(out_path);
    }

    Ok(extracted)
}

/// Pick the events file among the extracted members: the archive's own name
/// without its `.zip` suffix, or the only file when the archive held just one.
pub fn locate_events_file(zip_path: &Path, extracted: &[PathBuf]) -> Result<PathBuf> {
    let expected = zip_path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(strip_zip_suffix)
        .map(|stem| zip_path.with_file_name(stem));

    if let Some(expected) = expected {
        if extracted.iter().any(|p| p == &expected) {
            return Ok(expected);
        }
    }

    match extracted {
        [only] => Ok(only.clone()),
        [] => bail!("archive {} contained no files", zip_path.display()),
        _ => bail!(
            "archive {} holds {} files and none matches its name",
            zip_path.display(),
            extracted.len()
        ),
    }
}

fn strip_zip_suffix(name: &str) -> Option<&str> {
    let cut = name.len().checked_sub(4)?;
    if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".zip") && cut > 0 {
        Some(&name[..cut])
    } else {
        None
    }
}
