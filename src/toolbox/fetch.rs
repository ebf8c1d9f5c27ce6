//! Source tarball download with mirror fallback and checksum verification.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::context::BuildContext;
use crate::error::BuildError;
use crate::tools::FetchArchive;

/// Make sure `dest` holds the tarball, downloading it from the first mirror that works.
///
/// Downloads land in `<dest>.part` and are renamed only on success. An
/// existing `dest` is reused without contacting any mirror.
pub fn fetch_tarball(
    ctx: &BuildContext,
    urls: &[String],
    dest: &Path,
    sha256: Option<&str>,
) -> Result<()> {
    if dest.is_file() {
        tracing::info!("Using cached {}", dest.display());
    } else {
        download_from_mirrors(ctx, urls, dest)?;
    }

    if let Some(expected) = sha256 {
        verify_checksum(dest, expected)?;
    }
    Ok(())
}

fn download_from_mirrors(ctx: &BuildContext, urls: &[String], dest: &Path) -> Result<()> {
    let file = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let part = part_path(dest);
    let mirrors: Vec<&str> = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .collect();

    for (attempt, url) in mirrors.iter().enumerate() {
        tracing::info!(
            "Downloading {} (mirror {}/{}): {}",
            file,
            attempt + 1,
            mirrors.len(),
            url
        );
        remove_if_present(&part)?;

        let cmd = FetchArchive {
            url: url.to_string(),
            dest: part.clone(),
        }
        .command(ctx.tools)?;

        match ctx.run(cmd) {
            Ok(()) if part.is_file() => {
                fs::rename(&part, dest).with_context(|| {
                    format!("Failed to move {} into place", part.display())
                })?;
                tracing::info!("Downloaded {}", dest.display());
                return Ok(());
            }
            Ok(()) => {
                tracing::warn!("Mirror {} reported success but wrote nothing", url);
            }
            Err(err) if is_command_failure(&err) => {
                tracing::warn!("Mirror {} failed: {}", url, err);
            }
            Err(err) => {
                remove_if_present(&part)?;
                return Err(err);
            }
        }
        remove_if_present(&part)?;
    }

    Err(BuildError::MirrorsExhausted {
        file,
        attempts: mirrors.len(),
    }
    .into())
}

fn is_command_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<BuildError>()
        .is_some_and(BuildError::is_command_failure)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn remove_if_present(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare a file against an expected digest; a mismatching file is deleted.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    tracing::info!("Verifying SHA256 checksum...");
    let actual = sha256_file(path)?;

    if !actual.eq_ignore_ascii_case(expected.trim()) {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove corrupt {}", path.display()))?;
        return Err(BuildError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.trim().to_lowercase(),
            actual,
        }
        .into());
    }

    tracing::info!("Checksum verified OK");
    Ok(())
}
