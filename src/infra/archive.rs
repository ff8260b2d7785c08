// ============================================================
// Layer 6 — Dataset Archive Download
// ============================================================
// Streams a .tar.gz over HTTP straight into the tar unpacker:
//
//   ureq response body → GzDecoder → tar::Archive::unpack(dest)
//
// Nothing is buffered on disk except the extracted files.

use std::{io::Read, path::Path};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

/// Download `url` and unpack the gzipped tarball into `dest`.
pub fn download_and_unpack(url: &str, dest: &Path) -> Result<()> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("Cannot download '{url}'"))?;

    unpack_tar_gz(response.into_reader(), dest)
        .with_context(|| format!("Cannot unpack '{url}' into '{}'", dest.display()))?;

    tracing::info!("Extracted {} into {}", url, dest.display());
    Ok(())
}

/// Unpack a gzipped tar stream into `dest`.
pub fn unpack_tar_gz(reader: impl Read, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.unpack(dest)?;
    Ok(())
}
