use std::fs::File;
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use super::ExtractedEntry;
use crate::core::error::{InstallError, InstallResult};

/// Unpack every entry of `archive_path` under `destination`, reporting each file.
pub fn extract_zip_file(
    archive_path: &Path,
    destination: &Path,
    on_entry: &mut dyn FnMut(ExtractedEntry),
) -> InstallResult<usize> {
    let zip_file = File::open(archive_path).map_err(|e| {
        InstallError::Archive(format!("cannot open archive {}: {e}", archive_path.display()))
    })?;
    let mut archive = ZipArchive::new(zip_file)?;
    let mut extracted = 0;

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;
        let rel_path = zipped.enclosed_name().ok_or_else(|| {
            InstallError::Archive(format!("unsafe entry path in archive: {}", zipped.name()))
        })?;
        let out_path = destination.join(&rel_path);

        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| InstallError::io(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
        }

        let mut out = File::create(&out_path).map_err(|e| InstallError::io(&out_path, e))?;
        std::io::copy(&mut zipped, &mut out).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => {
                InstallError::Archive(format!("corrupt entry {}: {e}", zipped.name()))
            }
            _ => InstallError::io(&out_path, e),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = zipped.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| InstallError::io(&out_path, e))?;
            }
        }

        debug!("Extracted {:?}", out_path);
        extracted += 1;
        on_entry(ExtractedEntry {
            name: rel_path.to_string_lossy().replace('\\', "/"),
            index: extracted,
        });
    }

    Ok(extracted)
}
