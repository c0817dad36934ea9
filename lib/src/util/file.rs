use std::{fs, fs::File, io, io::Write, path::Path};

use memmap2::{Mmap, MmapOptions};
use tempfile::NamedTempFile;

use crate::error::Result;

/// Opens a memory mapped file.
pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let file = File::open(&path).map_err(|e| {
        io::Error::new(e.kind(), format!("Failed to open file '{}': {e}", path.as_ref().display()))
    })?;
    let map = unsafe { MmapOptions::new().map(&file) }.map_err(|e| {
        io::Error::new(e.kind(), format!("Failed to mmap file '{}': {e}", path.as_ref().display()))
    })?;
    Ok(map)
}

/// Replaces the file contents atomically: the data goes to a temporary file
/// next to `path`, which is then renamed over it. On error the old contents
/// stay in place.
pub fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let context = |e: io::Error| {
        io::Error::new(e.kind(), format!("Failed to write file '{}': {e}", path.display()))
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(context)?;
    if let Ok(meta) = fs::metadata(path) {
        file.as_file().set_permissions(meta.permissions()).map_err(context)?;
    }
    file.write_all(data).map_err(context)?;
    file.as_file().sync_all().map_err(context)?;
    file.persist(path).map_err(|e| context(e.error))?;
    Ok(())
}

/// File name without directories, as used for object names.
pub fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
