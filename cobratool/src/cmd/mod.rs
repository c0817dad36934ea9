pub mod bani;
pub mod fgm;
pub mod matcol;
pub mod mdl2;

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::Serialize;

/// Writes `value` as pretty-printed JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut file = BufWriter::new(
        File::create(path)
            .with_context(|| format!("Failed to create output file '{}'", path.display()))?,
    );
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    log::info!("Wrote '{}'", path.display());
    Ok(())
}
