use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::store::StoreSnapshot;

/// Write a store snapshot as gzip-compressed bincode.
///
/// The snapshot is written to a sibling temporary file first and renamed into
/// place, so a crash mid-write leaves the previous snapshot intact.
pub fn save_snapshot(snapshot: &StoreSnapshot, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = std::io::BufWriter::new(encoder);

        serialize_into(&mut writer, snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?.flush()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}

pub fn load_snapshot(path: &Path) -> std::io::Result<StoreSnapshot> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let snapshot: StoreSnapshot = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(snapshot)
}
