//! CSV export of the exclusion list.
//!
//! Schema: `image_stem,exclusion_reason,full_path`, one row per excluded image
//! in path order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::SessionError;

use super::exclusions::ExclusionMap;

pub const CSV_HEADER: &str = "image_stem,exclusion_reason,full_path";

/// Quote a field if it contains a comma, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write the exclusion list as CSV.
pub fn write_csv<W: Write>(writer: &mut W, exclusions: &ExclusionMap) -> std::io::Result<()> {
    writeln!(writer, "{}", CSV_HEADER)?;
    for (path, record) in exclusions.iter() {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        writeln!(
            writer,
            "{},{},{}",
            csv_field(&stem),
            csv_field(&record.reason),
            csv_field(&path.to_string_lossy())
        )?;
    }
    Ok(())
}

/// Render the exclusion list as a CSV string.
pub fn to_csv_string(exclusions: &ExclusionMap) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_csv(&mut out, exclusions);
    String::from_utf8_lossy(&out).into_owned()
}

/// Write the exclusion list to a CSV file, replacing it if present.
pub fn export_csv_file(path: &Path, exclusions: &ExclusionMap) -> Result<(), SessionError> {
    let file = File::create(path).map_err(|e| SessionError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, exclusions).map_err(|e| SessionError::io(path, e))?;
    writer.flush().map_err(|e| SessionError::io(path, e))
}
