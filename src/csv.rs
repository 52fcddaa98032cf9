//! Minimal CSV sink for export records with heterogeneous columns.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::record::ExportRecord;

/// Byte-order mark so spreadsheet tools detect UTF-8.
const BOM: &str = "\u{feff}";

/// Union of all record columns, in first-seen order.
pub fn header(records: &[ExportRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for column in record.columns() {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
    }
    columns
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<W: Write>(out: &mut W, fields: impl Iterator<Item = String>) -> std::io::Result<()> {
    let line = fields.map(|f| escape(&f)).collect::<Vec<_>>().join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")
}

pub fn write<W: Write>(out: &mut W, records: &[ExportRecord]) -> std::io::Result<()> {
    let columns = header(records);
    out.write_all(BOM.as_bytes())?;
    write_row(out, columns.iter().cloned())?;
    for record in records {
        write_row(
            out,
            columns
                .iter()
                .map(|c| record.get(c).unwrap_or_default().to_string()),
        )?;
    }
    Ok(())
}

/// Write `records` to `dir/file_name`, creating the directory if needed.
/// Rows go to a sibling `.tmp` file first and are renamed into place, so a
/// failed write never leaves a partial export behind.
pub fn write_file(dir: &Path, file_name: &str, records: &[ExportRecord]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let tmp = dir.join(format!("{file_name}.tmp"));

    let written = write_tmp(&tmp, records).and_then(|()| Ok(fs::rename(&tmp, &path)?));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(path)
}

fn write_tmp(tmp: &Path, records: &[ExportRecord]) -> Result<()> {
    let mut out = BufWriter::new(File::create(tmp)?);
    write(&mut out, records)?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
