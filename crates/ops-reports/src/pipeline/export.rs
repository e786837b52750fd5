use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unable to encode export rows: {0}")]
    Csv(#[from] csv::Error),
    #[error("unable to write export file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Serialises rows to CSV bytes. The header comes from the row type's
/// serde field names, so column order is the struct's field order.
pub fn render_csv<R: Serialize>(rows: &[R]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

/// A local export file awaiting upload. It is not removed on drop: a file
/// whose upload failed stays on disk for manual follow-up.
#[derive(Debug)]
pub struct ExportFile {
    path: PathBuf,
    rows: usize,
}

impl ExportFile {
    /// Writes `rows` to `dir/name`. No file is produced for an empty row set.
    pub fn write<R: Serialize>(
        dir: &Path,
        name: &str,
        rows: &[R],
        with_bom: bool,
    ) -> Result<Option<Self>, ExportError> {
        if rows.is_empty() {
            info!(file = name, "no rows to export; skipping file");
            return Ok(None);
        }

        let path = dir.join(name);
        let body = render_csv(rows)?;
        let io_error = |source| ExportError::Io {
            path: path.clone(),
            source,
        };

        let mut file = fs::File::create(&path).map_err(io_error)?;
        if with_bom {
            file.write_all(UTF8_BOM).map_err(io_error)?;
        }
        file.write_all(&body).map_err(io_error)?;
        file.flush().map_err(io_error)?;

        info!(path = %path.display(), rows = rows.len(), "export file written");
        Ok(Some(Self {
            path,
            rows: rows.len(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Deletes the local file once it has been delivered.
    pub fn remove(self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "local export removed"),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unable to remove local export")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row<'a> {
        #[serde(rename = "Source")]
        source: &'a str,
        #[serde(rename = "Item")]
        item: &'a str,
        #[serde(rename = "Share (%)")]
        share: f64,
    }

    #[test]
    fn csv_header_follows_field_order() {
        let rows = [Row {
            source: "browser",
            item: "Chrome, stable",
            share: 61.5,
        }];
        let body = String::from_utf8(render_csv(&rows).expect("csv")).expect("utf8");
        assert_eq!(body, "Source,Item,Share (%)\nbrowser,\"Chrome, stable\",61.5\n");
    }

    #[test]
    fn empty_rows_produce_no_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = ExportFile::write::<Row>(dir.path(), "empty.csv", &[], false).expect("write");
        assert!(file.is_none());
        assert!(!dir.path().join("empty.csv").exists());
    }

    #[test]
    fn bom_prefix_and_removal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let rows = [Row {
            source: "vendor",
            item: "Samsung",
            share: 70.0,
        }];
        let file = ExportFile::write(dir.path(), "share.csv", &rows, true)
            .expect("write")
            .expect("file produced");
        let bytes = fs::read(file.path()).expect("read back");
        assert!(bytes.starts_with(UTF8_BOM));
        assert_eq!(file.rows(), 1);
        assert_eq!(file.file_name(), "share.csv");

        let path = file.path().to_path_buf();
        file.remove();
        assert!(!path.exists());
    }
}
