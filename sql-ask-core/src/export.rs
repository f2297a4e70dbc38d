use std::{
    borrow::Cow,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::info;

use crate::executor::{ResultSet, Value};

pub const EXPORT_FILE_NAME: &str = "sql_ask_query_result.csv";

const BOM: &[u8] = b"\xEF\xBB\xBF";

fn quote(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn cell(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::Text(text) => quote(text),
        other => Cow::Owned(quote(&other.to_string()).into_owned()),
    }
}

fn write_record<'a>(
    writer: &mut impl Write,
    fields: impl Iterator<Item = Cow<'a, str>>,
) -> io::Result<()> {
    let line = fields.collect::<Vec<_>>().join(",");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")
}

/// Writes `result` as CSV: UTF-8 with a byte order mark, a header row, and
/// NULL as an empty field.
pub fn write_csv(result: &ResultSet, writer: &mut impl Write) -> io::Result<()> {
    writer.write_all(BOM)?;
    write_record(writer, result.columns.iter().map(|name| quote(name)))?;
    for row in &result.rows {
        write_record(writer, row.iter().map(cell))?;
    }
    writer.flush()
}

/// Keeps the latest result in a single well-known file; each export
/// replaces the previous one.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    directory: PathBuf,
}

impl CsvExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(EXPORT_FILE_NAME)
    }

    /// Returns `None` without touching the filesystem when there are no rows.
    /// The export directory is created on first use.
    pub fn export(&self, result: &ResultSet) -> io::Result<Option<PathBuf>> {
        if result.is_empty() {
            return Ok(None);
        }
        fs::create_dir_all(&self.directory)?;
        let path = self.path();
        export_to(result, &path)?;
        Ok(Some(path))
    }

    /// Removes the export file. Returns whether there was one.
    pub fn clear(&self) -> io::Result<bool> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

pub fn export_to(result: &ResultSet, path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_csv(result, &mut writer)?;
    info!("Exported {} rows to {}", result.rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn products() -> ResultSet {
        ResultSet {
            columns: vec!["ProductName".into(), "UnitPrice".into(), "Note".into()],
            rows: vec![
                vec![
                    Value::Text("Chai".into()),
                    Value::Float(18.0),
                    Value::Null,
                ],
                vec![
                    Value::Text("Guaraná Fantástica".into()),
                    Value::Float(4.5),
                    Value::Text("cheap, \"sweet\"".into()),
                ],
            ],
        }
    }

    #[test]
    fn writes_bom_header_and_quoted_fields() {
        let mut out = Vec::new();
        write_csv(&products(), &mut out).unwrap();
        assert!(out.starts_with(BOM));
        let text = String::from_utf8(out[BOM.len()..].to_vec()).unwrap();
        assert_eq!(
            text,
            "ProductName,UnitPrice,Note\r\n\
             Chai,18,\r\n\
             Guaraná Fantástica,4.5,\"cheap, \"\"sweet\"\"\"\r\n"
        );
    }

    #[test]
    fn multiline_text_is_quoted() {
        assert_eq!(quote("a\nb"), "\"a\nb\"");
        assert_eq!(quote("plain"), "plain");
    }

    #[test]
    fn export_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path());
        let path = exporter.export(&products()).unwrap().unwrap();
        assert_eq!(path, dir.path().join(EXPORT_FILE_NAME));

        let single = ResultSet {
            columns: vec!["n".into()],
            rows: vec![vec![Value::Int(1)]],
        };
        exporter.export(&single).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[BOM.len()..], b"n\r\n1\r\n");
    }

    #[test]
    fn export_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path().join("does/not/exist"));
        let path = exporter.export(&products()).unwrap().unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn empty_result_is_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path());
        let empty = ResultSet {
            columns: vec!["Id".into()],
            rows: vec![],
        };
        assert_eq!(exporter.export(&empty).unwrap(), None);
        assert!(!exporter.path().exists());
    }

    #[test]
    fn clear_removes_export() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path());
        assert!(!exporter.clear().unwrap());
        exporter.export(&products()).unwrap();
        assert!(exporter.clear().unwrap());
        assert!(!exporter.path().exists());
    }
}
