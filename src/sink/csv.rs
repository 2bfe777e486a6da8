//! Row-oriented snapshot writer.

use std::path::PathBuf;

use crate::core::types::{ProductRecord, SinkError};
use crate::sink::{RecordSink, COLUMNS};

/// Writes the full collection to one CSV file, overwriting the previous
/// snapshot. Column order is fixed, so rewriting the same collection is
/// byte-identical.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSink for CsvSink {
    fn write_snapshot(&mut self, records: &[ProductRecord]) -> Result<(), SinkError> {
        let display = self.path.display().to_string();
        let mut writer = csv::WriterBuilder::new()
            .from_path(&self.path)
            .map_err(|e| SinkError::Csv {
                path: display.clone(),
                source: e,
            })?;

        let write = |writer: &mut csv::Writer<std::fs::File>| -> csv::Result<()> {
            writer.write_record(COLUMNS)?;
            for r in records {
                writer.write_record([
                    r.url.as_str(),
                    r.title.as_str(),
                    r.image_url.as_str(),
                    r.price.as_str(),
                    r.rating.as_str(),
                    r.review_count.as_str(),
                    r.recent_activity.as_str(),
                ])?;
            }
            writer.flush()?;
            Ok(())
        };

        write(&mut writer).map_err(|e| SinkError::Csv {
            path: display,
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ProductRecord> {
        vec![
            ProductRecord {
                url: "https://shop.example/p/a".into(),
                title: "Fish Oil, 1000 mg".into(),
                price: "$9.99".into(),
                ..Default::default()
            },
            ProductRecord {
                url: "https://shop.example/p/b".into(),
                title: "B-Complex".into(),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn snapshot_overwrites_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        let mut sink = CsvSink::new(&path);

        sink.write_snapshot(&sample()).unwrap();
        // shrinking the collection must shrink the file — full overwrite
        sink.write_snapshot(&sample()[..1]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("product_url,title,"));
        assert!(contents.contains("\"Fish Oil, 1000 mg\""));
        assert!(!contents.contains("B-Complex"));
    }

    #[test]
    fn rewriting_the_same_collection_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        let mut sink = CsvSink::new(&path);

        sink.write_snapshot(&sample()).unwrap();
        let first = std::fs::read(&path).unwrap();
        sink.write_snapshot(&sample()).unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_collection_still_writes_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        CsvSink::new(&path).write_snapshot(&[]).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
