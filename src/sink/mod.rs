//! Snapshot persistence.
//!
//! A sink accepts the **full** accumulated collection and overwrites its
//! output — there is no append path, which is what makes mid-crawl restarts
//! and re-runs safe to reason about.

mod csv;

#[cfg(feature = "columnar")]
mod columnar;

pub use self::csv::CsvSink;

#[cfg(feature = "columnar")]
pub use self::columnar::ColumnarSink;

use crate::core::types::{ProductRecord, SinkError};

/// Column order shared by every output format. Fixed so identical
/// collections always serialize to identical bytes.
pub const COLUMNS: [&str; 7] = [
    "product_url",
    "title",
    "image_url",
    "price",
    "rating",
    "review_count",
    "recent_activity",
];

pub trait RecordSink: Send {
    /// Durably write the current collection, replacing the prior snapshot.
    fn write_snapshot(&mut self, records: &[ProductRecord]) -> Result<(), SinkError>;
}

/// The default sink: CSV always, Parquet alongside when configured and
/// compiled in.
pub struct SnapshotSink {
    csv: CsvSink,
    #[cfg(feature = "columnar")]
    columnar: Option<ColumnarSink>,
}

impl SnapshotSink {
    pub fn new(csv_path: &str, parquet_path: Option<&str>) -> Self {
        let csv = CsvSink::new(csv_path);

        #[cfg(feature = "columnar")]
        {
            Self {
                csv,
                columnar: parquet_path.map(ColumnarSink::new),
            }
        }

        #[cfg(not(feature = "columnar"))]
        {
            if parquet_path.is_some() {
                tracing::warn!(
                    "parquet output requested but this build lacks the `columnar` feature — \
                     writing CSV only"
                );
            }
            Self { csv }
        }
    }
}

impl RecordSink for SnapshotSink {
    fn write_snapshot(&mut self, records: &[ProductRecord]) -> Result<(), SinkError> {
        self.csv.write_snapshot(records)?;
        #[cfg(feature = "columnar")]
        if let Some(columnar) = &mut self.columnar {
            columnar.write_snapshot(records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_sink_writes_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out.csv");
        let parquet_path = dir.path().join("out.parquet");

        let records = vec![ProductRecord {
            url: "https://shop.example/p/a".into(),
            title: "Whey Isolate".into(),
            ..Default::default()
        }];

        let mut sink = SnapshotSink::new(
            csv_path.to_str().unwrap(),
            Some(parquet_path.to_str().unwrap()),
        );
        sink.write_snapshot(&records).unwrap();

        assert!(csv_path.exists());
        #[cfg(feature = "columnar")]
        assert!(parquet_path.exists());
        #[cfg(not(feature = "columnar"))]
        assert!(!parquet_path.exists());
    }
}
