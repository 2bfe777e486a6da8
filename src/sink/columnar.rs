//! Columnar (Parquet) snapshot writer. Compiled only with the `columnar`
//! feature; builds without it degrade to CSV-only.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;

use crate::core::types::{ProductRecord, SinkError};
use crate::sink::{RecordSink, COLUMNS};

pub struct ColumnarSink {
    path: PathBuf,
    schema: Arc<Schema>,
}

impl ColumnarSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let fields: Vec<Field> = COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect();
        Self {
            path: path.into(),
            schema: Arc::new(Schema::new(fields)),
        }
    }

    fn batch(&self, records: &[ProductRecord]) -> Result<RecordBatch, String> {
        fn column<'a>(
            records: &'a [ProductRecord],
            get: impl Fn(&'a ProductRecord) -> &'a str,
        ) -> ArrayRef {
            Arc::new(StringArray::from_iter_values(records.iter().map(get)))
        }

        let columns: Vec<ArrayRef> = vec![
            column(records, |r| r.url.as_str()),
            column(records, |r| r.title.as_str()),
            column(records, |r| r.image_url.as_str()),
            column(records, |r| r.price.as_str()),
            column(records, |r| r.rating.as_str()),
            column(records, |r| r.review_count.as_str()),
            column(records, |r| r.recent_activity.as_str()),
        ];
        RecordBatch::try_new(self.schema.clone(), columns).map_err(|e| e.to_string())
    }
}

impl RecordSink for ColumnarSink {
    fn write_snapshot(&mut self, records: &[ProductRecord]) -> Result<(), SinkError> {
        let display = self.path.display().to_string();
        let columnar_err = |reason: String| SinkError::Columnar {
            path: display.clone(),
            reason,
        };

        let batch = self.batch(records).map_err(&columnar_err)?;
        let file = File::create(&self.path).map_err(|e| SinkError::Create {
            path: display.clone(),
            source: e,
        })?;
        let mut writer = ArrowWriter::try_new(file, self.schema.clone(), None)
            .map_err(|e| columnar_err(e.to_string()))?;
        writer.write(&batch).map_err(|e| columnar_err(e.to_string()))?;
        writer.close().map_err(|e| columnar_err(e.to_string()))?;
        Ok(())
    }
}
