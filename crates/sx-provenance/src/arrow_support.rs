// SPDX-License-Identifier: MIT OR Apache-2.0
//! Thin helpers around the Arrow IPC stream format used for
//! `artifact_<name>.arrow` payloads (spec.md §4.2, §6.1).
//!
//! The provenance store itself treats artifact bytes as opaque — it
//! writes and reads whatever `TableArtifact` carries without inspecting
//! schema — but downstream consumers (and tests) need a real decoder to
//! confirm a payload is well-formed Arrow IPC.

use arrow::array::RecordBatch;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use std::io::Cursor;

/// Decode an Arrow IPC stream payload into its record batches.
pub fn read_record_batches(bytes: &[u8]) -> Result<Vec<RecordBatch>, arrow::error::ArrowError> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    reader.collect()
}

/// Encode record batches as an Arrow IPC stream payload.
pub fn write_record_batches(batches: &[RecordBatch]) -> Result<Vec<u8>, arrow::error::ArrowError> {
    let Some(first) = batches.first() else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &first.schema())?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn round_trips_a_simple_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap();

        let bytes = write_record_batches(&[batch.clone()]).unwrap();
        let decoded = read_record_batches(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].num_rows(), 3);
    }
}
