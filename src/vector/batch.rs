//! Columnar batch: one vector per schema field.

use crate::error::{BridgeError, Result};
use crate::types::{Schema, Value};
use crate::vector::ColumnVector;

/// A group of rows materialized as one [`ColumnVector`] per column.
#[derive(Debug, Clone)]
pub struct ColumnBatch {
    schema: Schema,
    columns: Vec<ColumnVector>,
    num_rows: usize,
}

impl ColumnBatch {
    /// Creates a batch from a schema and matching column vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the column count does not match the schema, a
    /// column's type does not match its field, or a column holds fewer
    /// rows than `num_rows`.
    pub fn try_new(schema: Schema, columns: Vec<ColumnVector>, num_rows: usize) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(BridgeError::VectorLayout(format!(
                "schema declares {} fields but batch has {} columns",
                schema.len(),
                columns.len()
            )));
        }
        for (field, column) in schema.iter().zip(&columns) {
            if field.data_type != *column.data_type() {
                return Err(BridgeError::TypeError {
                    expected: field.data_type.name().to_string(),
                    actual: column.data_type().name().to_string(),
                });
            }
            if column.capacity() < num_rows {
                return Err(BridgeError::VectorLayout(format!(
                    "column '{}' holds {} rows, batch declares {}",
                    field.name,
                    column.capacity(),
                    num_rows
                )));
            }
        }
        Ok(ColumnBatch {
            schema,
            columns,
            num_rows,
        })
    }

    /// Returns the batch schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the number of rows in this batch.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns the number of columns in this batch.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns a column by position.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&ColumnVector> {
        self.columns.get(index)
    }

    /// Returns all columns in schema order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnVector] {
        &self.columns
    }

    /// Materializes one row as ordered values across all columns.
    #[must_use]
    pub fn row_values(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value_at(row)).collect()
    }

    /// Releases every column's backing buffers. Idempotent.
    pub fn close(&mut self) {
        for column in &mut self.columns {
            column.close();
        }
        self.num_rows = 0;
    }
}
