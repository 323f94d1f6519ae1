//! Null-aware builders that seal into read-only vectors and batches.
//!
//! Builders serve the outbound half of the bridge: projected row values are
//! appended column-wise, then sealed into an immutable [`ColumnVector`] /
//! [`ColumnBatch`] for the worker channel. Nested element types only ever
//! arrive from the worker side, so they are not buildable here.

use crate::error::{BridgeError, Result};
use crate::types::{DataType, Schema, Value};
use crate::vector::{ColumnBatch, ColumnVector, ValidityBitmap};

/// Incrementally builds one column of scalar values.
#[derive(Debug)]
pub struct ColumnBuilder {
    data_type: DataType,
    validity: Vec<bool>,
    /// Fixed-width values or the shared var-len data buffer.
    data: Vec<u8>,
    /// Var-len value boundaries; unused for fixed-width types.
    offsets: Vec<i32>,
}

impl ColumnBuilder {
    /// Creates a builder for the given scalar element type.
    ///
    /// # Errors
    ///
    /// Returns an error for list or struct element types.
    pub fn new(data_type: DataType) -> Result<Self> {
        if data_type.is_nested() {
            return Err(BridgeError::UnsupportedOperation(format!(
                "{} columns are produced by the worker runtime, not built here",
                data_type.name()
            )));
        }
        let offsets = if data_type.is_var_len() { vec![0] } else { Vec::new() };
        Ok(ColumnBuilder {
            data_type,
            validity: Vec::new(),
            data: Vec::new(),
            offsets,
        })
    }

    /// Returns the number of appended rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.validity.len()
    }

    /// Returns true if no rows were appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    /// Appends one value; `Value::Null` appends a null entry.
    ///
    /// # Errors
    ///
    /// Returns a type error if the value does not match the builder's
    /// element type.
    pub fn append(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            return self.append_null();
        }
        match (&self.data_type, value) {
            (DataType::Bool, Value::Bool(v)) => self.push_fixed(&[u8::from(*v)]),
            (DataType::Int8, Value::Int8(v)) => self.push_fixed(&v.to_le_bytes()),
            (DataType::Int16, Value::Int16(v)) => self.push_fixed(&v.to_le_bytes()),
            (DataType::Int32, Value::Int32(v)) => self.push_fixed(&v.to_le_bytes()),
            (DataType::Int64, Value::Int64(v)) => self.push_fixed(&v.to_le_bytes()),
            (DataType::Float32, Value::Float32(v)) => self.push_fixed(&v.to_le_bytes()),
            (DataType::Float64, Value::Float64(v)) => self.push_fixed(&v.to_le_bytes()),
            (DataType::Decimal { .. }, Value::Decimal(v)) => {
                self.push_fixed(&v.unscaled().to_le_bytes());
            }
            (DataType::Utf8, Value::String(v)) => self.push_var_len(v.as_bytes())?,
            (DataType::Binary, Value::Binary(v)) => self.push_var_len(v)?,
            (expected, actual) => {
                return Err(BridgeError::TypeError {
                    expected: expected.name().to_string(),
                    actual: actual
                        .data_type()
                        .map_or_else(|| "UNKNOWN".to_string(), |t| t.name().to_string()),
                })
            }
        }
        self.validity.push(true);
        Ok(())
    }

    /// Appends a null entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the var-len data buffer would overflow the
    /// `i32` offset range (unreachable for null appends; kept for
    /// signature symmetry with [`Self::append`]).
    pub fn append_null(&mut self) -> Result<()> {
        if self.data_type.is_var_len() {
            // Null repeats the previous offset: zero-length window.
            let last = *self.offsets.last().expect("seeded with 0");
            self.offsets.push(last);
        } else {
            let width = self.data_type.byte_width().expect("scalar fixed width");
            self.data.extend(std::iter::repeat(0u8).take(width));
        }
        self.validity.push(false);
        Ok(())
    }

    fn push_fixed(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn push_var_len(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.data.len() + bytes.len();
        let end = i32::try_from(end).map_err(|_| {
            BridgeError::VectorLayout(
                "variable-length data buffer exceeds i32 offset range".to_string(),
            )
        })?;
        self.data.extend_from_slice(bytes);
        self.offsets.push(end);
        Ok(())
    }

    /// Seals the builder into a read-only vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the accumulated buffers are inconsistent.
    pub fn finish(self) -> Result<ColumnVector> {
        let rows = self.validity.len();
        let validity = ValidityBitmap::from_bools(&self.validity);
        if self.data_type.is_var_len() {
            ColumnVector::var_len(self.data_type, rows, validity, self.offsets, self.data)
        } else {
            ColumnVector::fixed_width(self.data_type, rows, validity, self.data)
        }
    }
}

/// Builds a [`ColumnBatch`] row by row against a fixed schema.
#[derive(Debug)]
pub struct BatchBuilder {
    schema: Schema,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

impl BatchBuilder {
    /// Creates a builder for the given schema.
    ///
    /// # Errors
    ///
    /// Returns an error if any field has a nested element type.
    pub fn new(schema: Schema) -> Result<Self> {
        let builders = schema
            .iter()
            .map(|f| ColumnBuilder::new(f.data_type.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(BatchBuilder {
            schema,
            builders,
            rows: 0,
        })
    }

    /// Returns the number of appended rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Returns true if no rows were appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Appends one row of values, one per schema field.
    ///
    /// # Errors
    ///
    /// Returns an error on arity or type mismatch.
    pub fn append_row(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.builders.len() {
            return Err(BridgeError::VectorLayout(format!(
                "row has {} values, schema expects {}",
                values.len(),
                self.builders.len()
            )));
        }
        for (builder, value) in self.builders.iter_mut().zip(values) {
            builder.append(value)?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Seals the builder into a read-only batch.
    ///
    /// # Errors
    ///
    /// Returns an error if any column's buffers are inconsistent.
    pub fn finish(self) -> Result<ColumnBatch> {
        let columns = self
            .builders
            .into_iter()
            .map(ColumnBuilder::finish)
            .collect::<Result<Vec<_>>>()?;
        ColumnBatch::try_new(self.schema, columns, self.rows)
    }
}
