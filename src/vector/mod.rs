//! Read-only columnar vectors over externally-produced buffers.
//!
//! A [`ColumnVector`] is an immutable, typed view of one column's values
//! for a batch of rows. Physical storage is a closed set of kinds selected
//! by the element type tag:
//! - fixed-width types: one contiguous little-endian data buffer;
//! - strings/binary: an `i32` offset buffer plus a shared data buffer;
//! - lists: an `i32` offset buffer plus one owned child vector;
//! - structs: owned child vectors addressed positionally.
//!
//! Vectors are built from worker-produced raw parts or sealed by the
//! [`builder`] and never mutated afterwards; the `put_*` entry points exist
//! only to fail with a capability error.

pub mod batch;
mod bitmap;
pub mod builder;

pub use batch::ColumnBatch;
pub use bitmap::ValidityBitmap;
pub use builder::{BatchBuilder, ColumnBuilder};

use crate::error::{BridgeError, Result};
use crate::types::{DataType, Decimal, Field, Value};

/// Kind-specific backing buffers for a column vector.
#[derive(Debug, Clone)]
enum Buffers {
    /// One contiguous data buffer of `width`-byte values.
    Fixed { data: Vec<u8>, width: usize },
    /// Offset buffer (rows + 1 entries) windowing a shared data buffer.
    VarLen { offsets: Vec<i32>, data: Vec<u8> },
    /// Offset buffer windowing the single child vector.
    List { offsets: Vec<i32> },
    /// Values live entirely in the child vectors.
    Struct,
}

/// An immutable, typed columnar view over one column's memory.
#[derive(Debug, Clone)]
pub struct ColumnVector {
    data_type: DataType,
    /// Logical row capacity; at least the number of populated rows.
    capacity: usize,
    validity: ValidityBitmap,
    /// Number of unset validity bits, computed once at construction.
    null_count: usize,
    buffers: Buffers,
    /// Child vectors, owned exclusively by this vector.
    children: Vec<ColumnVector>,
}

impl ColumnVector {
    /// Creates a vector over a fixed-width data buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is not fixed-width or the buffer is
    /// shorter than `rows` values.
    pub fn fixed_width(
        data_type: DataType,
        rows: usize,
        validity: ValidityBitmap,
        data: Vec<u8>,
    ) -> Result<Self> {
        let width = data_type.byte_width().ok_or_else(|| {
            BridgeError::VectorLayout(format!(
                "{} is not a fixed-width type",
                data_type.name()
            ))
        })?;
        if data.len() < rows * width {
            return Err(BridgeError::VectorLayout(format!(
                "data buffer holds {} bytes, {} rows of width {} need {}",
                data.len(),
                rows,
                width,
                rows * width
            )));
        }
        let null_count = validity.count_invalid(rows);
        Ok(ColumnVector {
            data_type,
            capacity: rows,
            validity,
            null_count,
            buffers: Buffers::Fixed { data, width },
            children: Vec::new(),
        })
    }

    /// Creates a string or binary vector over offset and data buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is not variable-length, the offset
    /// buffer does not hold `rows + 1` monotonic entries within the data
    /// buffer, or a UTF-8 column's data is not valid UTF-8.
    pub fn var_len(
        data_type: DataType,
        rows: usize,
        validity: ValidityBitmap,
        offsets: Vec<i32>,
        data: Vec<u8>,
    ) -> Result<Self> {
        if !data_type.is_var_len() {
            return Err(BridgeError::VectorLayout(format!(
                "{} is not a variable-length type",
                data_type.name()
            )));
        }
        validate_offsets(&offsets, rows, data.len())?;
        if data_type == DataType::Utf8 && std::str::from_utf8(&data).is_err() {
            return Err(BridgeError::VectorLayout(
                "string column data buffer is not valid UTF-8".to_string(),
            ));
        }
        let null_count = validity.count_invalid(rows);
        Ok(ColumnVector {
            data_type,
            capacity: rows,
            validity,
            null_count,
            buffers: Buffers::VarLen { offsets, data },
            children: Vec::new(),
        })
    }

    /// Creates a list vector over an offset buffer and one child vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset buffer does not hold `rows + 1`
    /// monotonic entries within the child's capacity.
    pub fn list(
        rows: usize,
        validity: ValidityBitmap,
        offsets: Vec<i32>,
        child: ColumnVector,
    ) -> Result<Self> {
        validate_offsets(&offsets, rows, child.capacity())?;
        let null_count = validity.count_invalid(rows);
        Ok(ColumnVector {
            data_type: DataType::List(Box::new(child.data_type.clone())),
            capacity: rows,
            validity,
            null_count,
            buffers: Buffers::List { offsets },
            children: vec![child],
        })
    }

    /// Creates a struct vector from positionally-addressed child vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the field and child counts differ, a declared
    /// field type does not match its child, or a child is shorter than
    /// `rows`.
    pub fn struct_of(
        fields: Vec<Field>,
        rows: usize,
        validity: ValidityBitmap,
        children: Vec<ColumnVector>,
    ) -> Result<Self> {
        if fields.len() != children.len() {
            return Err(BridgeError::VectorLayout(format!(
                "struct declares {} fields but has {} children",
                fields.len(),
                children.len()
            )));
        }
        for (field, child) in fields.iter().zip(&children) {
            if field.data_type != child.data_type {
                return Err(BridgeError::TypeError {
                    expected: field.data_type.name().to_string(),
                    actual: child.data_type.name().to_string(),
                });
            }
            if child.capacity() < rows {
                return Err(BridgeError::VectorLayout(format!(
                    "struct child '{}' holds {} rows, parent needs {}",
                    field.name,
                    child.capacity(),
                    rows
                )));
            }
        }
        let null_count = validity.count_invalid(rows);
        Ok(ColumnVector {
            data_type: DataType::Struct(fields),
            capacity: rows,
            validity,
            null_count,
            buffers: Buffers::Struct,
            children,
        })
    }

    /// Returns the element type of this vector.
    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Returns the logical row capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of null entries, computed at construction.
    #[must_use]
    pub fn null_count(&self) -> usize {
        self.null_count
    }

    /// Returns true if the row is null. O(1); consults only the bitmap.
    #[must_use]
    pub fn is_null_at(&self, row: usize) -> bool {
        !self.validity.is_valid(row)
    }

    /// Returns the child vector at the given position.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<&ColumnVector> {
        self.children.get(index)
    }

    /// Returns all child vectors.
    #[must_use]
    pub fn children(&self) -> &[ColumnVector] {
        &self.children
    }

    fn fixed_value(&self, row: usize, expected: &DataType, caller: &str) -> &[u8] {
        assert!(
            self.data_type == *expected,
            "{caller} called on {} vector",
            self.data_type.name()
        );
        match &self.buffers {
            Buffers::Fixed { data, width } => &data[row * width..(row + 1) * width],
            _ => unreachable!("fixed-width type backed by non-fixed buffers"),
        }
    }

    /// Reads a boolean value.
    ///
    /// # Panics
    ///
    /// Panics if this is not a boolean vector (programming error).
    #[must_use]
    pub fn get_bool(&self, row: usize) -> bool {
        self.fixed_value(row, &DataType::Bool, "get_bool")[0] != 0
    }

    /// Reads an 8-bit integer value.
    ///
    /// # Panics
    ///
    /// Panics if this is not an `Int8` vector (programming error).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn get_i8(&self, row: usize) -> i8 {
        self.fixed_value(row, &DataType::Int8, "get_i8")[0] as i8
    }

    /// Reads a 16-bit integer value.
    ///
    /// # Panics
    ///
    /// Panics if this is not an `Int16` vector (programming error).
    #[must_use]
    pub fn get_i16(&self, row: usize) -> i16 {
        let bytes = self.fixed_value(row, &DataType::Int16, "get_i16");
        i16::from_le_bytes(bytes.try_into().expect("2-byte window"))
    }

    /// Reads a 32-bit integer value.
    ///
    /// # Panics
    ///
    /// Panics if this is not an `Int32` vector (programming error).
    #[must_use]
    pub fn get_i32(&self, row: usize) -> i32 {
        let bytes = self.fixed_value(row, &DataType::Int32, "get_i32");
        i32::from_le_bytes(bytes.try_into().expect("4-byte window"))
    }

    /// Reads a 64-bit integer value.
    ///
    /// # Panics
    ///
    /// Panics if this is not an `Int64` vector (programming error).
    #[must_use]
    pub fn get_i64(&self, row: usize) -> i64 {
        let bytes = self.fixed_value(row, &DataType::Int64, "get_i64");
        i64::from_le_bytes(bytes.try_into().expect("8-byte window"))
    }

    /// Reads a 32-bit float value.
    ///
    /// # Panics
    ///
    /// Panics if this is not a `Float32` vector (programming error).
    #[must_use]
    pub fn get_f32(&self, row: usize) -> f32 {
        let bytes = self.fixed_value(row, &DataType::Float32, "get_f32");
        f32::from_le_bytes(bytes.try_into().expect("4-byte window"))
    }

    /// Reads a 64-bit float value.
    ///
    /// # Panics
    ///
    /// Panics if this is not a `Float64` vector (programming error).
    #[must_use]
    pub fn get_f64(&self, row: usize) -> f64 {
        let bytes = self.fixed_value(row, &DataType::Float64, "get_f64");
        f64::from_le_bytes(bytes.try_into().expect("8-byte window"))
    }

    /// Reads a decimal value, scaling the backing unscaled integer by the
    /// declared `(precision, scale)`. Returns `None` for a null entry.
    ///
    /// # Panics
    ///
    /// Panics if this is not a decimal vector (programming error).
    #[must_use]
    pub fn get_decimal(&self, row: usize, precision: u8, scale: u8) -> Option<Decimal> {
        assert!(
            matches!(self.data_type, DataType::Decimal { .. }),
            "get_decimal called on {} vector",
            self.data_type.name()
        );
        if self.is_null_at(row) {
            return None;
        }
        let bytes = match &self.buffers {
            Buffers::Fixed { data, width } => &data[row * width..(row + 1) * width],
            _ => unreachable!("decimal backed by non-fixed buffers"),
        };
        let unscaled = i128::from_le_bytes(bytes.try_into().expect("16-byte window"));
        Some(Decimal::new(unscaled, precision, scale))
    }

    /// Reads a string as a zero-copy window into the shared data buffer.
    /// Returns `None` for a null entry; a null is distinct from `""`.
    ///
    /// # Panics
    ///
    /// Panics if this is not a string vector (programming error).
    #[must_use]
    pub fn get_string(&self, row: usize) -> Option<&str> {
        assert!(
            self.data_type == DataType::Utf8,
            "get_string called on {} vector",
            self.data_type.name()
        );
        if self.is_null_at(row) {
            return None;
        }
        let bytes = self.var_len_window(row);
        Some(std::str::from_utf8(bytes).expect("validated at construction"))
    }

    /// Reads a binary value as a zero-copy window into the shared buffer.
    /// Returns `None` for a null entry.
    ///
    /// # Panics
    ///
    /// Panics if this is not a binary vector (programming error).
    #[must_use]
    pub fn get_binary(&self, row: usize) -> Option<&[u8]> {
        assert!(
            self.data_type == DataType::Binary,
            "get_binary called on {} vector",
            self.data_type.name()
        );
        if self.is_null_at(row) {
            return None;
        }
        Some(self.var_len_window(row))
    }

    fn var_len_window(&self, row: usize) -> &[u8] {
        match &self.buffers {
            Buffers::VarLen { offsets, data } => {
                let start = offsets[row] as usize;
                let end = offsets[row + 1] as usize;
                &data[start..end]
            }
            _ => unreachable!("variable-length type backed by non-varlen buffers"),
        }
    }

    /// Returns the element count of the list at the given row:
    /// `offset[row + 1] - offset[row]`.
    ///
    /// # Panics
    ///
    /// Panics if this is not a list vector (programming error).
    #[must_use]
    pub fn get_array_len(&self, row: usize) -> usize {
        let offsets = self.list_offsets("get_array_len");
        (offsets[row + 1] - offsets[row]) as usize
    }

    /// Returns the starting offset of the list at the given row into the
    /// child vector.
    ///
    /// # Panics
    ///
    /// Panics if this is not a list vector (programming error).
    #[must_use]
    pub fn get_array_offset(&self, row: usize) -> usize {
        let offsets = self.list_offsets("get_array_offset");
        offsets[row] as usize
    }

    fn list_offsets(&self, caller: &str) -> &[i32] {
        assert!(
            matches!(self.data_type, DataType::List(_)),
            "{caller} called on {} vector",
            self.data_type.name()
        );
        match &self.buffers {
            Buffers::List { offsets } => offsets,
            _ => unreachable!("list type backed by non-list buffers"),
        }
    }

    /// Materializes the value at the given row, recursing into nested
    /// columns. Null entries yield [`Value::Null`].
    #[must_use]
    pub fn value_at(&self, row: usize) -> Value {
        if self.is_null_at(row) {
            return Value::Null;
        }
        match &self.data_type {
            DataType::Bool => Value::Bool(self.get_bool(row)),
            DataType::Int8 => Value::Int8(self.get_i8(row)),
            DataType::Int16 => Value::Int16(self.get_i16(row)),
            DataType::Int32 => Value::Int32(self.get_i32(row)),
            DataType::Int64 => Value::Int64(self.get_i64(row)),
            DataType::Float32 => Value::Float32(self.get_f32(row)),
            DataType::Float64 => Value::Float64(self.get_f64(row)),
            DataType::Decimal { precision, scale } => self
                .get_decimal(row, *precision, *scale)
                .map_or(Value::Null, Value::Decimal),
            DataType::Utf8 => self
                .get_string(row)
                .map_or(Value::Null, |s| Value::String(s.to_string())),
            DataType::Binary => self
                .get_binary(row)
                .map_or(Value::Null, |b| Value::Binary(b.to_vec())),
            DataType::List(_) => {
                let offset = self.get_array_offset(row);
                let len = self.get_array_len(row);
                let child = &self.children[0];
                Value::List((offset..offset + len).map(|i| child.value_at(i)).collect())
            }
            DataType::Struct(_) => Value::Struct(
                self.children.iter().map(|child| child.value_at(row)).collect(),
            ),
        }
    }

    /// Unsupported: the vector is a read-only view.
    ///
    /// # Errors
    ///
    /// Always returns [`BridgeError::ReadOnlyVector`].
    pub fn put_null(&mut self, _row: usize) -> Result<()> {
        Err(read_only("put_null"))
    }

    /// Unsupported: the vector is a read-only view.
    ///
    /// # Errors
    ///
    /// Always returns [`BridgeError::ReadOnlyVector`].
    pub fn put_bool(&mut self, _row: usize, _value: bool) -> Result<()> {
        Err(read_only("put_bool"))
    }

    /// Unsupported: the vector is a read-only view.
    ///
    /// # Errors
    ///
    /// Always returns [`BridgeError::ReadOnlyVector`].
    pub fn put_i64(&mut self, _row: usize, _value: i64) -> Result<()> {
        Err(read_only("put_i64"))
    }

    /// Unsupported: the vector is a read-only view.
    ///
    /// # Errors
    ///
    /// Always returns [`BridgeError::ReadOnlyVector`].
    pub fn put_f64(&mut self, _row: usize, _value: f64) -> Result<()> {
        Err(read_only("put_f64"))
    }

    /// Unsupported: the vector is a read-only view.
    ///
    /// # Errors
    ///
    /// Always returns [`BridgeError::ReadOnlyVector`].
    pub fn put_bytes(&mut self, _row: usize, _value: &[u8]) -> Result<()> {
        Err(read_only("put_bytes"))
    }

    /// Unsupported: the vector is a read-only view.
    ///
    /// # Errors
    ///
    /// Always returns [`BridgeError::ReadOnlyVector`].
    pub fn reserve(&mut self, _capacity: usize) -> Result<()> {
        Err(read_only("reserve"))
    }

    /// Releases this vector's buffers and recursively closes children.
    ///
    /// Deterministic and idempotent; safe as the terminal step of a
    /// task-completion hook. Accessors must not be used afterwards.
    pub fn close(&mut self) {
        for child in &mut self.children {
            child.close();
        }
        self.children.clear();
        self.validity.clear();
        self.null_count = 0;
        self.capacity = 0;
        match &mut self.buffers {
            Buffers::Fixed { data, .. } => {
                *data = Vec::new();
            }
            Buffers::VarLen { offsets, data } => {
                *offsets = Vec::new();
                *data = Vec::new();
            }
            Buffers::List { offsets } => {
                *offsets = Vec::new();
            }
            Buffers::Struct => {}
        }
    }
}

fn read_only(op: &str) -> BridgeError {
    BridgeError::ReadOnlyVector(format!(
        "{op} is unsupported on a vector over externally-produced data"
    ))
}

fn validate_offsets(offsets: &[i32], rows: usize, data_len: usize) -> Result<()> {
    if offsets.len() != rows + 1 {
        return Err(BridgeError::VectorLayout(format!(
            "offset buffer holds {} entries, {} rows need {}",
            offsets.len(),
            rows,
            rows + 1
        )));
    }
    let mut prev = 0i32;
    for &offset in offsets {
        if offset < prev {
            return Err(BridgeError::VectorLayout(
                "offset buffer is not monotonically non-decreasing".to_string(),
            ));
        }
        prev = offset;
    }
    if offsets.last().copied().unwrap_or(0) as usize > data_len {
        return Err(BridgeError::VectorLayout(format!(
            "final offset {} exceeds data length {}",
            offsets.last().copied().unwrap_or(0),
            data_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i64_vector(values: &[Option<i64>]) -> ColumnVector {
        let mut data = Vec::with_capacity(values.len() * 8);
        let mut valid = Vec::with_capacity(values.len());
        for v in values {
            data.extend_from_slice(&v.unwrap_or(0).to_le_bytes());
            valid.push(v.is_some());
        }
        ColumnVector::fixed_width(
            DataType::Int64,
            values.len(),
            ValidityBitmap::from_bools(&valid),
            data,
        )
        .unwrap()
    }

    #[test]
    fn test_fixed_width_getters() {
        let vector = i64_vector(&[Some(1), Some(-7), None, Some(i64::MAX)]);
        assert_eq!(vector.capacity(), 4);
        assert_eq!(vector.null_count(), 1);
        assert_eq!(vector.get_i64(0), 1);
        assert_eq!(vector.get_i64(1), -7);
        assert!(vector.is_null_at(2));
        assert!(!vector.is_null_at(3));
        assert_eq!(vector.get_i64(3), i64::MAX);
    }

    #[test]
    #[should_panic(expected = "get_f64 called on INT64 vector")]
    fn test_type_mismatched_getter_panics() {
        let vector = i64_vector(&[Some(1)]);
        let _ = vector.get_f64(0);
    }

    #[test]
    fn test_fixed_width_rejects_short_buffer() {
        let result =
            ColumnVector::fixed_width(DataType::Int64, 2, ValidityBitmap::all_valid(), vec![0; 8]);
        assert!(matches!(result, Err(BridgeError::VectorLayout(_))));
    }

    #[test]
    fn test_string_null_vs_empty() {
        // rows: "ab", "", null
        let offsets = vec![0, 2, 2, 2];
        let data = b"ab".to_vec();
        let validity = ValidityBitmap::from_bools(&[true, true, false]);
        let vector =
            ColumnVector::var_len(DataType::Utf8, 3, validity, offsets, data).unwrap();
        assert_eq!(vector.get_string(0), Some("ab"));
        assert_eq!(vector.get_string(1), Some(""));
        assert_eq!(vector.get_string(2), None);
        assert!(vector.is_null_at(2));
        assert_eq!(vector.null_count(), 1);
    }

    #[test]
    fn test_binary_windows() {
        let offsets = vec![0, 3, 3, 4];
        let data = vec![1, 2, 3, 9];
        let vector = ColumnVector::var_len(
            DataType::Binary,
            3,
            ValidityBitmap::all_valid(),
            offsets,
            data,
        )
        .unwrap();
        assert_eq!(vector.get_binary(0), Some(&[1u8, 2, 3][..]));
        assert_eq!(vector.get_binary(1), Some(&[][..]));
        assert_eq!(vector.get_binary(2), Some(&[9u8][..]));
    }

    #[test]
    fn test_var_len_rejects_bad_offsets() {
        let result = ColumnVector::var_len(
            DataType::Binary,
            2,
            ValidityBitmap::all_valid(),
            vec![0, 4, 2],
            vec![0; 4],
        );
        assert!(matches!(result, Err(BridgeError::VectorLayout(_))));
    }

    #[test]
    fn test_decimal_scaling() {
        let mut data = Vec::new();
        data.extend_from_slice(&12345i128.to_le_bytes());
        data.extend_from_slice(&0i128.to_le_bytes());
        let validity = ValidityBitmap::from_bools(&[true, false]);
        let vector = ColumnVector::fixed_width(
            DataType::Decimal {
                precision: 10,
                scale: 2,
            },
            2,
            validity,
            data,
        )
        .unwrap();
        let value = vector.get_decimal(0, 10, 2).unwrap();
        assert_eq!(value, Decimal::new(12345, 10, 2));
        assert_eq!(value.to_string(), "123.45");
        assert!(vector.is_null_at(1));
        assert_eq!(vector.get_decimal(1, 10, 2), None);
    }

    #[test]
    fn test_list_offset_math() {
        let child = i64_vector(&[Some(1), Some(2), Some(3), Some(4), Some(5)]);
        let vector = ColumnVector::list(
            3,
            ValidityBitmap::all_valid(),
            vec![0, 2, 2, 5],
            child,
        )
        .unwrap();
        assert_eq!(vector.get_array_len(0), 2);
        assert_eq!(vector.get_array_len(1), 0);
        assert_eq!(vector.get_array_offset(2), 2);
        assert_eq!(vector.get_array_len(2), 3);
        assert_eq!(
            vector.value_at(2),
            Value::List(vec![Value::Int64(3), Value::Int64(4), Value::Int64(5)])
        );
    }

    #[test]
    fn test_struct_positional_children() {
        let a = i64_vector(&[Some(10), Some(20)]);
        let offsets = vec![0, 1, 2];
        let b = ColumnVector::var_len(
            DataType::Utf8,
            2,
            ValidityBitmap::all_valid(),
            offsets,
            b"xy".to_vec(),
        )
        .unwrap();
        let vector = ColumnVector::struct_of(
            vec![
                Field::new("a", DataType::Int64),
                Field::new("b", DataType::Utf8),
            ],
            2,
            ValidityBitmap::all_valid(),
            vec![a, b],
        )
        .unwrap();
        assert_eq!(vector.children().len(), 2);
        assert_eq!(vector.child(0).unwrap().get_i64(1), 20);
        assert_eq!(
            vector.value_at(0),
            Value::Struct(vec![Value::Int64(10), Value::String("x".into())])
        );
    }

    #[test]
    fn test_struct_rejects_mismatched_child() {
        let a = i64_vector(&[Some(1)]);
        let result = ColumnVector::struct_of(
            vec![Field::new("a", DataType::Float64)],
            1,
            ValidityBitmap::all_valid(),
            vec![a],
        );
        assert!(matches!(result, Err(BridgeError::TypeError { .. })));
    }

    #[test]
    fn test_put_fails_with_capability_error() {
        let mut vector = i64_vector(&[Some(1)]);
        assert!(matches!(
            vector.put_i64(0, 2),
            Err(BridgeError::ReadOnlyVector(_))
        ));
        assert!(matches!(
            vector.put_null(0),
            Err(BridgeError::ReadOnlyVector(_))
        ));
        assert!(matches!(
            vector.reserve(1024),
            Err(BridgeError::ReadOnlyVector(_))
        ));
        // The failed puts must not have altered the stored data.
        assert_eq!(vector.get_i64(0), 1);
    }

    #[test]
    fn test_close_is_recursive_and_idempotent() {
        let child = i64_vector(&[Some(1), Some(2)]);
        let mut vector =
            ColumnVector::list(2, ValidityBitmap::all_valid(), vec![0, 1, 2], child).unwrap();
        vector.close();
        assert!(vector.children().is_empty());
        assert_eq!(vector.capacity(), 0);
        // Closing again is a no-op.
        vector.close();
    }
}
