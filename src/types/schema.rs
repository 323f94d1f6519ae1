//! Element type tags and batch schemas.

use serde::{Deserialize, Serialize};

/// Supported element types for columnar data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Fixed-precision decimal backed by a 128-bit unscaled integer.
    Decimal { precision: u8, scale: u8 },
    /// UTF-8 string.
    Utf8,
    /// Opaque binary.
    Binary,
    /// Variable-length list of a single element type.
    List(Box<DataType>),
    /// Ordered, positionally-addressed child fields.
    Struct(Vec<Field>),
}

impl DataType {
    /// Returns a short display name for the type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Int8 => "INT8",
            DataType::Int16 => "INT16",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Float32 => "FLOAT32",
            DataType::Float64 => "FLOAT64",
            DataType::Decimal { .. } => "DECIMAL",
            DataType::Utf8 => "STRING",
            DataType::Binary => "BINARY",
            DataType::List(_) => "LIST",
            DataType::Struct(_) => "STRUCT",
        }
    }

    /// Returns whether this type is stored in a single fixed-width buffer.
    #[must_use]
    pub fn is_fixed_width(&self) -> bool {
        self.byte_width().is_some()
    }

    /// Returns the per-value byte width for fixed-width types.
    #[must_use]
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::Int8 => Some(1),
            DataType::Int16 => Some(2),
            DataType::Int32 | DataType::Float32 => Some(4),
            DataType::Int64 | DataType::Float64 => Some(8),
            DataType::Decimal { .. } => Some(16),
            DataType::Utf8 | DataType::Binary | DataType::List(_) | DataType::Struct(_) => None,
        }
    }

    /// Returns whether values of this type use an offset buffer into a
    /// shared data buffer.
    #[must_use]
    pub fn is_var_len(&self) -> bool {
        matches!(self, DataType::Utf8 | DataType::Binary)
    }

    /// Returns whether this type nests child vectors.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        matches!(self, DataType::List(_) | DataType::Struct(_))
    }
}

/// A named, typed field in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Element type.
    pub data_type: DataType,
}

impl Field {
    /// Creates a new field.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Field {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered collection of fields describing one batch layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Creates a schema from an ordered field list.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Schema { fields }
    }

    /// Returns the field at the given position.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Returns all fields in order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the position of a field by name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns an iterator over the fields.
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Concatenates two schemas (original columns followed by computed).
    #[must_use]
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema { fields }
    }
}
