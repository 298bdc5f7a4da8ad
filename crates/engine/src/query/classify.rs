//! Column type classification.
//!
//! Maps a schema's native column types onto the three classes that decide
//! comparison semantics for filters.

use serde::{Deserialize, Serialize};

use crate::schema::NativeType;

/// Comparison class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    String,
    Number,
    Date,
}

/// Classify a native column type. Unlisted types are treated as strings.
pub fn classify(data_type: &NativeType) -> Classification {
    match data_type {
        NativeType::Time | NativeType::Date | NativeType::DateOnly => Classification::Date,

        NativeType::Json
        | NativeType::Jsonb
        | NativeType::Text
        | NativeType::String
        | NativeType::Char
        | NativeType::Citext
        | NativeType::Uuid
        | NativeType::UuidV1
        | NativeType::UuidV4 => Classification::String,

        NativeType::Real
        | NativeType::Integer
        | NativeType::Float
        | NativeType::BigInt
        | NativeType::Decimal
        | NativeType::Double
        | NativeType::MediumInt
        | NativeType::Number
        | NativeType::SmallInt
        | NativeType::TinyInt => Classification::Number,

        NativeType::Boolean | NativeType::Enum | NativeType::Blob | NativeType::Other(_) => {
            Classification::String
        }
    }
}
