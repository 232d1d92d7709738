use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive types.
///
/// Some complex types are considered primitive because they are treated as
/// opaque blobs whose only interesting property is their size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    /// `int8_t`
    Int8,
    /// `uint8_t`
    UInt8,
    /// `int16_t`
    Int16,
    /// `uint16_t`
    UInt16,
    /// `int32_t`
    Int32,
    /// `uint32_t`
    UInt32,
    /// `int64_t`
    Int64,
    /// `uint64_t`
    UInt64,
    /// `char`, the item type of static strings
    Char,
    /// `bool`
    Bool,
    /// `long`
    Long,
    /// `unsigned long`
    ULong,
    /// `size_t`
    SizeT,
    /// `float`
    SFloat,
    /// `double`
    DFloat,
    /// `const char *`
    PtrString,
    /// `std::string`
    StdString,
    /// `std::vector<bool>`
    StdBitVector,
    /// `std::fstream`
    StdFStream,
    /// `std::map<K, V>`
    StdMap,
    /// `std::unordered_map<K, V>`
    StdUnorderedMap,
    /// `std::mutex`
    StdMutex,
    /// `std::condition_variable`
    StdCondVar,
    /// `std::future<T>`
    StdFuture,
    /// `std::function<void()>`
    StdFunction,
    /// `std::filesystem::path`
    StdFsPath,
    /// `struct { uint8_t *bits; uint32_t size; }`
    DfFlagArray,
    /// `struct { T *data; uint16_t size; }`
    DfArray,
}

/// Every primitive kind, in declaration order.
pub const PRIMITIVE_KINDS: [PrimitiveKind; 28] = [
    PrimitiveKind::Int8,
    PrimitiveKind::UInt8,
    PrimitiveKind::Int16,
    PrimitiveKind::UInt16,
    PrimitiveKind::Int32,
    PrimitiveKind::UInt32,
    PrimitiveKind::Int64,
    PrimitiveKind::UInt64,
    PrimitiveKind::Char,
    PrimitiveKind::Bool,
    PrimitiveKind::Long,
    PrimitiveKind::ULong,
    PrimitiveKind::SizeT,
    PrimitiveKind::SFloat,
    PrimitiveKind::DFloat,
    PrimitiveKind::PtrString,
    PrimitiveKind::StdString,
    PrimitiveKind::StdBitVector,
    PrimitiveKind::StdFStream,
    PrimitiveKind::StdMap,
    PrimitiveKind::StdUnorderedMap,
    PrimitiveKind::StdMutex,
    PrimitiveKind::StdCondVar,
    PrimitiveKind::StdFuture,
    PrimitiveKind::StdFunction,
    PrimitiveKind::StdFsPath,
    PrimitiveKind::DfFlagArray,
    PrimitiveKind::DfArray,
];

impl PrimitiveKind {
    /// Find the primitive for an xml tag or `base-type` name.
    pub fn from_tag_name(name: &str) -> Option<PrimitiveKind> {
        Some(match name {
            "int8_t" => Self::Int8,
            "uint8_t" => Self::UInt8,
            "int16_t" => Self::Int16,
            "uint16_t" => Self::UInt16,
            "int32_t" => Self::Int32,
            "uint32_t" => Self::UInt32,
            "int64_t" => Self::Int64,
            "uint64_t" => Self::UInt64,
            "static-string" => Self::Char,
            "bool" => Self::Bool,
            "long" => Self::Long,
            "ulong" => Self::ULong,
            "size_t" => Self::SizeT,
            "s-float" => Self::SFloat,
            "d-float" => Self::DFloat,
            "ptr-string" => Self::PtrString,
            "stl-string" => Self::StdString,
            "stl-bit-vector" => Self::StdBitVector,
            "stl-fstream" => Self::StdFStream,
            "stl-map" => Self::StdMap,
            "stl-unordered-map" => Self::StdUnorderedMap,
            "stl-mutex" => Self::StdMutex,
            "stl-condition-variable" => Self::StdCondVar,
            "stl-future" => Self::StdFuture,
            "stl-function" => Self::StdFunction,
            "stl-fs-path" => Self::StdFsPath,
            "df-flagarray" => Self::DfFlagArray,
            "df-array" => Self::DfArray,
            _ => return None,
        })
    }

    /// The xml tag name for this primitive.
    pub fn tag_name(self) -> &'static str {
        match self {
            Self::Int8 => "int8_t",
            Self::UInt8 => "uint8_t",
            Self::Int16 => "int16_t",
            Self::UInt16 => "uint16_t",
            Self::Int32 => "int32_t",
            Self::UInt32 => "uint32_t",
            Self::Int64 => "int64_t",
            Self::UInt64 => "uint64_t",
            Self::Char => "static-string",
            Self::Bool => "bool",
            Self::Long => "long",
            Self::ULong => "ulong",
            Self::SizeT => "size_t",
            Self::SFloat => "s-float",
            Self::DFloat => "d-float",
            Self::PtrString => "ptr-string",
            Self::StdString => "stl-string",
            Self::StdBitVector => "stl-bit-vector",
            Self::StdFStream => "stl-fstream",
            Self::StdMap => "stl-map",
            Self::StdUnorderedMap => "stl-unordered-map",
            Self::StdMutex => "stl-mutex",
            Self::StdCondVar => "stl-condition-variable",
            Self::StdFuture => "stl-future",
            Self::StdFunction => "stl-function",
            Self::StdFsPath => "stl-fs-path",
            Self::DfFlagArray => "df-flagarray",
            Self::DfArray => "df-array",
        }
    }

    /// The size in bytes when it is the same on every ABI.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 | Self::Char | Self::Bool => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::SFloat => Some(4),
            Self::Int64 | Self::UInt64 | Self::DFloat => Some(8),
            _ => None,
        }
    }

    /// Return true for integer primitives, including `char` and `bool`.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Char
                | Self::Bool
                | Self::Long
                | Self::ULong
                | Self::SizeT
        )
    }

    /// Return true for signed integer primitives.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 | Self::Long
        )
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_round_trip() {
        for kind in PRIMITIVE_KINDS {
            assert_eq!(PrimitiveKind::from_tag_name(kind.tag_name()), Some(kind));
        }
    }

    #[test]
    fn signedness() {
        assert!(PrimitiveKind::Int32.is_signed());
        assert!(!PrimitiveKind::UInt32.is_signed());
        assert!(PrimitiveKind::Long.is_signed());
        assert!(!PrimitiveKind::SizeT.is_signed());
        assert!(!PrimitiveKind::StdString.is_integral());
    }
}
