use serde::{Deserialize, Serialize};

use dfview_types::{PrimitiveKind, StdContainerKind};

use crate::{scalar, AbiError};

/// Size and alignment for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub align: usize,
}

impl TypeInfo {
    /// Shorthand constructor.
    pub const fn new(size: usize, align: usize) -> Self {
        TypeInfo { size, align }
    }
}

/// Platform architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arch {
    /// 32-bit x86.
    X86,
    /// 64-bit x86.
    Amd64,
}

/// Compiler family, deciding class layout rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compiler {
    /// GCC-compatible layout (Linux builds).
    Gnu,
    /// MSVC layout (Windows builds).
    Msvc,
}

/// The in-memory representation used for `std::string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringRepr {
    /// Pre-C++11 libstdc++ copy-on-write string: a single data pointer with
    /// a `{length, capacity, refcount}` header before the data.
    GnuCow,
    /// C++11 libstdc++ small-string string: `{pointer, length,
    /// union{inline[16], capacity}}`.
    GnuSso,
    /// MSVC string: `{union{inline[16], pointer}, length, capacity}`.
    Msvc,
}

/// The layout contract of one compiler on one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abi {
    /// The architecture.
    pub arch: Arch,
    /// The compiler family.
    pub compiler: Compiler,
    /// GNU only: the C++11 library ABI is in use.
    pub cxx11: bool,
}

/// Pre-C++11 ABI for GCC x86.
pub const GCC_32: Abi = Abi {
    arch: Arch::X86,
    compiler: Compiler::Gnu,
    cxx11: false,
};
/// Pre-C++11 ABI for GCC amd64.
pub const GCC_64: Abi = Abi {
    arch: Arch::Amd64,
    compiler: Compiler::Gnu,
    cxx11: false,
};
/// C++11 ABI for GCC x86.
pub const GCC_CXX11_32: Abi = Abi {
    arch: Arch::X86,
    compiler: Compiler::Gnu,
    cxx11: true,
};
/// C++11 ABI for GCC amd64.
pub const GCC_CXX11_64: Abi = Abi {
    arch: Arch::Amd64,
    compiler: Compiler::Gnu,
    cxx11: true,
};
/// MSVC 2015 (v140) ABI for x86.
pub const MSVC2015_32: Abi = Abi {
    arch: Arch::X86,
    compiler: Compiler::Msvc,
    cxx11: false,
};
/// MSVC 2015 (v140) ABI for amd64.
pub const MSVC2015_64: Abi = Abi {
    arch: Arch::Amd64,
    compiler: Compiler::Msvc,
    cxx11: false,
};

impl Abi {
    /// Pre-C++11 ABI for GCC x86.
    pub const GCC_32: Abi = GCC_32;
    /// Pre-C++11 ABI for GCC amd64.
    pub const GCC_64: Abi = GCC_64;
    /// C++11 ABI for GCC x86.
    pub const GCC_CXX11_32: Abi = GCC_CXX11_32;
    /// C++11 ABI for GCC amd64.
    pub const GCC_CXX11_64: Abi = GCC_CXX11_64;
    /// MSVC 2015 ABI for x86.
    pub const MSVC2015_32: Abi = MSVC2015_32;
    /// MSVC 2015 ABI for amd64.
    pub const MSVC2015_64: Abi = MSVC2015_64;

    /// Guess the ABI from a version name such as `v0.47.05 linux64`.
    pub fn from_version_name(name: &str) -> Result<Abi, AbiError> {
        let unsupported = || AbiError::UnsupportedVersion(name.to_string());

        let start = name.find("v0.").ok_or_else(unsupported)?;
        let rest = &name[start + 3..];
        let major_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if major_len == 0 {
            return Err(unsupported());
        }
        let major: u32 = rest[..major_len].parse().map_err(|_| unsupported())?;
        let rest = rest[major_len..].strip_prefix('.').ok_or_else(unsupported)?;
        let minor_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if minor_len == 0 {
            return Err(unsupported());
        }
        // Skip "<minor><extra>", everything up to the next space.
        let rest = match rest.find(' ') {
            Some(space) => &rest[space..],
            None => return Err(unsupported()),
        };
        let platform = rest
            .split_whitespace()
            .next()
            .ok_or_else(unsupported)?;

        match platform {
            "linux32" if major >= 50 => Ok(GCC_CXX11_32),
            "linux32" => Ok(GCC_32),
            "linux64" if major >= 50 => Ok(GCC_CXX11_64),
            "linux64" => Ok(GCC_64),
            "win32" => Ok(MSVC2015_32),
            "win64" => Ok(MSVC2015_64),
            _ => Err(unsupported()),
        }
    }

    /// Pointer size in bytes.
    pub fn pointer_size(&self) -> usize {
        match self.arch {
            Arch::X86 => 4,
            Arch::Amd64 => 8,
        }
    }

    /// Pointer type information.
    pub fn pointer(&self) -> TypeInfo {
        let p = self.pointer_size();
        TypeInfo::new(p, p)
    }

    /// The `std::string` representation for this ABI.
    pub fn string_repr(&self) -> StringRepr {
        match (self.compiler, self.cxx11) {
            (Compiler::Msvc, _) => StringRepr::Msvc,
            (Compiler::Gnu, true) => StringRepr::GnuSso,
            (Compiler::Gnu, false) => StringRepr::GnuCow,
        }
    }

    /// Size and alignment of a primitive type.
    pub fn primitive_info(&self, kind: PrimitiveKind) -> TypeInfo {
        use PrimitiveKind::*;
        let p = self.pointer_size();
        // Fixed-width integers align to their size, capped at pointer size
        // under GNU.
        let fixed = |size: usize| match self.compiler {
            Compiler::Gnu => TypeInfo::new(size, size.min(p)),
            Compiler::Msvc => TypeInfo::new(size, size),
        };
        match kind {
            Int8 | UInt8 | Char => fixed(1),
            Int16 | UInt16 => fixed(2),
            Int32 | UInt32 => fixed(4),
            Int64 | UInt64 => fixed(8),
            Bool => TypeInfo::new(1, 1),
            SFloat => TypeInfo::new(4, 4),
            SizeT | PtrString => TypeInfo::new(p, p),
            Long | ULong => match self.compiler {
                Compiler::Gnu => TypeInfo::new(p, p),
                Compiler::Msvc => TypeInfo::new(4, 4),
            },
            DFloat => match self.compiler {
                Compiler::Gnu => TypeInfo::new(8, p.min(8)),
                Compiler::Msvc => TypeInfo::new(8, 8),
            },
            StdString => match self.string_repr() {
                StringRepr::GnuCow => TypeInfo::new(p, p),
                StringRepr::GnuSso | StringRepr::Msvc => TypeInfo::new(2 * p + 16, p),
            },
            StdBitVector => match self.compiler {
                Compiler::Gnu => TypeInfo::new(5 * p, p),
                Compiler::Msvc => TypeInfo::new(4 * p, p),
            },
            StdFStream => match self.compiler {
                Compiler::Gnu => TypeInfo::new(61 * p + 40, p),
                Compiler::Msvc => TypeInfo::new(22 * p + 104, 8),
            },
            StdMutex => match self.compiler {
                Compiler::Gnu => TypeInfo::new(4 * p + 8, p),
                Compiler::Msvc => TypeInfo::new(8 * p + 16, p),
            },
            StdCondVar => match self.compiler {
                Compiler::Gnu => TypeInfo::new(48, p),
                Compiler::Msvc => TypeInfo::new(8 * p + 8, p),
            },
            StdFunction => match self.compiler {
                Compiler::Gnu => TypeInfo::new(4 * p, p),
                Compiler::Msvc => TypeInfo::new(6 * p + 16, 8),
            },
            StdFsPath => match self.compiler {
                Compiler::Gnu => TypeInfo::new(3 * p + 16, p),
                Compiler::Msvc => TypeInfo::new(2 * p + 16, p),
            },
            // Parameter-independent container blobs share the container
            // table entries.
            StdMap => self.fixed_container_info(StdContainerKind::Map),
            StdUnorderedMap => self.fixed_container_info(StdContainerKind::UnorderedMap),
            StdFuture => self.fixed_container_info(StdContainerKind::Future),
            // Engine blobs: pointer plus a 32/16 bit count, padded out.
            DfFlagArray => TypeInfo::new(align_up(p + 4, p), p),
            DfArray => TypeInfo::new(align_up(p + 2, p), p),
        }
    }

    /// Size and alignment of a container whose footprint does not depend on
    /// its type parameters.
    ///
    /// Returns None for [StdContainerKind::Optional] and
    /// [StdContainerKind::Variant]; use [Abi::parametric_container_info] for
    /// those.
    pub fn std_container_info(&self, kind: StdContainerKind) -> Option<TypeInfo> {
        if kind.requires_complete_params() {
            None
        } else {
            Some(self.fixed_container_info(kind))
        }
    }

    fn fixed_container_info(&self, kind: StdContainerKind) -> TypeInfo {
        use StdContainerKind::*;
        let p = self.pointer_size();
        match (kind, self.compiler) {
            (SharedPtr, _) | (WeakPtr, _) | (Future, _) => TypeInfo::new(2 * p, p),
            (Vector, _) => TypeInfo::new(3 * p, p),
            (Deque, Compiler::Gnu) => {
                if self.cxx11 {
                    TypeInfo::new(10 * p, p)
                } else {
                    TypeInfo::new(3 * p, p)
                }
            }
            (Deque, Compiler::Msvc) => TypeInfo::new(5 * p, p),
            (Set, Compiler::Gnu) | (Map, Compiler::Gnu) => TypeInfo::new(6 * p, p),
            (Set, Compiler::Msvc) | (Map, Compiler::Msvc) => TypeInfo::new(2 * p, p),
            (UnorderedMap, Compiler::Gnu) => TypeInfo::new(7 * p, p),
            (UnorderedMap, Compiler::Msvc) => TypeInfo::new(8 * p, p),
            (Optional, _) | (Variant, _) => {
                // Callers go through std_container_info, which filters these.
                TypeInfo::new(0, 1)
            }
        }
    }

    /// Size and alignment of a container computed from the infos of its
    /// complete parameter types.
    ///
    /// Returns None if the parameter count does not fit the container kind.
    pub fn parametric_container_info(
        &self,
        kind: StdContainerKind,
        params: &[TypeInfo],
    ) -> Option<TypeInfo> {
        match kind {
            StdContainerKind::Optional => match params {
                [item] => Some(TypeInfo::new(item.align + item.size, item.align)),
                _ => None,
            },
            StdContainerKind::Variant => {
                if params.is_empty() {
                    return None;
                }
                let size = params.iter().map(|info| info.size).max()?;
                let align = params.iter().map(|info| info.align).max()?;
                Some(TypeInfo::new(align + size, align))
            }
            _ => None,
        }
    }

    /// Decode a pointer cell.
    pub fn get_pointer(&self, data: &[u8]) -> Result<u64, AbiError> {
        scalar::read_uint(data, self.pointer_size())
    }
}

/// Round `offset` up to a multiple of `align`.
pub(crate) fn align_up(offset: usize, align: usize) -> usize {
    if align <= 1 {
        offset
    } else {
        (offset + align - 1) / align * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_name_selection() {
        assert_eq!(Abi::from_version_name("v0.47.05 linux64").unwrap(), GCC_64);
        assert_eq!(Abi::from_version_name("v0.50.11 linux64").unwrap(), GCC_CXX11_64);
        assert_eq!(Abi::from_version_name("v0.47.05 linux32").unwrap(), GCC_32);
        assert_eq!(Abi::from_version_name("v0.51.01-beta1 linux32").unwrap(), GCC_CXX11_32);
        assert_eq!(Abi::from_version_name("v0.44.12 win64").unwrap(), MSVC2015_64);
        assert_eq!(Abi::from_version_name("v0.44.12 win32 sdl").unwrap(), MSVC2015_32);
        assert!(Abi::from_version_name("v0.47.05 osx64").is_err());
        assert!(Abi::from_version_name("nonsense").is_err());
    }

    #[test]
    fn integer_alignment_caps() {
        assert_eq!(GCC_32.primitive_info(PrimitiveKind::Int64), TypeInfo::new(8, 4));
        assert_eq!(GCC_64.primitive_info(PrimitiveKind::Int64), TypeInfo::new(8, 8));
        assert_eq!(MSVC2015_32.primitive_info(PrimitiveKind::Int64), TypeInfo::new(8, 8));
        assert_eq!(GCC_32.primitive_info(PrimitiveKind::DFloat), TypeInfo::new(8, 4));
        assert_eq!(MSVC2015_32.primitive_info(PrimitiveKind::DFloat), TypeInfo::new(8, 8));
    }

    #[test]
    fn long_and_size_t() {
        assert_eq!(GCC_64.primitive_info(PrimitiveKind::Long), TypeInfo::new(8, 8));
        assert_eq!(MSVC2015_64.primitive_info(PrimitiveKind::Long), TypeInfo::new(4, 4));
        assert_eq!(MSVC2015_64.primitive_info(PrimitiveKind::SizeT), TypeInfo::new(8, 8));
    }

    #[test]
    fn string_sizes() {
        assert_eq!(GCC_64.primitive_info(PrimitiveKind::StdString), TypeInfo::new(8, 8));
        assert_eq!(
            GCC_CXX11_64.primitive_info(PrimitiveKind::StdString),
            TypeInfo::new(32, 8)
        );
        assert_eq!(
            MSVC2015_64.primitive_info(PrimitiveKind::StdString),
            TypeInfo::new(32, 8)
        );
        assert_eq!(
            MSVC2015_32.primitive_info(PrimitiveKind::StdString),
            TypeInfo::new(24, 4)
        );
    }

    #[test]
    fn container_table() {
        assert_eq!(
            GCC_64.std_container_info(StdContainerKind::Vector).unwrap(),
            TypeInfo::new(24, 8)
        );
        assert_eq!(
            GCC_CXX11_64.std_container_info(StdContainerKind::Deque).unwrap(),
            TypeInfo::new(80, 8)
        );
        assert_eq!(
            MSVC2015_64.std_container_info(StdContainerKind::Map).unwrap(),
            TypeInfo::new(16, 8)
        );
        assert!(GCC_64.std_container_info(StdContainerKind::Optional).is_none());
    }

    #[test]
    fn parametric_containers() {
        let int32 = TypeInfo::new(4, 4);
        let int64 = TypeInfo::new(8, 8);
        assert_eq!(
            GCC_64.parametric_container_info(StdContainerKind::Optional, &[int32]),
            Some(TypeInfo::new(8, 4))
        );
        assert_eq!(
            GCC_64.parametric_container_info(StdContainerKind::Variant, &[int32, int64]),
            Some(TypeInfo::new(16, 8))
        );
        assert_eq!(
            GCC_64.parametric_container_info(StdContainerKind::Variant, &[]),
            None
        );
        assert_eq!(
            GCC_64.parametric_container_info(StdContainerKind::Vector, &[int32]),
            None
        );
    }
}
