//! Compiler ABIs for Dwarf Fortress builds.
//!
//! An [Abi] captures the layout contract of one compiler on one
//! architecture: the size and alignment of every primitive and container
//! type, how pointers are decoded, and the exact representation of
//! `std::string` and `std::vector` headers. Six canonical ABIs cover the
//! shipped builds of the game; [Abi::from_version_name] picks one from a
//! version record's name.

pub use abi::{
    Abi, Arch, Compiler, StringRepr, TypeInfo, GCC_32, GCC_64, GCC_CXX11_32, GCC_CXX11_64,
    MSVC2015_32, MSVC2015_64,
};
pub use error::AbiError;
pub use scalar::{read_int, read_uint};
pub use vector::VectorInfo;

mod abi;
mod error;
mod scalar;
mod string;
mod vector;
