use std::{any::TypeId, marker::PhantomData, mem};

use futures::future::LocalBoxFuture;

use dfview_abi::{read_int, read_uint};
use dfview_memory::MemView;
use dfview_types::{df_container_members, DfContainerKind, DfType, PrimitiveKind};

use crate::{FlagArray, ItemReader, ReadError, ReadSession, Readable, ReaderError, ReaderFactory};

/// A host scalar an integral cell can decode into.
pub trait FromScalar: Default + 'static {
    /// Convert the raw cell value. Narrower cells arrive sign- or
    /// zero-extended according to the schema type.
    fn from_scalar(raw: i64) -> Self;
}

macro_rules! from_scalar_int {
    ($($ty:ty),*) => {
        $(
            impl FromScalar for $ty {
                fn from_scalar(raw: i64) -> Self {
                    raw as $ty
                }
            }

            impl Readable for $ty {
                type Reader = IntReader<$ty>;
            }
        )*
    };
}

from_scalar_int!(u8, i8, u16, i16, u32, i32, u64, i64);

impl FromScalar for bool {
    fn from_scalar(raw: i64) -> Self {
        raw != 0
    }
}

impl Readable for bool {
    type Reader = IntReader<bool>;
}

/// Reader for integral and integral-like cells.
///
/// Accepts integral primitives, enums and bitfields through their base type,
/// and pointers when the host type is `u64` (the address is the value). The
/// host type must be at least as wide as the cell.
#[derive(Debug, Clone, Copy)]
pub struct IntReader<T> {
    size: usize,
    signed: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromScalar> ItemReader for IntReader<T> {
    type Output = T;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        let host_type = std::any::type_name::<T>();
        let kind = match ty {
            DfType::Primitive(kind) => *kind,
            DfType::Enum(parsed) => parsed.base,
            DfType::Bitfield(parsed) => parsed.base,
            DfType::Pointer(_) => {
                if TypeId::of::<T>() != TypeId::of::<u64>() {
                    return Err(ReaderError::type_mismatch(
                        "pointer requires a u64 host",
                        ty,
                        host_type,
                    ));
                }
                let size = factory.abi().pointer_size();
                return Ok(IntReader {
                    size,
                    signed: false,
                    _marker: PhantomData,
                });
            }
            other => return Err(ReaderError::type_mismatch("not an integral type", other, host_type)),
        };
        if !kind.is_integral() {
            return Err(ReaderError::type_mismatch("not an integral type", kind, host_type));
        }
        let size = factory.abi().primitive_info(kind).size;
        if size > mem::size_of::<T>() {
            return Err(ReaderError::StorageTooSmall {
                host: mem::size_of::<T>(),
                needed: size,
                host_type,
            });
        }
        Ok(IntReader {
            size,
            signed: kind.is_signed(),
            _marker: PhantomData,
        })
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read<'a>(
        &'a self,
        _session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let raw = if self.signed {
                read_int(view.data, self.size)?
            } else {
                read_uint(view.data, self.size)? as i64
            };
            *out = T::from_scalar(raw);
            Ok(())
        })
    }
}

/// Reader for bit vectors.
///
/// Accepts flag arrays (a bit buffer pointer plus a 32-bit count); the
/// `std::vector<bool>` representation is deliberately not decoded.
#[derive(Debug, Clone, Copy)]
pub struct FlagArrayReader {
    size: usize,
    data_offset: usize,
    len_offset: usize,
    implemented: bool,
}

impl ItemReader for FlagArrayReader {
    type Output = FlagArray;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        let host_type = std::any::type_name::<FlagArray>();
        match ty {
            DfType::Primitive(PrimitiveKind::DfFlagArray) => Ok(FlagArrayReader {
                size: factory.abi().primitive_info(PrimitiveKind::DfFlagArray).size,
                data_offset: 0,
                len_offset: factory.abi().pointer_size(),
                implemented: true,
            }),
            DfType::Primitive(PrimitiveKind::StdBitVector) => Ok(FlagArrayReader {
                size: factory.abi().primitive_info(PrimitiveKind::StdBitVector).size,
                data_offset: 0,
                len_offset: 0,
                implemented: false,
            }),
            DfType::DfContainer(container) if container.kind == DfContainerKind::FlagArray => {
                let layout = factory.layout().compound_layout(&container.header)?;
                Ok(FlagArrayReader {
                    size: factory.layout().type_info(ty)?.size,
                    data_offset: layout.member_offsets[df_container_members::FLAG_ARRAY_BITS],
                    len_offset: layout.member_offsets[df_container_members::FLAG_ARRAY_SIZE],
                    implemented: true,
                })
            }
            other => Err(ReaderError::type_mismatch(
                "not a bit vector type",
                other,
                host_type,
            )),
        }
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut FlagArray,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            if !self.implemented {
                return Err(ReadError::NotImplemented("stl-bit-vector contents"));
            }
            let abi = session.abi();
            let address = abi.get_pointer(&view.data[self.data_offset..])?;
            let len = read_uint(&view.data[self.len_offset..], 4)? as usize;
            if address == 0 || len == 0 {
                out.0.clear();
                return Ok(());
            }
            let bits = session.process().read(address, len).await?;
            out.0.clear();
            out.0.reserve(len * 8);
            for i in 0..len * 8 {
                out.0.push(bits[i / 8] & (1 << (i % 8)) != 0);
            }
            Ok(())
        })
    }
}

impl Readable for FlagArray {
    type Reader = FlagArrayReader;
}
