use std::rc::Rc;

use futures::future::LocalBoxFuture;

use dfview_memory::MemView;
use dfview_types::DfType;

use crate::{
    poly::{PolyReadable, PolyReader},
    ItemReader, ReadError, ReadSession, Readable, ReaderError, ReaderFactory,
};

/// Materialises the object a pointer cell points at.
pub trait PointeeRead<T> {
    /// Read the pointee at `address` into a fresh allocation.
    ///
    /// A null address yields None; so can a polymorphic fallback.
    fn read_box<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        address: u64,
    ) -> LocalBoxFuture<'a, Result<Option<Box<T>>, ReadError>>;
}

/// [PointeeRead] for non-polymorphic pointees: one item reader, one cell.
pub struct StaticPointeeReader<T: Readable> {
    item_size: usize,
    reader: T::Reader,
}

impl<T: Readable> StaticPointeeReader<T> {
    /// Build from the pointer type `pointer_ty`.
    pub fn new(factory: &ReaderFactory<'_>, pointer_ty: &DfType) -> Result<Self, ReaderError> {
        let host_type = std::any::type_name::<T>();
        let pointer = match pointer_ty {
            DfType::Pointer(pointer) => pointer,
            other => return Err(ReaderError::type_mismatch("not a pointer", other, host_type)),
        };
        let item_ref = pointer.item.as_ref().ok_or_else(|| {
            ReaderError::type_mismatch("pointer without item type", pointer_ty, host_type)
        })?;
        let item_ty = factory.schema().resolve(item_ref)?;
        Ok(StaticPointeeReader {
            item_size: factory.layout().type_info(item_ty)?.size,
            reader: T::Reader::new(factory, item_ty)?,
        })
    }
}

impl<T: Readable> PointeeRead<T> for StaticPointeeReader<T> {
    fn read_box<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        address: u64,
    ) -> LocalBoxFuture<'a, Result<Option<Box<T>>, ReadError>> {
        Box::pin(async move {
            if address == 0 {
                return Ok(None);
            }
            let block = session.process().read(address, self.item_size).await?;
            let mut value = T::default();
            self.reader
                .read(session, MemView::new(address, &block), &mut value)
                .await?;
            Ok(Some(Box::new(value)))
        })
    }
}

struct PolyPointeeReader<T: PolyReadable> {
    reader: Rc<PolyReader<T>>,
}

impl<T: PolyReadable> PointeeRead<T> for PolyPointeeReader<T> {
    fn read_box<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        address: u64,
    ) -> LocalBoxFuture<'a, Result<Option<Box<T>>, ReadError>> {
        self.reader.read(session, address)
    }
}

/// Build the vtable-dispatching pointee reader for a polymorphic base type.
///
/// Use from [Readable::make_pointee_reader]:
///
/// ```ignore
/// impl Readable for ItemDef {
///     type Reader = PolyItemReader<Self>;
///     fn make_pointee_reader(
///         factory: &ReaderFactory<'_>,
///         pointer_ty: &DfType,
///     ) -> Result<Rc<dyn PointeeRead<Self>>, ReaderError> {
///         poly_pointee_reader::<Self>(factory, pointer_ty)
///     }
/// }
/// ```
pub fn poly_pointee_reader<T: PolyReadable>(
    factory: &ReaderFactory<'_>,
    pointer_ty: &DfType,
) -> Result<Rc<dyn PointeeRead<T>>, ReaderError> {
    match pointer_ty {
        DfType::Pointer(_) => Ok(Rc::new(PolyPointeeReader {
            reader: factory.poly_reader::<T>()?,
        })),
        other => Err(ReaderError::type_mismatch(
            "not a pointer",
            other,
            std::any::type_name::<T>(),
        )),
    }
}

/// Reader for owning pointers, producing `Option<Box<T>>`.
pub struct BoxReader<T: Readable> {
    pointer_size: usize,
    pointee: Rc<dyn PointeeRead<T>>,
}

impl<T: Readable> ItemReader for BoxReader<T> {
    type Output = Option<Box<T>>;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        Ok(BoxReader {
            pointer_size: factory.abi().pointer_size(),
            pointee: T::make_pointee_reader(factory, ty)?,
        })
    }

    fn size(&self) -> usize {
        self.pointer_size
    }

    fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut Option<Box<T>>,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let address = session.abi().get_pointer(view.data)?;
            *out = if address == 0 {
                None
            } else {
                self.pointee.read_box(session, address).await?
            };
            Ok(())
        })
    }
}

impl<T: Readable> Readable for Option<Box<T>> {
    type Reader = BoxReader<T>;
}

/// Reader for shared pointers, producing `Option<Rc<T>>`.
///
/// Reads of the same address within one session hand out the same `Rc`;
/// the first read materialises the object, concurrent reads await it.
pub struct RcReader<T: Readable> {
    pointer_size: usize,
    pointee: Rc<dyn PointeeRead<T>>,
}

impl<T: Readable> ItemReader for RcReader<T> {
    type Output = Option<Rc<T>>;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        Ok(RcReader {
            pointer_size: factory.abi().pointer_size(),
            pointee: T::make_pointee_reader(factory, ty)?,
        })
    }

    fn size(&self) -> usize {
        self.pointer_size
    }

    fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut Option<Rc<T>>,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let address = session.abi().get_pointer(view.data)?;
            *out = if address == 0 {
                None
            } else {
                session
                    .shared_object::<T>(address, Rc::clone(&self.pointee))
                    .await?
            };
            Ok(())
        })
    }
}

impl<T: Readable> Readable for Option<Rc<T>> {
    type Reader = RcReader<T>;
}
