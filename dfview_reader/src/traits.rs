use std::rc::Rc;

use futures::future::LocalBoxFuture;

use dfview_memory::MemView;
use dfview_types::DfType;

use crate::{
    pointers::{PointeeRead, StaticPointeeReader},
    ReadError, ReadSession, ReaderError, ReaderFactory,
};

/// Decodes one cell of target memory into one host value.
///
/// Readers are built against a schema type and may reject it; once built,
/// [ItemReader::size] says how many bytes the cell occupies and
/// [ItemReader::read] decodes a view of that size, issuing follow-up reads
/// through the session where the type points elsewhere.
pub trait ItemReader: Sized + 'static {
    /// The host type produced by this reader.
    type Output;

    /// Build a reader for the schema type `ty`.
    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError>;

    /// Bytes consumed in the target memory.
    fn size(&self) -> usize;

    /// Decode `view` into `out`.
    fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut Self::Output,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>>;
}

/// An [ItemReader] that needs a discriminator supplied by an upstream
/// reader, as unions and variants do.
pub trait DiscriminatedReader: ItemReader {
    /// The discriminator: an alternative index, or one index per item for
    /// containers of discriminated values.
    type Discriminator: 'static;

    /// Decode `view` into `out`, selecting alternatives with `disc`.
    fn read_with<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut Self::Output,
        disc: Self::Discriminator,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>>;
}

/// A host type that can be read from target memory.
pub trait Readable: Default + 'static {
    /// The reader for this type.
    type Reader: ItemReader<Output = Self>;

    /// Build the reader that materialises this type behind a pointer.
    ///
    /// The default reads the pointee with [Self::Reader]; polymorphic base
    /// types override this to dispatch on the object's vtable.
    fn make_pointee_reader(
        factory: &ReaderFactory<'_>,
        pointer_ty: &DfType,
    ) -> Result<Rc<dyn PointeeRead<Self>>, ReaderError> {
        Ok(Rc::new(StaticPointeeReader::<Self>::new(factory, pointer_ty)?))
    }
}
