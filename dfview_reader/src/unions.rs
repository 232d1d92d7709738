use std::rc::Rc;

use futures::future::LocalBoxFuture;
use once_cell::unsync::OnceCell;

use dfview_abi::TypeInfo;
use dfview_memory::MemView;
use dfview_path::PathItem;
use dfview_types::{CompoundType, DfType};

use crate::{
    DiscriminatedReader, ItemReader, ReadError, ReadSession, Readable, ReaderError, ReaderFactory,
};

/// A host sum type bound to a schema union.
///
/// Alternatives are declared in the union's member order; reading takes a
/// discriminator selecting the alternative, `-1` reads nothing.
pub trait ReadableUnion: Default + 'static {
    /// Describe the binding.
    fn spec() -> UnionSpec<Self>;
}

pub(crate) trait AltRead<T> {
    fn read_new<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
    ) -> LocalBoxFuture<'a, Result<T, ReadError>>;
}

struct AltReader<T, F: Readable> {
    reader: F::Reader,
    wrap: fn(F) -> T,
}

impl<T, F: Readable> AltRead<T> for AltReader<T, F> {
    fn read_new<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
    ) -> LocalBoxFuture<'a, Result<T, ReadError>> {
        Box::pin(async move {
            let alt_view = view.subview(0, self.reader.size());
            let mut value = F::default();
            self.reader.read(session, alt_view, &mut value).await?;
            Ok((self.wrap)(value))
        })
    }
}

type AltCtor<T> = Box<dyn Fn(&ReaderFactory<'_>, &DfType) -> Result<Box<dyn AltRead<T>>, ReaderError>>;

/// The declarative description a [ReadableUnion] supplies.
pub struct UnionSpec<T> {
    pub(crate) type_path: Vec<PathItem>,
    pub(crate) alts: Vec<AltCtor<T>>,
}

impl<T: 'static> UnionSpec<T> {
    /// Bind to the union compound found at `type_path` in the schema.
    pub fn new(type_path: impl Into<Vec<PathItem>>) -> Self {
        UnionSpec {
            type_path: type_path.into(),
            alts: Vec::new(),
        }
    }

    /// Declare the next alternative, wrapped into the host sum with `wrap`.
    pub fn alt<F: Readable>(mut self, wrap: fn(F) -> T) -> Self {
        self.alts.push(Box::new(move |factory, member_ty| {
            let reader = F::Reader::new(factory, member_ty)?;
            Ok(Box::new(AltReader { reader, wrap }) as Box<dyn AltRead<T>>)
        }));
        self
    }
}

/// The bound reader for a [ReadableUnion], cached per host type by the
/// factory.
pub struct UnionReader<T> {
    host_type: &'static str,
    compound_key: usize,
    info: TypeInfo,
    pub(crate) alts: OnceCell<Vec<Box<dyn AltRead<T>>>>,
}

impl<T: ReadableUnion> UnionReader<T> {
    /// The size of the bound union.
    pub fn size(&self) -> usize {
        self.info.size
    }

    pub(crate) fn matches(&self, compound: &CompoundType) -> bool {
        self.compound_key == compound as *const CompoundType as usize
    }

    /// Decode the alternative selected by `disc` into `out`; `-1` leaves
    /// `out` untouched.
    pub fn read_with<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
        disc: i64,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            if disc == -1 {
                return Ok(());
            }
            let alts = self.alts.get().ok_or_else(|| {
                ReadError::Construction(format!("reader for {} used before binding", self.host_type))
            })?;
            let alt = usize::try_from(disc)
                .ok()
                .and_then(|index| alts.get(index))
                .ok_or(ReadError::InvalidDiscriminator {
                    value: disc,
                    count: alts.len(),
                })?;
            *out = alt.read_new(session, view).await?;
            Ok(())
        })
    }
}

pub(crate) fn new_union_reader<T: ReadableUnion>(
    spec: &UnionSpec<T>,
    compound: &CompoundType,
    info: TypeInfo,
) -> UnionReader<T> {
    UnionReader {
        host_type: std::any::type_name::<T>(),
        compound_key: compound as *const CompoundType as usize,
        info,
        alts: OnceCell::new(),
    }
}

/// [ItemReader] for host sums bound to unions.
///
/// A union can only be read with a discriminator, so the plain read path
/// reports an error; bind these fields with
/// [StructSpec::field_with](crate::StructSpec::field_with).
pub struct UnionItemReader<T: ReadableUnion> {
    reader: Rc<UnionReader<T>>,
}

impl<T: ReadableUnion> ItemReader for UnionItemReader<T> {
    type Output = T;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        let reader = factory.union_reader::<T>()?;
        match ty {
            DfType::Compound(compound) if reader.matches(compound) => {
                Ok(UnionItemReader { reader })
            }
            other => Err(ReaderError::type_mismatch(
                "invalid type",
                other,
                std::any::type_name::<T>(),
            )),
        }
    }

    fn size(&self) -> usize {
        self.reader.size()
    }

    fn read<'a>(
        &'a self,
        _session: &'a ReadSession<'a>,
        _view: MemView<'a>,
        _out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async {
            Err(ReadError::NotImplemented(
                "reading a union needs a discriminator",
            ))
        })
    }
}

impl<T: ReadableUnion> DiscriminatedReader for UnionItemReader<T> {
    type Discriminator = i64;

    fn read_with<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
        disc: i64,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        self.reader.read_with(session, view, out, disc)
    }
}
