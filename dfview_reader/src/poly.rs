use std::{marker::PhantomData, rc::Rc};

use futures::future::LocalBoxFuture;
use once_cell::unsync::OnceCell;

use dfview_memory::MemView;
use dfview_types::DfType;

use crate::{
    structure::StructReader, ItemReader, ReadError, ReadSession, Readable, ReadableStruct,
    ReaderError, ReaderFactory,
};

/// What a polymorphic read does when the vtable address matches no
/// registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Log a warning and produce the base type, or null if the base is
    /// abstract.
    #[default]
    Warn,
    /// Silently produce null.
    Nullptr,
    /// Silently produce the base type.
    Base,
    /// Report an error.
    Error,
}

/// A polymorphic base host type: a closed sum over the base class and its
/// derived classes, chosen by vtable address.
pub trait PolyReadable: Readable {
    /// Describe the registry.
    fn poly_spec() -> PolySpec<Self>;
}

pub(crate) trait VariantRead<T> {
    fn read_new<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        address: u64,
    ) -> LocalBoxFuture<'a, Result<T, ReadError>>;
}

struct VariantReader<T, D: ReadableStruct> {
    reader: Rc<StructReader<D>>,
    wrap: fn(D) -> T,
}

impl<T, D: ReadableStruct> VariantRead<T> for VariantReader<T, D> {
    fn read_new<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        address: u64,
    ) -> LocalBoxFuture<'a, Result<T, ReadError>> {
        Box::pin(async move {
            let block = session.process().read(address, self.reader.size()).await?;
            let mut value = D::default();
            self.reader
                .read(session, MemView::new(address, &block), &mut value)
                .await?;
            Ok((self.wrap)(value))
        })
    }
}

pub(crate) struct PolyEntry<T> {
    pub(crate) vtable: Option<u64>,
    pub(crate) read: Option<Box<dyn VariantRead<T>>>,
}

type EntryCtor<T> = Box<dyn Fn(&ReaderFactory<'_>) -> Result<PolyEntry<T>, ReaderError>>;

/// The declarative registry a [PolyReadable] supplies.
///
/// The base class entry comes first: [PolySpec::base] for a concrete base,
/// [PolySpec::abstract_base] when the base can never be materialised.
pub struct PolySpec<T> {
    pub(crate) fallback: Fallback,
    pub(crate) base_is_abstract: bool,
    pub(crate) entries: Vec<EntryCtor<T>>,
}

impl<T: PolyReadable> PolySpec<T> {
    /// Start a registry with a concrete base class.
    pub fn base<B: ReadableStruct>(wrap: fn(B) -> T) -> Self {
        let mut spec = PolySpec {
            fallback: Fallback::Warn,
            base_is_abstract: false,
            entries: Vec::new(),
        };
        spec.entries.push(entry_ctor::<T, B>(Some(wrap)));
        spec
    }

    /// Start a registry whose base class is abstract.
    pub fn abstract_base<B: ReadableStruct>() -> Self {
        let mut spec = PolySpec {
            fallback: Fallback::Warn,
            base_is_abstract: true,
            entries: Vec::new(),
        };
        spec.entries.push(entry_ctor::<T, B>(None));
        spec
    }

    /// Register a derived class.
    pub fn variant<D: ReadableStruct>(mut self, wrap: fn(D) -> T) -> Self {
        self.entries.push(entry_ctor::<T, D>(Some(wrap)));
        self
    }

    /// Choose the unknown-vtable behaviour.
    pub fn fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }
}

fn entry_ctor<T: 'static, D: ReadableStruct>(wrap: Option<fn(D) -> T>) -> EntryCtor<T> {
    Box::new(move |factory| {
        let reader = factory.struct_reader::<D>()?;
        let symbol = reader.symbol().to_string();
        let vtable = factory.version().vtable_addresses.get(&symbol).copied();
        if vtable.is_none() && wrap.is_some() {
            log::warn!(
                "missing vtable for {} (local: {})",
                symbol,
                std::any::type_name::<D>()
            );
        }
        Ok(PolyEntry {
            vtable,
            read: wrap.map(|wrap| {
                Box::new(VariantReader { reader, wrap }) as Box<dyn VariantRead<T>>
            }),
        })
    })
}

/// The bound registry for a [PolyReadable], cached per base type by the
/// factory.
///
/// Reads the vtable pointer at offset 0 of the object, subtracts the
/// process base offset, and dispatches to the matching class reader.
pub struct PolyReader<T> {
    host_type: &'static str,
    fallback: Fallback,
    pub(crate) entries: OnceCell<Vec<PolyEntry<T>>>,
}

impl<T: PolyReadable> PolyReader<T> {
    pub(crate) fn empty(fallback: Fallback) -> Self {
        PolyReader {
            host_type: std::any::type_name::<T>(),
            fallback,
            entries: OnceCell::new(),
        }
    }

    /// Read the object at `address`, dispatching on its vtable.
    pub fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        address: u64,
    ) -> LocalBoxFuture<'a, Result<Option<Box<T>>, ReadError>> {
        Box::pin(async move {
            if address == 0 {
                return Ok(None);
            }
            let entries = self.entries.get().ok_or_else(|| {
                ReadError::Construction(format!("reader for {} used before binding", self.host_type))
            })?;
            let pointer_size = session.abi().pointer_size();
            let raw = session.process().read(address, pointer_size).await?;
            let vtable = session
                .abi()
                .get_pointer(&raw)?
                .wrapping_sub(session.process().base_offset() as u64);

            if let Some(entry) = entries.iter().find(|entry| entry.vtable == Some(vtable)) {
                return match &entry.read {
                    Some(read) => Ok(Some(Box::new(read.read_new(session, address).await?))),
                    None => Err(ReadError::AbstractType),
                };
            }

            let base = entries.first().and_then(|entry| entry.read.as_ref());
            match self.fallback {
                Fallback::Warn => {
                    log::warn!(
                        "unknown vtable address for {}: {:#x}",
                        self.host_type,
                        vtable
                    );
                    match base {
                        Some(read) => {
                            log::warn!("falling back to base type");
                            Ok(Some(Box::new(read.read_new(session, address).await?)))
                        }
                        None => {
                            log::warn!("falling back to null pointer");
                            Ok(None)
                        }
                    }
                }
                Fallback::Nullptr => Ok(None),
                Fallback::Base => match base {
                    Some(read) => Ok(Some(Box::new(read.read_new(session, address).await?))),
                    None => Err(ReadError::AbstractType),
                },
                Fallback::Error => Err(ReadError::CastError { vtable }),
            }
        })
    }
}

/// [ItemReader] stub for polymorphic base types.
///
/// Polymorphic objects are always materialised through pointers; reading one
/// by value is rejected at reader construction.
pub struct PolyItemReader<T>(PhantomData<fn() -> T>);

impl<T: PolyReadable> ItemReader for PolyItemReader<T> {
    type Output = T;

    fn new(_factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        Err(ReaderError::type_mismatch(
            "polymorphic type must be read through a pointer",
            ty,
            std::any::type_name::<T>(),
        ))
    }

    fn size(&self) -> usize {
        0
    }

    fn read<'a>(
        &'a self,
        _session: &'a ReadSession<'a>,
        _view: MemView<'a>,
        _out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async { Err(ReadError::AbstractType) })
    }
}
