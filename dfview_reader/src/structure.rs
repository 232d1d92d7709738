use std::rc::Rc;

use futures::future::{self, LocalBoxFuture};
use once_cell::unsync::OnceCell;

use dfview_abi::TypeInfo;
use dfview_memory::MemView;
use dfview_path::{DisplayPath, PathItem};
use dfview_types::{CompoundType, DfType};

use crate::{
    DiscriminatedReader, ItemReader, ReadError, ReadSession, Readable, ReaderError, ReaderFactory,
};

/// A host struct bound to a schema compound.
///
/// The binding lists, per host field, the schema path of the member it holds
/// and how to reach the field in the host value; the factory resolves each
/// path to an offset and a child reader when the struct reader is built.
pub trait ReadableStruct: Default + 'static {
    /// Describe the binding.
    fn spec() -> StructSpec<Self>;
}

/// Deferred assignment of one decoded field into the host value.
pub(crate) type Apply<T> = Box<dyn FnOnce(&mut T)>;

pub(crate) trait FieldRead<T> {
    fn label(&self) -> &str;

    /// Decode straight into the host value; used by sequenced readers so a
    /// later field can depend on an earlier one.
    fn read_in_place<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>>;

    /// Decode aside and return the assignment, so unsequenced readers can
    /// fan out all fields concurrently.
    fn read_detached<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        current: &'a T,
    ) -> LocalBoxFuture<'a, Result<Apply<T>, ReadError>>;
}

type FieldCtor<T> =
    Box<dyn Fn(&ReaderFactory<'_>, &CompoundType) -> Result<Box<dyn FieldRead<T>>, ReaderError>>;

/// The declarative description a [ReadableStruct] supplies.
pub struct StructSpec<T> {
    pub(crate) type_path: Vec<PathItem>,
    pub(crate) sequenced: bool,
    pub(crate) fields: Vec<(String, FieldCtor<T>)>,
}

impl<T: 'static> StructSpec<T> {
    /// Bind to the compound found at `type_path` in the schema.
    ///
    /// Fields read concurrently; use [StructSpec::sequenced] when one
    /// field's discriminator depends on another being decoded first.
    pub fn new(type_path: impl Into<Vec<PathItem>>) -> Self {
        StructSpec {
            type_path: type_path.into(),
            sequenced: false,
            fields: Vec::new(),
        }
    }

    /// Read fields strictly in declaration order.
    pub fn sequenced(mut self) -> Self {
        self.sequenced = true;
        self
    }

    /// Bind the member at `path` to the host field reached by `access`.
    pub fn field<F: Readable>(
        mut self,
        path: impl Into<Vec<PathItem>>,
        access: fn(&mut T) -> &mut F,
    ) -> Self {
        let path: Vec<PathItem> = path.into();
        let label = DisplayPath(&path).to_string();
        let field_label = label.clone();
        self.fields.push((
            label,
            Box::new(move |factory, compound| {
                let (ty, offset) =
                    factory.layout().offset_of(factory.schema(), compound, &path)?;
                let reader = F::Reader::new(factory, ty)?;
                Ok(Box::new(FieldBinding {
                    label: field_label.clone(),
                    offset,
                    reader,
                    access,
                }) as Box<dyn FieldRead<T>>)
            }),
        ));
        self
    }

    /// Bind a discriminated member; `disc` computes the discriminator from
    /// the partially read host value.
    pub fn field_with<F, D>(
        mut self,
        path: impl Into<Vec<PathItem>>,
        access: fn(&mut T) -> &mut F,
        disc: fn(&T) -> D,
    ) -> Self
    where
        F: Readable,
        F::Reader: DiscriminatedReader<Discriminator = D>,
        D: 'static,
    {
        let path: Vec<PathItem> = path.into();
        let label = DisplayPath(&path).to_string();
        let field_label = label.clone();
        self.fields.push((
            label,
            Box::new(move |factory, compound| {
                let (ty, offset) =
                    factory.layout().offset_of(factory.schema(), compound, &path)?;
                let reader = F::Reader::new(factory, ty)?;
                Ok(Box::new(DiscFieldBinding {
                    label: field_label.clone(),
                    offset,
                    reader,
                    access,
                    disc,
                }) as Box<dyn FieldRead<T>>)
            }),
        ));
        self
    }

    /// Run the parent type's reader on the same cell.
    pub fn base<P: ReadableStruct>(mut self, access: fn(&mut T) -> &mut P) -> Self {
        self.fields.push((
            "<base>".to_string(),
            Box::new(move |factory, compound| {
                let reader = factory.struct_reader::<P>()?;
                let mut ancestor = compound.parent.clone();
                let mut is_base = false;
                while let Some(name) = ancestor {
                    match factory.schema().find_compound(&name) {
                        Some(parent) => {
                            if reader.matches(parent) {
                                is_base = true;
                                break;
                            }
                            ancestor = parent.parent.clone();
                        }
                        None => break,
                    }
                }
                if !is_base {
                    return Err(ReaderError::type_mismatch(
                        format!("{} is not a base of {}", reader.type_label(), compound.debug_name),
                        compound.debug_name.clone(),
                        std::any::type_name::<P>(),
                    ));
                }
                Ok(Box::new(BaseBinding { reader, access }) as Box<dyn FieldRead<T>>)
            }),
        ));
        self
    }

    /// Record the raw vtable pointer in the host field reached by `access`.
    pub fn vtable(mut self, access: fn(&mut T) -> &mut u64) -> Self {
        self.fields.push((
            "<vtable>".to_string(),
            Box::new(move |_factory, compound| {
                if !compound.vtable {
                    return Err(ReaderError::type_mismatch(
                        format!("compound {} does not have a vtable", compound.debug_name),
                        compound.debug_name.clone(),
                        std::any::type_name::<T>(),
                    ));
                }
                Ok(Box::new(VTableBinding { access }) as Box<dyn FieldRead<T>>)
            }),
        ));
        self
    }
}

struct FieldBinding<T, F: Readable> {
    label: String,
    offset: usize,
    reader: F::Reader,
    access: fn(&mut T) -> &mut F,
}

impl<T: 'static, F: Readable> FieldRead<T> for FieldBinding<T, F> {
    fn label(&self) -> &str {
        &self.label
    }

    fn read_in_place<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        let field_view = view.subview(self.offset, self.reader.size());
        self.reader.read(session, field_view, (self.access)(out))
    }

    fn read_detached<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        _current: &'a T,
    ) -> LocalBoxFuture<'a, Result<Apply<T>, ReadError>> {
        Box::pin(async move {
            let field_view = view.subview(self.offset, self.reader.size());
            let mut value = F::default();
            self.reader.read(session, field_view, &mut value).await?;
            let access = self.access;
            Ok(Box::new(move |out: &mut T| *access(out) = value) as Apply<T>)
        })
    }
}

struct DiscFieldBinding<T, F, D>
where
    F: Readable,
    F::Reader: DiscriminatedReader<Discriminator = D>,
{
    label: String,
    offset: usize,
    reader: F::Reader,
    access: fn(&mut T) -> &mut F,
    disc: fn(&T) -> D,
}

impl<T: 'static, F, D> FieldRead<T> for DiscFieldBinding<T, F, D>
where
    F: Readable,
    F::Reader: DiscriminatedReader<Discriminator = D>,
    D: 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn read_in_place<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        let disc = (self.disc)(out);
        let field_view = view.subview(self.offset, self.reader.size());
        self.reader
            .read_with(session, field_view, (self.access)(out), disc)
    }

    fn read_detached<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        current: &'a T,
    ) -> LocalBoxFuture<'a, Result<Apply<T>, ReadError>> {
        Box::pin(async move {
            let disc = (self.disc)(current);
            let field_view = view.subview(self.offset, self.reader.size());
            let mut value = F::default();
            self.reader
                .read_with(session, field_view, &mut value, disc)
                .await?;
            let access = self.access;
            Ok(Box::new(move |out: &mut T| *access(out) = value) as Apply<T>)
        })
    }
}

struct BaseBinding<T, P: ReadableStruct> {
    reader: Rc<StructReader<P>>,
    access: fn(&mut T) -> &mut P,
}

impl<T: 'static, P: ReadableStruct> FieldRead<T> for BaseBinding<T, P> {
    fn label(&self) -> &str {
        "<base>"
    }

    fn read_in_place<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        // The base reads the same cell from offset 0.
        self.reader.read(session, view, (self.access)(out))
    }

    fn read_detached<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        _current: &'a T,
    ) -> LocalBoxFuture<'a, Result<Apply<T>, ReadError>> {
        Box::pin(async move {
            let mut value = P::default();
            self.reader.read(session, view, &mut value).await?;
            let access = self.access;
            Ok(Box::new(move |out: &mut T| *access(out) = value) as Apply<T>)
        })
    }
}

struct VTableBinding<T> {
    access: fn(&mut T) -> &mut u64,
}

impl<T: 'static> FieldRead<T> for VTableBinding<T> {
    fn label(&self) -> &str {
        "<vtable>"
    }

    fn read_in_place<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            *(self.access)(out) = session.abi().get_pointer(view.data)?;
            Ok(())
        })
    }

    fn read_detached<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        _current: &'a T,
    ) -> LocalBoxFuture<'a, Result<Apply<T>, ReadError>> {
        Box::pin(async move {
            let vtable = session.abi().get_pointer(view.data)?;
            let access = self.access;
            Ok(Box::new(move |out: &mut T| *access(out) = vtable) as Apply<T>)
        })
    }
}

/// The bound reader for a [ReadableStruct], cached per host type by the
/// factory.
pub struct StructReader<T> {
    host_type: &'static str,
    type_label: String,
    symbol: String,
    compound_key: usize,
    info: TypeInfo,
    sequenced: bool,
    pub(crate) fields: OnceCell<Vec<Box<dyn FieldRead<T>>>>,
}

impl<T: ReadableStruct> StructReader<T> {
    /// The size of the bound compound.
    pub fn size(&self) -> usize {
        self.info.size
    }

    /// The schema path this reader was bound to.
    pub fn type_label(&self) -> &str {
        &self.type_label
    }

    /// The symbol used to find this compound's vtable address.
    pub(crate) fn symbol(&self) -> &str {
        &self.symbol
    }

    pub(crate) fn matches(&self, compound: &CompoundType) -> bool {
        self.compound_key == compound as *const CompoundType as usize
    }

    /// Decode one cell into `out`.
    ///
    /// Individual field failures are logged and reported collectively as
    /// [ReadError::InvalidField] once every field was attempted.
    pub fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let fields = self.fields.get().ok_or_else(|| {
                ReadError::Construction(format!("reader for {} used before binding", self.host_type))
            })?;
            let mut ok = true;
            if self.sequenced {
                for field in fields {
                    if let Err(error) = field.read_in_place(session, view, out).await {
                        log::error!("{} in {}: {}", field.label(), self.type_label, error);
                        ok = false;
                    }
                }
            } else {
                let applies = {
                    let current: &T = out;
                    let tasks: Vec<_> = fields
                        .iter()
                        .map(|field| field.read_detached(session, view, current))
                        .collect();
                    future::join_all(tasks).await
                };
                for (field, result) in fields.iter().zip(applies) {
                    match result {
                        Ok(apply) => apply(out),
                        Err(error) => {
                            log::error!("{} in {}: {}", field.label(), self.type_label, error);
                            ok = false;
                        }
                    }
                }
            }
            if ok {
                Ok(())
            } else {
                Err(ReadError::InvalidField)
            }
        })
    }
}

pub(crate) fn new_struct_reader<T: ReadableStruct>(
    spec: &StructSpec<T>,
    compound: &CompoundType,
    info: TypeInfo,
) -> StructReader<T> {
    let type_label = DisplayPath(&spec.type_path).to_string();
    let symbol = compound.symbol.clone().unwrap_or_else(|| {
        match spec.type_path.first() {
            Some(PathItem::Field(name)) => name.clone(),
            _ => compound.debug_name.clone(),
        }
    });
    StructReader {
        host_type: std::any::type_name::<T>(),
        type_label,
        symbol,
        compound_key: compound as *const CompoundType as usize,
        info,
        sequenced: spec.sequenced,
        fields: OnceCell::new(),
    }
}

/// [ItemReader] for host structs; delegates to the cached [StructReader].
pub struct StructItemReader<T: ReadableStruct> {
    reader: Rc<StructReader<T>>,
}

impl<T: ReadableStruct> ItemReader for StructItemReader<T> {
    type Output = T;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        let reader = factory.struct_reader::<T>()?;
        match ty {
            DfType::Compound(compound) if reader.matches(compound) => {
                Ok(StructItemReader { reader })
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
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        self.reader.read(session, view, out)
    }
}
