use futures::future::{self, LocalBoxFuture};

use dfview_abi::{read_uint, TypeInfo};
use dfview_memory::MemView;
use dfview_types::{df_container_members, DfContainerKind, DfType, StdContainerKind};

use crate::{
    DiscriminatedReader, ItemReader, ReadError, ReadSession, Readable, ReaderError, ReaderFactory,
};

// A linked list longer than this is assumed to be corrupt.
const MAX_LIST_NODES: usize = 1_000_000;

enum VecKind {
    StdVector,
    DfArray {
        data_offset: usize,
        len_offset: usize,
    },
    DfLinkedList {
        node_size: usize,
        item_offset: usize,
        next_offset: usize,
    },
}

/// The gathered item cells of one container read.
enum Cells {
    Block {
        base: u64,
        data: Vec<u8>,
        count: usize,
        stride: usize,
    },
    List {
        cells: Vec<(u64, Vec<u8>)>,
    },
}

impl Cells {
    fn count(&self) -> usize {
        match self {
            Cells::Block { count, .. } => *count,
            Cells::List { cells } => cells.len(),
        }
    }

    fn view(&self, index: usize) -> MemView<'_> {
        match self {
            Cells::Block {
                base,
                data,
                stride,
                ..
            } => MemView::new(
                base + (index * stride) as u64,
                &data[index * stride..(index + 1) * stride],
            ),
            Cells::List { cells } => {
                let (address, data) = &cells[index];
                MemView::new(*address, data)
            }
        }
    }
}

/// Reader for linear sequence containers.
///
/// Accepts `std::vector`, the engine's contiguous array, and the engine's
/// linked list. The item cells are decoded concurrently with `R` once the
/// container storage has been fetched.
pub struct VecReader<R: ItemReader> {
    kind: VecKind,
    size: usize,
    item_info: TypeInfo,
    item_reader: R,
}

impl<R: ItemReader> VecReader<R> {
    fn incompatible(ty: &DfType) -> ReaderError {
        ReaderError::type_mismatch(
            "not a sequence container",
            ty,
            std::any::type_name::<Vec<R::Output>>(),
        )
    }

    fn build(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        let host_type = std::any::type_name::<Vec<R::Output>>();
        match ty {
            DfType::StdContainer(container) if container.kind == StdContainerKind::Vector => {
                let item_ref = container.item_type().ok_or_else(|| {
                    ReaderError::type_mismatch("container without item type", ty, host_type)
                })?;
                let item_ty = factory.schema().resolve(item_ref)?;
                Ok(VecReader {
                    kind: VecKind::StdVector,
                    size: factory.layout().type_info(ty)?.size,
                    item_info: factory.layout().type_info(item_ty)?,
                    item_reader: R::new(factory, item_ty)?,
                })
            }
            DfType::DfContainer(container) => {
                let item_ref = container.item.as_ref().ok_or_else(|| {
                    ReaderError::type_mismatch("container without item type", ty, host_type)
                })?;
                let item_ty = factory.schema().resolve(item_ref)?;
                let header_layout = factory.layout().compound_layout(&container.header)?;
                let kind = match container.kind {
                    DfContainerKind::Array => VecKind::DfArray {
                        data_offset: header_layout.member_offsets
                            [df_container_members::ARRAY_DATA],
                        len_offset: header_layout.member_offsets[df_container_members::ARRAY_SIZE],
                    },
                    DfContainerKind::LinkedList => VecKind::DfLinkedList {
                        node_size: factory.layout().type_info(ty)?.size,
                        item_offset: header_layout.member_offsets
                            [df_container_members::LINKED_LIST_ITEM],
                        next_offset: header_layout.member_offsets
                            [df_container_members::LINKED_LIST_NEXT],
                    },
                    DfContainerKind::FlagArray => return Err(Self::incompatible(ty)),
                };
                Ok(VecReader {
                    kind,
                    size: factory.layout().type_info(ty)?.size,
                    item_info: factory.layout().type_info(item_ty)?,
                    item_reader: R::new(factory, item_ty)?,
                })
            }
            other => Err(Self::incompatible(other)),
        }
    }

    async fn collect(
        &self,
        session: &ReadSession<'_>,
        view: MemView<'_>,
    ) -> Result<Cells, ReadError> {
        match &self.kind {
            VecKind::StdVector => {
                let info = session.abi().decode_vector(view.data, self.item_info)?;
                self.read_block(session, info.data, info.len).await
            }
            VecKind::DfArray {
                data_offset,
                len_offset,
            } => {
                let address = session.abi().get_pointer(&view.data[*data_offset..])?;
                let len = read_uint(&view.data[*len_offset..], 2)? as usize;
                self.read_block(session, address, len).await
            }
            VecKind::DfLinkedList {
                node_size,
                item_offset,
                next_offset,
            } => {
                let pointer_size = session.abi().pointer_size();
                let mut cells = Vec::new();
                cells.push((
                    view.address + *item_offset as u64,
                    view.data[*item_offset..*item_offset + pointer_size].to_vec(),
                ));
                let mut next = session.abi().get_pointer(&view.data[*next_offset..])?;
                while next != 0 {
                    if cells.len() > MAX_LIST_NODES {
                        return Err(ReadError::Abi(dfview_abi::AbiError::InvalidLength));
                    }
                    let node = session.process().read(next, *node_size).await?;
                    cells.push((
                        next + *item_offset as u64,
                        node[*item_offset..*item_offset + pointer_size].to_vec(),
                    ));
                    next = session.abi().get_pointer(&node[*next_offset..])?;
                }
                Ok(Cells::List { cells })
            }
        }
    }

    async fn read_block(
        &self,
        session: &ReadSession<'_>,
        base: u64,
        count: usize,
    ) -> Result<Cells, ReadError> {
        let stride = self.item_info.size;
        let data = if count == 0 || base == 0 {
            Vec::new()
        } else {
            session.process().read(base, count * stride).await?
        };
        let count = if base == 0 { 0 } else { count };
        Ok(Cells::Block {
            base,
            data,
            count,
            stride,
        })
    }
}

impl<R: ItemReader> ItemReader for VecReader<R>
where
    R::Output: Default,
{
    type Output = Vec<R::Output>;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        Self::build(factory, ty)
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut Vec<R::Output>,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let cells = self.collect(session, view).await?;
            let count = cells.count();
            out.clear();
            out.resize_with(count, Default::default);
            let tasks: Vec<_> = out
                .iter_mut()
                .enumerate()
                .map(|(index, slot)| self.item_reader.read(session, cells.view(index), slot))
                .collect();
            for result in future::join_all(tasks).await {
                result?;
            }
            Ok(())
        })
    }
}

impl<R: DiscriminatedReader> DiscriminatedReader for VecReader<R>
where
    R::Output: Default,
{
    type Discriminator = Vec<R::Discriminator>;

    fn read_with<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut Vec<R::Output>,
        disc: Vec<R::Discriminator>,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let cells = self.collect(session, view).await?;
            let count = cells.count();
            if disc.len() != count {
                return Err(ReadError::DiscriminatorCount {
                    expected: count,
                    actual: disc.len(),
                });
            }
            out.clear();
            out.resize_with(count, Default::default);
            let tasks: Vec<_> = out
                .iter_mut()
                .zip(disc)
                .enumerate()
                .map(|(index, (slot, item_disc))| {
                    self.item_reader
                        .read_with(session, cells.view(index), slot, item_disc)
                })
                .collect();
            for result in future::join_all(tasks).await {
                result?;
            }
            Ok(())
        })
    }
}

impl<T: Readable> Readable for Vec<T> {
    type Reader = VecReader<T::Reader>;
}

/// Reader for fixed arrays, accepting a static array of matching extent.
pub struct ArrayReader<R: ItemReader, const N: usize> {
    item_size: usize,
    item_reader: R,
}

impl<R: ItemReader, const N: usize> ItemReader for ArrayReader<R, N> {
    type Output = [R::Output; N];

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        let host_type = std::any::type_name::<[R::Output; N]>();
        match ty {
            DfType::StaticArray(array) => {
                if array.extent != Some(N) {
                    return Err(ReaderError::type_mismatch("invalid array extent", ty, host_type));
                }
                let item_ty = factory.schema().resolve(&array.item)?;
                Ok(ArrayReader {
                    item_size: factory.layout().type_info(item_ty)?.size,
                    item_reader: R::new(factory, item_ty)?,
                })
            }
            other => Err(ReaderError::type_mismatch("not a static array", other, host_type)),
        }
    }

    fn size(&self) -> usize {
        self.item_size * N
    }

    fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut [R::Output; N],
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let tasks: Vec<_> = out
                .iter_mut()
                .enumerate()
                .map(|(index, slot)| {
                    let item_view = view.subview(index * self.item_size, self.item_size);
                    self.item_reader.read(session, item_view, slot)
                })
                .collect();
            for result in future::join_all(tasks).await {
                result?;
            }
            Ok(())
        })
    }
}

impl<T: Readable, const N: usize> Readable for [T; N]
where
    [T; N]: Default,
{
    type Reader = ArrayReader<T::Reader, N>;
}
