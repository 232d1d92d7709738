use std::{
    any::{Any, TypeId},
    cell::RefCell,
    collections::{hash_map::Entry, HashMap},
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use futures::future::{self, LocalBoxFuture};

use dfview_abi::Abi;
use dfview_memory::{MemView, MemoryReader};
use dfview_path::PathItem;
use dfview_types::DfType;

use crate::{
    global::global_pointer, ItemReader, PointeeRead, ReadError, Readable, ReaderError,
    ReaderFactory,
};

/// A typed address in the target process.
#[derive(Debug, Clone, Copy)]
pub struct TypedPointer<'s> {
    /// The address, base offset already applied.
    pub address: u64,
    /// The type of the object at that address.
    pub ty: &'s DfType,
}

enum SlotState {
    Pending { wakers: Vec<Waker> },
    Ready(Result<Option<Rc<dyn Any>>, ReadError>),
}

struct SharedSlot {
    type_id: TypeId,
    state: Rc<RefCell<SlotState>>,
}

/// A shared-object identity map, usable across sessions.
///
/// A session keeps its own map; attach an external one with
/// [ReadSession::add_shared_cache] to let shared objects of one type outlive
/// a session.
#[derive(Clone, Default)]
pub struct SharedObjectCache {
    slots: Rc<RefCell<HashMap<u64, SharedSlot>>>,
}

impl SharedObjectCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached object.
    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }
}

struct SlotWait {
    state: Rc<RefCell<SlotState>>,
}

impl Future for SlotWait {
    type Output = Result<Option<Rc<dyn Any>>, ReadError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut *self.state.borrow_mut() {
            SlotState::Ready(outcome) => Poll::Ready(outcome.clone()),
            SlotState::Pending { wakers } => {
                wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// Manages one reading session.
///
/// Stops the process on construction and resumes it on drop. Read
/// operations are futures; pass a batch to [ReadSession::sync] to run them
/// concurrently, with failures logged and reported as one boolean.
pub struct ReadSession<'s> {
    factory: &'s ReaderFactory<'s>,
    process: &'s dyn MemoryReader,
    shared: SharedObjectCache,
    external: RefCell<HashMap<TypeId, SharedObjectCache>>,
}

impl<'s> ReadSession<'s> {
    /// Start a session: the process is stopped until the session drops.
    pub fn new(factory: &'s ReaderFactory<'s>, process: &'s dyn MemoryReader) -> Self {
        if let Err(error) = process.stop() {
            log::error!("Failed to stop process: {}", error);
        }
        ReadSession {
            factory,
            process,
            shared: SharedObjectCache::new(),
            external: RefCell::new(HashMap::new()),
        }
    }

    /// The factory this session reads with.
    pub fn factory(&self) -> &'s ReaderFactory<'s> {
        self.factory
    }

    /// The process this session reads from.
    pub fn process(&self) -> &'s dyn MemoryReader {
        self.process
    }

    /// The session's ABI.
    pub fn abi(&self) -> &Abi {
        self.factory.abi()
    }

    /// Find the address and type of the global designated by `path`.
    pub fn global(&self, path: &[PathItem]) -> Result<TypedPointer<'s>, ReaderError> {
        global_pointer(self.factory, path, Some(self.process))
    }

    /// Read the object at `pointer` into `out`.
    pub fn read<'a, T: Readable>(
        &'a self,
        pointer: TypedPointer<'a>,
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let reader = self.factory.item_reader::<T>(pointer.ty)?;
            let block = self.process.read(pointer.address, reader.size()).await?;
            reader
                .read(self, MemView::new(pointer.address, &block), out)
                .await
        })
    }

    /// Read the global designated by `path` into `out`.
    pub fn read_global<'a, T: Readable>(
        &'a self,
        path: &'a [PathItem],
        out: &'a mut T,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            let pointer = self.global(path)?;
            self.read(pointer, out).await
        })
    }

    /// Run a batch of reads to completion.
    ///
    /// Each failure is logged; the return value is true when every read
    /// succeeded. Partial results may remain in out-parameters.
    pub fn sync(&self, tasks: Vec<LocalBoxFuture<'_, Result<(), ReadError>>>) -> bool {
        let mut ok = true;
        {
            let all = async {
                for result in future::join_all(tasks).await {
                    if let Err(error) = result {
                        log::error!("failed to read data: {}", error);
                        ok = false;
                    }
                }
            };
            self.process.run(Box::pin(all));
        }
        ok
    }

    /// Use `cache` for shared objects of type `T` instead of the session's
    /// own map, letting them outlive the session.
    pub fn add_shared_cache<T: 'static>(
        &self,
        cache: &SharedObjectCache,
    ) -> Result<(), ReaderError> {
        match self.external.borrow_mut().entry(TypeId::of::<T>()) {
            Entry::Occupied(_) => Err(ReaderError::DuplicateSharedCache(
                std::any::type_name::<T>(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(cache.clone());
                Ok(())
            }
        }
    }

    fn cache_for(&self, type_id: TypeId) -> SharedObjectCache {
        self.external
            .borrow()
            .get(&type_id)
            .cloned()
            .unwrap_or_else(|| self.shared.clone())
    }

    /// The shared object at `address`, materialised once per session.
    ///
    /// Concurrent and repeated lookups of the same address return the same
    /// handle; looking the address up as a different base type is a type
    /// mismatch.
    pub fn shared_object<'a, T: Readable>(
        &'a self,
        address: u64,
        pointee: Rc<dyn PointeeRead<T>>,
    ) -> LocalBoxFuture<'a, Result<Option<Rc<T>>, ReadError>> {
        Box::pin(async move {
            let type_id = TypeId::of::<T>();
            let cache = self.cache_for(type_id);

            enum Role {
                Compute(Rc<RefCell<SlotState>>),
                Wait(Rc<RefCell<SlotState>>),
            }
            let role = {
                let mut slots = cache.slots.borrow_mut();
                match slots.entry(address) {
                    Entry::Occupied(entry) => {
                        if entry.get().type_id != type_id {
                            return Err(ReadError::SharedTypeMismatch { address });
                        }
                        Role::Wait(entry.get().state.clone())
                    }
                    Entry::Vacant(entry) => {
                        let state = Rc::new(RefCell::new(SlotState::Pending { wakers: Vec::new() }));
                        entry.insert(SharedSlot {
                            type_id,
                            state: state.clone(),
                        });
                        Role::Compute(state)
                    }
                }
            };

            let outcome = match role {
                Role::Compute(state) => {
                    let outcome = pointee
                        .read_box(self, address)
                        .await
                        .map(|value| {
                            value.map(|boxed| {
                                let rc: Rc<T> = Rc::from(boxed);
                                rc as Rc<dyn Any>
                            })
                        });
                    let wakers = {
                        let mut slot = state.borrow_mut();
                        let wakers = match &mut *slot {
                            SlotState::Pending { wakers } => std::mem::take(wakers),
                            SlotState::Ready(_) => Vec::new(),
                        };
                        *slot = SlotState::Ready(outcome.clone());
                        wakers
                    };
                    for waker in wakers {
                        waker.wake();
                    }
                    outcome
                }
                Role::Wait(state) => SlotWait { state }.await,
            };

            match outcome? {
                None => Ok(None),
                Some(object) => object
                    .downcast::<T>()
                    .map(Some)
                    .map_err(|_| ReadError::SharedTypeMismatch { address }),
            }
        })
    }
}

impl Drop for ReadSession<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.process.resume() {
            log::error!("Failed to resume process: {}", error);
        }
    }
}
