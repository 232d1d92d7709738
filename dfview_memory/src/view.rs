/// A view over raw memory copied out of the target process.
///
/// Keeps the target address alongside the bytes, so decoders can tell where a
/// cell came from (inline small-string detection needs this).
#[derive(Debug, Clone, Copy)]
pub struct MemView<'a> {
    /// The address the data was read from.
    pub address: u64,
    /// The data itself.
    pub data: &'a [u8],
}

impl<'a> MemView<'a> {
    /// Create a view of `data` located at `address`.
    pub fn new(address: u64, data: &'a [u8]) -> Self {
        MemView { address, data }
    }

    /// A sub-view of `len` bytes starting at `offset`.
    pub fn subview(&self, offset: usize, len: usize) -> MemView<'a> {
        MemView {
            address: self.address + offset as u64,
            data: &self.data[offset..offset + len],
        }
    }

    /// A sub-view from `offset` to the end of this view.
    pub fn tail(&self, offset: usize) -> MemView<'a> {
        MemView {
            address: self.address + offset as u64,
            data: &self.data[offset..],
        }
    }
}
