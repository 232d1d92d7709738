use dfview_memory::{MemView, MemoryReader};

use crate::{scalar, Abi, AbiError, StringRepr};

// Corrupt strings are contained by refusing capacities above this.
const MAX_STRING_CAPACITY: u64 = 1_000_000;

impl Abi {
    /// Read a `std::string` whose cell is `view`.
    ///
    /// Heap-allocated representations follow the data pointer through
    /// `process`. Bytes are decoded lossily; the game's strings are CP437 but
    /// mostly ASCII.
    pub async fn read_string(
        &self,
        process: &dyn MemoryReader,
        view: MemView<'_>,
    ) -> Result<String, AbiError> {
        let bytes = self.read_string_bytes(process, view).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn read_string_bytes(
        &self,
        process: &dyn MemoryReader,
        view: MemView<'_>,
    ) -> Result<Vec<u8>, AbiError> {
        let p = self.pointer_size();
        match self.string_repr() {
            StringRepr::GnuCow => {
                // A {length, capacity, refcount} header sits right before the
                // character data.
                let data = self.get_pointer(view.data)?;
                if data == 0 || (data as usize) < 3 * p {
                    return Err(AbiError::InvalidPointer);
                }
                let header = process.read(data - (3 * p) as u64, 3 * p).await?;
                let length = scalar::read_uint(&header, p)?;
                let capacity = scalar::read_uint(&header[p..], p)?;
                check_counts(length, capacity)?;
                Ok(process.read(data, length as usize).await?)
            }
            StringRepr::GnuSso => {
                let data = self.get_pointer(view.data)?;
                let length = scalar::read_uint(&view.data[p..], p)?;
                let local = view.subview(2 * p, 16);
                let is_local = data == local.address;
                let capacity = if is_local {
                    15
                } else {
                    scalar::read_uint(local.data, p)?
                };
                check_counts(length, capacity)?;
                if is_local {
                    Ok(local.data[..length as usize].to_vec())
                } else {
                    Ok(process.read(data, length as usize).await?)
                }
            }
            StringRepr::Msvc => {
                let length = scalar::read_uint(&view.data[16..], p)?;
                let capacity = scalar::read_uint(&view.data[16 + p..], p)?;
                check_counts(length, capacity)?;
                if capacity > 15 {
                    let data = self.get_pointer(view.data)?;
                    Ok(process.read(data, length as usize).await?)
                } else {
                    Ok(view.data[..length as usize].to_vec())
                }
            }
        }
    }
}

fn check_counts(length: u64, capacity: u64) -> Result<(), AbiError> {
    if capacity > MAX_STRING_CAPACITY || length > capacity {
        return Err(AbiError::InvalidCapacity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GCC_32, GCC_64, GCC_CXX11_64, MSVC2015_64};
    use dfview_memory::{drive, SparseMemory};

    fn read(abi: Abi, memory: &SparseMemory, address: u64) -> Result<String, AbiError> {
        let size = abi.primitive_info(dfview_types::PrimitiveKind::StdString).size;
        drive(
            async {
                let cell = memory.read(address, size).await?;
                abi.read_string(memory, MemView::new(address, &cell)).await
            },
            || false,
        )
    }

    #[test]
    fn gnu_cow() {
        let mut memory = SparseMemory::new();
        // Header {length=5, capacity=8, refcount=1} before the data.
        let mut block = Vec::new();
        block.extend_from_slice(&5u64.to_le_bytes());
        block.extend_from_slice(&8u64.to_le_bytes());
        block.extend_from_slice(&1u64.to_le_bytes());
        block.extend_from_slice(b"hello\0\0\0");
        memory.insert(0x5000 - 24, block);
        memory.insert(0x100, 0x5000u64.to_le_bytes().to_vec());
        assert_eq!(read(GCC_64, &memory, 0x100).unwrap(), "hello");
    }

    #[test]
    fn gnu_cow_32() {
        let mut memory = SparseMemory::new();
        let mut block = Vec::new();
        block.extend_from_slice(&3u32.to_le_bytes());
        block.extend_from_slice(&3u32.to_le_bytes());
        block.extend_from_slice(&2u32.to_le_bytes());
        block.extend_from_slice(b"dwa");
        memory.insert(0x5000 - 12, block);
        memory.insert(0x100, 0x5000u32.to_le_bytes().to_vec());
        assert_eq!(read(GCC_32, &memory, 0x100).unwrap(), "dwa");
    }

    #[test]
    fn gnu_sso_inline() {
        let mut memory = SparseMemory::new();
        let mut cell = Vec::new();
        // Data pointer aimed at the cell's own inline buffer.
        cell.extend_from_slice(&(0x200u64 + 16).to_le_bytes());
        cell.extend_from_slice(&5u64.to_le_bytes());
        cell.extend_from_slice(b"urist\0\0\0\0\0\0\0\0\0\0\0");
        memory.insert(0x200, cell);
        assert_eq!(read(GCC_CXX11_64, &memory, 0x200).unwrap(), "urist");
    }

    #[test]
    fn gnu_sso_heap() {
        let mut memory = SparseMemory::new();
        let mut cell = Vec::new();
        cell.extend_from_slice(&0x7000u64.to_le_bytes());
        cell.extend_from_slice(&20u64.to_le_bytes());
        cell.extend_from_slice(&31u64.to_le_bytes());
        cell.extend_from_slice(&[0u8; 8]);
        memory.insert(0x200, cell);
        memory.insert(0x7000, b"this one is too long".to_vec());
        assert_eq!(read(GCC_CXX11_64, &memory, 0x200).unwrap(), "this one is too long");
    }

    #[test]
    fn msvc_inline() {
        let mut memory = SparseMemory::new();
        let mut cell = Vec::new();
        cell.extend_from_slice(b"short\0\0\0\0\0\0\0\0\0\0\0");
        cell.extend_from_slice(&5u64.to_le_bytes());
        cell.extend_from_slice(&15u64.to_le_bytes());
        memory.insert(0x300, cell);
        assert_eq!(read(MSVC2015_64, &memory, 0x300).unwrap(), "short");
    }

    #[test]
    fn msvc_heap() {
        let mut memory = SparseMemory::new();
        let mut cell = Vec::new();
        cell.extend_from_slice(&0x9000u64.to_le_bytes());
        cell.extend_from_slice(&[0u8; 8]);
        cell.extend_from_slice(&16u64.to_le_bytes());
        cell.extend_from_slice(&31u64.to_le_bytes());
        memory.insert(0x300, cell);
        memory.insert(0x9000, b"sixteen chars ok".to_vec());
        assert_eq!(read(MSVC2015_64, &memory, 0x300).unwrap(), "sixteen chars ok");
    }

    #[test]
    fn runaway_capacity_is_rejected() {
        let mut memory = SparseMemory::new();
        let mut cell = Vec::new();
        cell.extend_from_slice(&0x9000u64.to_le_bytes());
        cell.extend_from_slice(&[0u8; 8]);
        cell.extend_from_slice(&4u64.to_le_bytes());
        cell.extend_from_slice(&2_000_000u64.to_le_bytes());
        memory.insert(0x300, cell);
        assert_eq!(
            read(MSVC2015_64, &memory, 0x300),
            Err(AbiError::InvalidCapacity)
        );
    }
}
