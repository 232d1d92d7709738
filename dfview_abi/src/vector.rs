use crate::{Abi, AbiError, TypeInfo};

/// The decoded state of a `std::vector` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorInfo {
    /// Address of the beginning of the vector data.
    pub data: u64,
    /// Item count.
    pub len: usize,
}

// Corrupt vectors are contained by refusing capacities above this many bytes.
const MAX_VECTOR_CAPACITY: u64 = 1_000_000;

impl Abi {
    /// Decode a `std::vector` header `{begin, end, end_capacity}` whose items
    /// have layout `item_info`.
    pub fn decode_vector(&self, data: &[u8], item_info: TypeInfo) -> Result<VectorInfo, AbiError> {
        let p = self.pointer_size();
        if data.len() < 3 * p {
            return Err(AbiError::InvalidLength);
        }
        let begin = self.get_pointer(data)?;
        let end = self.get_pointer(&data[p..])?;
        let end_capacity = self.get_pointer(&data[2 * p..])?;

        if begin == 0 && end == 0 && end_capacity == 0 {
            return Ok(VectorInfo::default());
        }
        let item_size = item_info.size as u64;
        let item_align = item_info.align.max(1) as u64;
        if item_size == 0 {
            return Err(AbiError::InvalidLength);
        }
        if [begin, end, end_capacity]
            .iter()
            .any(|pointer| pointer % item_align != 0)
        {
            return Err(AbiError::UnalignedPointer);
        }
        if end < begin || (end - begin) % item_size != 0 {
            return Err(AbiError::InvalidLength);
        }
        if end_capacity < end || (end_capacity - begin) % item_size != 0 {
            return Err(AbiError::InvalidCapacity);
        }
        if end_capacity - begin > MAX_VECTOR_CAPACITY {
            return Err(AbiError::InvalidCapacity);
        }
        Ok(VectorInfo {
            data: begin,
            len: ((end - begin) / item_size) as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GCC_64;

    fn header(begin: u64, end: u64, end_capacity: u64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&begin.to_le_bytes());
        data.extend_from_slice(&end.to_le_bytes());
        data.extend_from_slice(&end_capacity.to_le_bytes());
        data
    }

    #[test]
    fn well_formed() {
        let info = GCC_64
            .decode_vector(&header(0x2000, 0x2010, 0x2020), TypeInfo::new(4, 4))
            .unwrap();
        assert_eq!(info, VectorInfo { data: 0x2000, len: 4 });
    }

    #[test]
    fn empty_zeroed() {
        let info = GCC_64
            .decode_vector(&header(0, 0, 0), TypeInfo::new(4, 4))
            .unwrap();
        assert_eq!(info, VectorInfo::default());
    }

    #[test]
    fn misaligned_pointer() {
        assert_eq!(
            GCC_64.decode_vector(&header(0x2002, 0x2012, 0x2022), TypeInfo::new(4, 4)),
            Err(AbiError::UnalignedPointer)
        );
    }

    #[test]
    fn backwards_range() {
        assert_eq!(
            GCC_64.decode_vector(&header(0x2010, 0x2000, 0x2020), TypeInfo::new(4, 4)),
            Err(AbiError::InvalidLength)
        );
    }

    #[test]
    fn length_past_capacity() {
        assert_eq!(
            GCC_64.decode_vector(&header(0x2000, 0x2020, 0x2010), TypeInfo::new(4, 4)),
            Err(AbiError::InvalidCapacity)
        );
    }

    #[test]
    fn ragged_length() {
        assert_eq!(
            GCC_64.decode_vector(&header(0x2000, 0x2003, 0x2020), TypeInfo::new(4, 1)),
            Err(AbiError::InvalidLength)
        );
    }

    #[test]
    fn runaway_capacity() {
        assert_eq!(
            GCC_64.decode_vector(&header(0x2000, 0x2000, 0x2000 + 2_000_000), TypeInfo::new(1, 1)),
            Err(AbiError::InvalidCapacity)
        );
    }
}
