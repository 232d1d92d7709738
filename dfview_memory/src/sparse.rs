use std::collections::BTreeMap;

use futures::future::LocalBoxFuture;

use crate::{MemoryError, MemoryReader, ProcessError};

/// An in-process memory image over a sparse set of address-tagged regions.
///
/// Useful for replaying captured memory and for exercising everything above
/// the process boundary without a live target. Overlapping or adjacent
/// regions are merged on insert, so any byte range that was written can be
/// read back in one request.
#[derive(Debug, Clone, Default)]
pub struct SparseMemory {
    id: Vec<u8>,
    base_offset: i64,
    regions: BTreeMap<u64, Vec<u8>>,
}

impl SparseMemory {
    /// Create an empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty image carrying a binary identifier.
    pub fn with_id(id: impl Into<Vec<u8>>) -> Self {
        SparseMemory {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the offset reported by [MemoryReader::base_offset].
    pub fn set_base_offset(&mut self, base_offset: i64) {
        self.base_offset = base_offset;
    }

    /// Place `data` at `address`, merging with overlapping or adjacent
    /// regions.
    pub fn insert(&mut self, address: u64, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let end = address + data.len() as u64;

        let affected: Vec<u64> = self
            .regions
            .range(..=end)
            .filter(|(&start, region)| start + region.len() as u64 >= address)
            .map(|(&start, _)| start)
            .collect();

        let mut merged_start = address;
        let mut merged_end = end;
        let mut absorbed = Vec::new();
        for start in affected {
            if let Some(region) = self.regions.remove(&start) {
                merged_start = merged_start.min(start);
                merged_end = merged_end.max(start + region.len() as u64);
                absorbed.push((start, region));
            }
        }

        let mut merged = vec![0u8; (merged_end - merged_start) as usize];
        for (start, region) in absorbed {
            let offset = (start - merged_start) as usize;
            merged[offset..offset + region.len()].copy_from_slice(&region);
        }
        let offset = (address - merged_start) as usize;
        merged[offset..offset + data.len()].copy_from_slice(&data);
        self.regions.insert(merged_start, merged);
    }

    fn read_at(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let (&start, region) = self
            .regions
            .range(..=address)
            .next_back()
            .ok_or(MemoryError::InvalidAddress { address, len })?;
        let offset = (address - start) as usize;
        if offset + len > region.len() {
            return Err(MemoryError::InvalidAddress { address, len });
        }
        Ok(region[offset..offset + len].to_vec())
    }
}

impl MemoryReader for SparseMemory {
    fn id(&self) -> &[u8] {
        &self.id
    }

    fn base_offset(&self) -> i64 {
        self.base_offset
    }

    fn stop(&self) -> Result<(), ProcessError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), ProcessError> {
        Ok(())
    }

    fn read(&self, address: u64, len: usize) -> LocalBoxFuture<'_, Result<Vec<u8>, MemoryError>> {
        Box::pin(async move { self.read_at(address, len) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive;

    #[test]
    fn adjacent_regions_merge() {
        let mut memory = SparseMemory::new();
        memory.insert(0x100, vec![1, 2, 3, 4]);
        memory.insert(0x104, vec![5, 6, 7, 8]);
        let data = drive(memory.read(0x100, 8), || false).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn overlapping_insert_overwrites() {
        let mut memory = SparseMemory::new();
        memory.insert(0x100, vec![1, 1, 1, 1]);
        memory.insert(0x102, vec![9, 9]);
        let data = drive(memory.read(0x100, 4), || false).unwrap();
        assert_eq!(data, vec![1, 1, 9, 9]);
    }

    #[test]
    fn unmapped_range_fails() {
        let mut memory = SparseMemory::new();
        memory.insert(0x100, vec![0; 8]);
        assert!(matches!(
            drive(memory.read(0x104, 8), || false),
            Err(MemoryError::InvalidAddress { .. })
        ));
        assert!(matches!(
            drive(memory.read(0x50, 4), || false),
            Err(MemoryError::InvalidAddress { .. })
        ));
    }
}
