/// An expanded bit vector read from a flag array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagArray(pub Vec<bool>);

impl FlagArray {
    /// Whether flag `index` is present and set.
    pub fn is_set(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// The number of stored bits.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no bits are stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
