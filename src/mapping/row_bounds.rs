/// Offset/limit window applied while consuming a query's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
    offset: usize,
    limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = i32::MAX as usize;
    pub const DEFAULT: RowBounds = RowBounds {
        offset: Self::NO_ROW_OFFSET,
        limit: Self::NO_ROW_LIMIT,
    };

    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}
