use serde::{Deserialize, Serialize};

/// Physical, 1-based sheet row. Row 1 holds the header, so data starts at 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowIndex(pub usize);

impl RowIndex {
    /// First row below the header.
    pub const FIRST_DATA: RowIndex = RowIndex(2);

    /// Row of the `n`-th data record (0-based).
    pub fn of_data(n: usize) -> Self {
        RowIndex(n + Self::FIRST_DATA.0)
    }
}

impl std::fmt::Display for RowIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_rows_start_below_header() {
        assert_eq!(RowIndex::of_data(0), RowIndex(2));
        assert_eq!(RowIndex::of_data(3), RowIndex(5));
    }
}
