//! Size bookkeeping done by the coordinator between classification and consolidation.
//!
//! Each category has its own table of prefix sums, one entry per rank plus the total. The offset of
//! rank `r` in category `c` is where the contribution of `r` starts in the consolidated output of
//! `c`. A wrong offset silently corrupts the output, there is no checksum further down.

use std::fmt;
use std::ops::Range;

use crate::classify::{Category, LocalPartition};
use crate::comm::VarLayout;

/// `(|smaller|, |equal|, |larger|)` of one rank.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SizeVector([usize; 3]);

impl SizeVector {
    pub fn of(partition: &LocalPartition) -> Self {
        Self(Category::ALL.map(|category| partition.get(category).len()))
    }

    pub const fn from_array(counts: [usize; 3]) -> Self {
        Self(counts)
    }

    pub const fn as_array(&self) -> [usize; 3] {
        self.0
    }

    pub fn get(&self, category: Category) -> usize {
        self.0[category.index()]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// Size vectors of all ranks, row `i` belongs to rank `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalSizeTable {
    rows: Vec<SizeVector>,
}

impl GlobalSizeTable {
    pub fn from_rows(rows: Vec<SizeVector>) -> Self {
        Self { rows }
    }

    pub fn ranks(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, rank: usize) -> SizeVector {
        self.rows[rank]
    }

    pub fn rows(&self) -> &[SizeVector] {
        &self.rows
    }

    /// Sizes of `category` for every rank, in rank order.
    pub fn column(&self, category: Category) -> Vec<usize> {
        self.rows.iter().map(|row| row.get(category)).collect()
    }

    pub fn totals(&self) -> SizeVector {
        let mut totals = [0; 3];
        for row in &self.rows {
            for (total, count) in totals.iter_mut().zip(row.as_array()) {
                *total += count;
            }
        }

        SizeVector(totals)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetTable {
    counts: [Vec<usize>; 3],
    // `ranks + 1` entries per category, starting at 0 and ending at the category total.
    displs: [Vec<usize>; 3],
}

impl OffsetTable {
    pub fn from_sizes(sizes: &GlobalSizeTable) -> Self {
        let counts = Category::ALL.map(|category| sizes.column(category));

        let displs = counts.clone().map(|column| {
            let mut displs = Vec::with_capacity(column.len() + 1);
            let mut acc = 0;
            displs.push(acc);
            for count in column {
                acc += count;
                displs.push(acc);
            }
            displs
        });

        Self { counts, displs }
    }

    pub fn ranks(&self) -> usize {
        self.counts[0].len()
    }

    pub fn offset(&self, category: Category, rank: usize) -> usize {
        self.displs[category.index()][rank]
    }

    pub fn total(&self, category: Category) -> usize {
        *self.displs[category.index()]
            .last()
            .unwrap_or(&0)
    }

    /// The full prefix sum of `category`, `ranks + 1` entries.
    pub fn displacements(&self, category: Category) -> &[usize] {
        &self.displs[category.index()]
    }

    pub fn counts(&self, category: Category) -> &[usize] {
        &self.counts[category.index()]
    }

    /// Where the contribution of `rank` lands in the consolidated `category` output.
    pub fn segment(&self, category: Category, rank: usize) -> Range<usize> {
        let displs = self.displacements(category);
        displs[rank]..displs[rank + 1]
    }

    pub fn layout(&self, category: Category) -> VarLayout<'_> {
        VarLayout::new(self.counts(category), self.displacements(category))
    }
}

/// Consolidated result, only ever built on the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalPartition {
    pub smaller: Vec<u8>,
    pub equal: Vec<u8>,
    pub larger: Vec<u8>,
}

impl GlobalPartition {
    /// Zeroed buffers sized to the category totals of `offsets`.
    pub fn allocate(offsets: &OffsetTable) -> Self {
        Self {
            smaller: vec![0; offsets.total(Category::Smaller)],
            equal: vec![0; offsets.total(Category::Equal)],
            larger: vec![0; offsets.total(Category::Larger)],
        }
    }

    pub fn get(&self, category: Category) -> &[u8] {
        match category {
            Category::Smaller => &self.smaller,
            Category::Equal => &self.equal,
            Category::Larger => &self.larger,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut [u8] {
        match category {
            Category::Smaller => &mut self.smaller,
            Category::Equal => &mut self.equal,
            Category::Larger => &mut self.larger,
        }
    }

    pub fn len(&self) -> usize {
        self.smaller.len() + self.equal.len() + self.larger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<LocalPartition> for GlobalPartition {
    fn from(local: LocalPartition) -> Self {
        Self {
            smaller: local.smaller,
            equal: local.equal,
            larger: local.larger,
        }
    }
}

/// Renders one line per category, e.g. `L: [ 1 2 ]`.
impl fmt::Display for GlobalPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in Category::ALL {
            write!(f, "{} [", category.label())?;
            for value in self.get(category) {
                write!(f, " {value}")?;
            }
            writeln!(f, " ]")?;
        }

        Ok(())
    }
}
