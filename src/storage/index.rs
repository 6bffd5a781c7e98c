use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::types::TupleValue;

pub type ColumnId = u32;

/// Secondary chunk index structures the store knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    GroupKey,
    BTree,
}

impl Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexType::GroupKey => write!(f, "group_key"),
            IndexType::BTree => write!(f, "btree"),
        }
    }
}

impl FromStr for IndexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group_key" => Ok(IndexType::GroupKey),
            "btree" => Ok(IndexType::BTree),
            other => Err(format!("unknown index type '{}'", other)),
        }
    }
}

/// Catalog-level description of one secondary index on a table.
/// `memory_consumption` is the sum of the per-chunk structures in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub column_ids: Vec<ColumnId>,
    pub index_type: IndexType,
    pub memory_consumption: u64,
}

// Accounting constants shared between the live structures and the
// predictor so that predicted and measured sizes agree for fixed width
// columns. Postings and dictionary offsets are u32 positions; a BTree
// entry pays a node overhead plus the Vec header of its postings list.
const POSITION_BYTES: u64 = 4;
const BTREE_NODE_OVERHEAD: u64 = 48;
const VEC_HEADER_BYTES: u64 = 24;

/// Predicted per-chunk memory consumption in bytes of an index of the
/// given type over a chunk with `chunk_rows` rows, `chunk_distinct`
/// distinct values and `value_bytes` bytes per indexed value.
pub fn predict_memory_consumption(
    index_type: IndexType,
    chunk_rows: u64,
    chunk_distinct: u64,
    value_bytes: u64,
) -> u64 {
    match index_type {
        IndexType::GroupKey => {
            // postings + dictionary values + offsets (one extra end offset)
            chunk_rows * POSITION_BYTES
                + chunk_distinct * (value_bytes + POSITION_BYTES)
                + POSITION_BYTES
        }
        IndexType::BTree => {
            chunk_rows * POSITION_BYTES
                + chunk_distinct * (value_bytes + BTREE_NODE_OVERHEAD + VEC_HEADER_BYTES)
        }
    }
}

/// One secondary index over a single chunk.
#[derive(Debug, Clone)]
pub struct ChunkIndex {
    pub column_ids: Vec<ColumnId>,
    pub index: ColumnIndex,
}

impl ChunkIndex {
    pub fn index_type(&self) -> IndexType {
        self.index.index_type()
    }

    pub fn memory_consumption(&self) -> u64 {
        self.index.memory_consumption()
    }
}

#[derive(Debug, Clone)]
pub enum ColumnIndex {
    GroupKey(GroupKeyIndex),
    BTree(BTreeIndex),
}

impl ColumnIndex {
    pub fn build(index_type: IndexType, segment: &[Option<TupleValue>]) -> ColumnIndex {
        match index_type {
            IndexType::GroupKey => ColumnIndex::GroupKey(GroupKeyIndex::build(segment)),
            IndexType::BTree => ColumnIndex::BTree(BTreeIndex::build(segment)),
        }
    }

    pub fn index_type(&self) -> IndexType {
        match self {
            ColumnIndex::GroupKey(_) => IndexType::GroupKey,
            ColumnIndex::BTree(_) => IndexType::BTree,
        }
    }

    pub fn memory_consumption(&self) -> u64 {
        match self {
            ColumnIndex::GroupKey(index) => index.memory_consumption(),
            ColumnIndex::BTree(index) => index.memory_consumption(),
        }
    }

    /// Positions within the chunk holding exactly `value`.
    pub fn positions_eq(&self, value: &TupleValue) -> Vec<u32> {
        match self {
            ColumnIndex::GroupKey(index) => index.positions_eq(value),
            ColumnIndex::BTree(index) => index.positions_eq(value),
        }
    }
}

/// Dictionary style index: the distinct values of the chunk sorted
/// ascending, an offsets vector pointing into a postings vector that
/// lists row positions grouped by value. Nulls are not indexed.
#[derive(Debug, Clone)]
pub struct GroupKeyIndex {
    dictionary: Vec<TupleValue>,
    offsets: Vec<u32>,
    postings: Vec<u32>,
}

impl GroupKeyIndex {
    pub fn build(segment: &[Option<TupleValue>]) -> GroupKeyIndex {
        let mut by_value: BTreeMap<&TupleValue, Vec<u32>> = BTreeMap::new();
        for (position, value) in segment.iter().enumerate() {
            if let Some(value) = value {
                by_value.entry(value).or_default().push(position as u32);
            }
        }
        let mut dictionary = Vec::with_capacity(by_value.len());
        let mut offsets = Vec::with_capacity(by_value.len() + 1);
        let mut postings = Vec::new();
        for (value, positions) in by_value {
            dictionary.push(value.clone());
            offsets.push(postings.len() as u32);
            postings.extend(positions);
        }
        offsets.push(postings.len() as u32);
        GroupKeyIndex { dictionary, offsets, postings }
    }

    pub fn memory_consumption(&self) -> u64 {
        let dictionary_bytes: u64 = self.dictionary.iter().map(|v| v.byte_size() as u64).sum();
        dictionary_bytes
            + self.offsets.len() as u64 * POSITION_BYTES
            + self.postings.len() as u64 * POSITION_BYTES
    }

    pub fn positions_eq(&self, value: &TupleValue) -> Vec<u32> {
        match self.dictionary.binary_search(value) {
            Ok(slot) => {
                let start = self.offsets[slot] as usize;
                let end = self.offsets[slot + 1] as usize;
                self.postings[start..end].to_vec()
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Ordered map from value to the row positions holding it.
#[derive(Debug, Clone)]
pub struct BTreeIndex {
    entries: BTreeMap<TupleValue, Vec<u32>>,
}

impl BTreeIndex {
    pub fn build(segment: &[Option<TupleValue>]) -> BTreeIndex {
        let mut entries: BTreeMap<TupleValue, Vec<u32>> = BTreeMap::new();
        for (position, value) in segment.iter().enumerate() {
            if let Some(value) = value {
                entries.entry(value.clone()).or_default().push(position as u32);
            }
        }
        BTreeIndex { entries }
    }

    pub fn memory_consumption(&self) -> u64 {
        self.entries
            .iter()
            .map(|(value, positions)| {
                value.byte_size() as u64
                    + BTREE_NODE_OVERHEAD
                    + VEC_HEADER_BYTES
                    + positions.len() as u64 * POSITION_BYTES
            })
            .sum()
    }

    pub fn positions_eq(&self, value: &TupleValue) -> Vec<u32> {
        self.entries.get(value).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn segment(values: &[i32]) -> Vec<Option<TupleValue>> {
        values.iter().map(|v| Some(TupleValue::Int(*v))).collect()
    }

    #[test]
    fn group_key_lookup() {
        let index = GroupKeyIndex::build(&segment(&[5, 3, 5, 1, 3, 5]));
        assert_eq!(index.positions_eq(&TupleValue::Int(5)), vec![0, 2, 5]);
        assert_eq!(index.positions_eq(&TupleValue::Int(1)), vec![3]);
        assert_eq!(index.positions_eq(&TupleValue::Int(7)), Vec::<u32>::new());
    }

    #[test]
    fn group_key_skips_nulls() {
        let mut values = segment(&[4, 4]);
        values.push(None);
        let index = GroupKeyIndex::build(&values);
        assert_eq!(index.positions_eq(&TupleValue::Int(4)).len(), 2);
        // one dictionary entry, two offsets, two postings
        assert_eq!(index.memory_consumption(), 4 + 2 * 4 + 2 * 4);
    }

    #[test]
    fn btree_lookup() {
        let index = BTreeIndex::build(&segment(&[9, 2, 9]));
        assert_eq!(index.positions_eq(&TupleValue::Int(9)), vec![0, 2]);
        assert_eq!(index.positions_eq(&TupleValue::Int(3)), Vec::<u32>::new());
    }

    #[test]
    fn prediction_matches_built_group_key_for_fixed_width() {
        let values: Vec<i32> = (0..100).map(|i| i % 10).collect();
        let built = GroupKeyIndex::build(&segment(&values));
        let predicted = predict_memory_consumption(IndexType::GroupKey, 100, 10, 4);
        assert_eq!(built.memory_consumption(), predicted);
    }
}
