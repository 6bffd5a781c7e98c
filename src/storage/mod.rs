pub mod index;

use crate::types::{TupleValue, TupleValueType};

use self::index::{ChunkIndex, ColumnIndex, ColumnId, IndexInfo, IndexType};

/*
    In-memory chunked column store. A table is a sequence of chunks, each
    chunk stores one value vector per attribute. Rows are append-only; a new
    chunk is started once the current one reaches the table's chunk capacity.
    Secondary indexes are per-chunk structures over a single column and cover
    the chunk contents as of build time, which is fine for the index tuner:
    it periodically re-measures and rebuilds the index set anyway.
*/

#[derive(Debug)]
pub struct Table {
    attribute_types: Vec<TupleValueType>,
    chunk_capacity: usize,
    chunks: Vec<Chunk>,
}

#[derive(Debug)]
pub struct Chunk {
    segments: Vec<Vec<Option<TupleValue>>>,
    indexes: Vec<ChunkIndex>,
}

impl Chunk {
    fn new(n_attributes: usize) -> Chunk {
        Chunk {
            segments: vec![Vec::new(); n_attributes],
            indexes: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.segments.first().map(|s| s.len()).unwrap_or(0)
    }

    pub fn segment(&self, column_id: ColumnId) -> &[Option<TupleValue>] {
        &self.segments[column_id as usize]
    }

    pub fn get_index(&self, index_type: IndexType, column_ids: &[ColumnId]) -> Option<&ChunkIndex> {
        self.indexes
            .iter()
            .find(|i| i.index_type() == index_type && i.column_ids == column_ids)
    }
}

impl Table {
    pub fn new(attribute_types: Vec<TupleValueType>, chunk_capacity: usize) -> Table {
        assert!(chunk_capacity > 0);
        let n_attributes = attribute_types.len();
        Table {
            attribute_types,
            chunk_capacity,
            chunks: vec![Chunk::new(n_attributes)],
        }
    }

    pub fn attribute_types(&self) -> &[TupleValueType] {
        &self.attribute_types
    }

    pub fn append(&mut self, row: Vec<Option<TupleValue>>) {
        assert_eq!(row.len(), self.attribute_types.len());
        if self.chunks.last().unwrap().row_count() >= self.chunk_capacity {
            // Indexes already attached to the table cover the new chunk too
            let mut chunk = Chunk::new(self.attribute_types.len());
            for existing in self.chunks.last().unwrap().indexes.iter() {
                chunk.indexes.push(ChunkIndex {
                    column_ids: existing.column_ids.clone(),
                    index: ColumnIndex::build(existing.index_type(), &[]),
                });
            }
            self.chunks.push(chunk);
        }
        let chunk = self.chunks.last_mut().unwrap();
        for (segment, value) in chunk.segments.iter_mut().zip(row) {
            segment.push(value);
        }
    }

    pub fn row_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.row_count() as u64).sum()
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunks.len() as u64
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// All indexes present on this table, one entry per (column set, type)
    /// with the memory consumption summed over the chunks.
    pub fn indexes(&self) -> Vec<IndexInfo> {
        let mut infos: Vec<IndexInfo> = Vec::new();
        for chunk in &self.chunks {
            for chunk_index in &chunk.indexes {
                match infos.iter_mut().find(|i| {
                    i.column_ids == chunk_index.column_ids && i.index_type == chunk_index.index_type()
                }) {
                    Some(info) => info.memory_consumption += chunk_index.memory_consumption(),
                    None => infos.push(IndexInfo {
                        column_ids: chunk_index.column_ids.clone(),
                        index_type: chunk_index.index_type(),
                        memory_consumption: chunk_index.memory_consumption(),
                    }),
                }
            }
        }
        infos
    }

    pub fn has_index(&self, index_type: IndexType, column_ids: &[ColumnId]) -> bool {
        self.chunks
            .first()
            .map(|c| c.get_index(index_type, column_ids).is_some())
            .unwrap_or(false)
    }

    /// Builds the per-chunk index structures without touching the table.
    /// The result is attached under the caller's write lock via
    /// `attach_indexes`, keeping the exclusive section short.
    pub fn build_indexes(&self, index_type: IndexType, column_id: ColumnId) -> Vec<ChunkIndex> {
        self.chunks
            .iter()
            .map(|chunk| ChunkIndex {
                column_ids: vec![column_id],
                index: ColumnIndex::build(index_type, chunk.segment(column_id)),
            })
            .collect()
    }

    pub fn attach_indexes(&mut self, mut built: Vec<ChunkIndex>) {
        assert!(!built.is_empty());
        // Rows may have arrived between build and attach; index the chunks
        // the builder did not see while we hold the exclusive lock.
        let index_type = built[0].index_type();
        let column_id = built[0].column_ids[0];
        while built.len() < self.chunks.len() {
            let chunk = &self.chunks[built.len()];
            built.push(ChunkIndex {
                column_ids: vec![column_id],
                index: ColumnIndex::build(index_type, chunk.segment(column_id)),
            });
        }
        for (chunk, index) in self.chunks.iter_mut().zip(built) {
            chunk.indexes.push(index);
        }
    }

    /// Unlinks the matching index from every chunk. Returns false if no
    /// chunk carried it.
    pub fn remove_index(&mut self, index_type: IndexType, column_ids: &[ColumnId]) -> bool {
        let mut removed = false;
        for chunk in &mut self.chunks {
            let before = chunk.indexes.len();
            chunk
                .indexes
                .retain(|i| !(i.index_type() == index_type && i.column_ids == column_ids));
            removed |= chunk.indexes.len() < before;
        }
        removed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn int_table(chunk_capacity: usize) -> Table {
        Table::new(vec![TupleValueType::Int, TupleValueType::Int], chunk_capacity)
    }

    #[test]
    fn append_splits_into_chunks() {
        let mut table = int_table(4);
        for i in 0..10 {
            table.append(vec![Some(TupleValue::Int(i)), Some(TupleValue::Int(i % 3))]);
        }
        assert_eq!(table.row_count(), 10);
        assert_eq!(table.chunk_count(), 3);
        assert_eq!(table.chunks()[0].row_count(), 4);
        assert_eq!(table.chunks()[2].row_count(), 2);
    }

    #[test]
    fn build_and_remove_index() {
        let mut table = int_table(4);
        for i in 0..8 {
            table.append(vec![Some(TupleValue::Int(i)), Some(TupleValue::Int(i % 2))]);
        }
        let built = table.build_indexes(IndexType::GroupKey, 1);
        table.attach_indexes(built);
        assert!(table.has_index(IndexType::GroupKey, &[1]));

        let infos = table.indexes();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].column_ids, vec![1]);
        assert!(infos[0].memory_consumption > 0);

        assert!(table.remove_index(IndexType::GroupKey, &[1]));
        assert!(!table.has_index(IndexType::GroupKey, &[1]));
        assert!(!table.remove_index(IndexType::GroupKey, &[1]));
    }

    #[test]
    fn index_lookup_per_chunk() {
        let mut table = int_table(3);
        for i in 0..6 {
            table.append(vec![Some(TupleValue::Int(i)), Some(TupleValue::Int(7))]);
        }
        let built = table.build_indexes(IndexType::BTree, 1);
        table.attach_indexes(built);
        for chunk in table.chunks() {
            let index = chunk.get_index(IndexType::BTree, &[1]).unwrap();
            assert_eq!(index.index.positions_eq(&TupleValue::Int(7)).len(), 3);
        }
    }
}
