use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::statistics::{estimate_selectivity, ColumnStatistics};
use crate::storage::index::{ColumnId, IndexInfo, IndexType};
use crate::storage::Table;
use crate::types::{PredicateOp, TupleValue, TupleValueType};

/*
    The catalog is the durable surface the index tuner reads and mutates:
    it lists tables and their live secondary indexes (with measured memory)
    and owns the create/drop mutators. Table data and statistics sit behind
    one RwLock per table; index creation builds the per-chunk structures
    under the shared lock and swaps them in under a short exclusive lock.
*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDesc {
    pub id: ColumnId,
    pub name: String,
    pub data_type: TupleValueType,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct TableDesc {
    pub id: u32,
    pub name: String,
    pub attributes: Vec<AttributeDesc>,
}

impl TableDesc {
    pub fn get_attribute_by_name(&self, name: &str) -> Option<&AttributeDesc> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_attribute_by_id(&self, id: ColumnId) -> Option<&AttributeDesc> {
        self.attributes.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("table '{table}' has no column {column_id}")]
    ColumnNotFound { table: String, column_id: ColumnId },
    #[error("index {index_type} on '{table}' {column_ids:?} already exists")]
    IndexAlreadyExists { table: String, column_ids: Vec<ColumnId>, index_type: IndexType },
    #[error("index {index_type} on '{table}' {column_ids:?} does not exist")]
    IndexNotFound { table: String, column_ids: Vec<ColumnId>, index_type: IndexType },
    #[error("only single column index keys are supported, got {0:?}")]
    UnsupportedIndexKey(Vec<ColumnId>),
}

#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    tables: RwLock<BTreeMap<String, Arc<CatalogTable>>>,
    table_id_counter: AtomicU32,
}

pub struct CatalogTable {
    desc: TableDesc,
    data: RwLock<TableData>,
}

struct TableData {
    store: Table,
    column_statistics: Vec<ColumnStatistics>,
}

impl CatalogTable {
    pub fn desc(&self) -> &TableDesc {
        &self.desc
    }

    pub fn append_row(&self, row: Vec<Option<TupleValue>>) {
        let mut data = self.data.write();
        for (statistics, value) in data.column_statistics.iter_mut().zip(row.iter()) {
            statistics.observe(value);
        }
        data.store.append(row);
    }

    pub fn row_count(&self) -> u64 {
        self.data.read().store.row_count()
    }

    pub fn chunk_count(&self) -> u64 {
        self.data.read().store.chunk_count()
    }

    pub fn indexes(&self) -> Vec<IndexInfo> {
        self.data.read().store.indexes()
    }

    pub fn distinct_count(&self, column_id: ColumnId) -> Option<u64> {
        self.data
            .read()
            .column_statistics
            .get(column_id as usize)
            .map(|s| s.distinct_count())
    }

    /// Declared width for fixed width columns, measured average otherwise.
    pub fn column_byte_width(&self, column_id: ColumnId) -> Option<u64> {
        let attribute = self.desc.get_attribute_by_id(column_id)?;
        match attribute.data_type.get_size() {
            Some(size) => Some(size as u64),
            None => {
                let data = self.data.read();
                data.column_statistics.get(column_id as usize).map(|s| s.average_byte_width())
            }
        }
    }

    pub fn selectivity(
        &self,
        column_id: ColumnId,
        op: PredicateOp,
        literal: Option<&TupleValue>,
    ) -> Option<f32> {
        let data = self.data.read();
        let statistics = data.column_statistics.get(column_id as usize)?;
        Some(estimate_selectivity(statistics, data.store.row_count(), op, literal))
    }
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog {
            inner: Arc::new(CatalogInner {
                tables: RwLock::new(BTreeMap::new()),
                table_id_counter: AtomicU32::new(0),
            }),
        }
    }

    pub fn create_table(
        &self,
        name: &str,
        attributes: Vec<AttributeDesc>,
        chunk_capacity: usize,
    ) -> Result<Arc<CatalogTable>, CatalogError> {
        let mut tables = self.inner.tables.write();
        if tables.contains_key(name) {
            return Err(CatalogError::TableAlreadyExists(name.to_string()));
        }
        let id = self.inner.table_id_counter.fetch_add(1, Ordering::Relaxed);
        let attribute_types = attributes.iter().map(|a| a.data_type).collect();
        let column_statistics = attributes.iter().map(|_| ColumnStatistics::new()).collect();
        let table = Arc::new(CatalogTable {
            desc: TableDesc { id, name: name.to_string(), attributes },
            data: RwLock::new(TableData {
                store: Table::new(attribute_types, chunk_capacity),
                column_statistics,
            }),
        });
        tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.inner.tables.read().keys().cloned().collect()
    }

    pub fn table(&self, name: &str) -> Option<Arc<CatalogTable>> {
        self.inner.tables.read().get(name).cloned()
    }

    fn table_or_err(&self, name: &str) -> Result<Arc<CatalogTable>, CatalogError> {
        self.table(name).ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn create_index(
        &self,
        table_name: &str,
        column_ids: &[ColumnId],
        index_type: IndexType,
    ) -> Result<(), CatalogError> {
        let table = self.table_or_err(table_name)?;
        let column_id = match column_ids {
            [single] => *single,
            other => return Err(CatalogError::UnsupportedIndexKey(other.to_vec())),
        };
        if table.desc.get_attribute_by_id(column_id).is_none() {
            return Err(CatalogError::ColumnNotFound {
                table: table_name.to_string(),
                column_id,
            });
        }
        // Build off to the side under the shared lock, attach under the
        // exclusive one. Concurrent creates of the same index are resolved
        // by the re-check before attaching.
        let built = {
            let data = table.data.read();
            if data.store.has_index(index_type, column_ids) {
                return Err(already_exists(table_name, column_ids, index_type));
            }
            data.store.build_indexes(index_type, column_id)
        };
        let mut data = table.data.write();
        if data.store.has_index(index_type, column_ids) {
            return Err(already_exists(table_name, column_ids, index_type));
        }
        data.store.attach_indexes(built);
        Ok(())
    }

    pub fn drop_index(
        &self,
        table_name: &str,
        column_ids: &[ColumnId],
        index_type: IndexType,
    ) -> Result<(), CatalogError> {
        let table = self.table_or_err(table_name)?;
        let mut data = table.data.write();
        if data.store.remove_index(index_type, column_ids) {
            Ok(())
        } else {
            Err(CatalogError::IndexNotFound {
                table: table_name.to_string(),
                column_ids: column_ids.to_vec(),
                index_type,
            })
        }
    }

    /// Total memory of all live secondary indexes in bytes.
    pub fn total_index_memory(&self) -> u64 {
        self.list_tables()
            .iter()
            .filter_map(|name| self.table(name))
            .flat_map(|table| table.indexes())
            .map(|info| info.memory_consumption)
            .sum()
    }
}

fn already_exists(table: &str, column_ids: &[ColumnId], index_type: IndexType) -> CatalogError {
    CatalogError::IndexAlreadyExists {
        table: table.to_string(),
        column_ids: column_ids.to_vec(),
        index_type,
    }
}


#[cfg(test)]
mod test {
    use super::test_util::*;
    use super::*;

    #[test]
    fn create_and_list_tables() {
        let catalog = Catalog::new();
        catalog.create_table("b_table", int_attributes(&["x"]), 16).unwrap();
        catalog.create_table("a_table", int_attributes(&["x"]), 16).unwrap();
        assert_eq!(catalog.list_tables(), vec!["a_table".to_string(), "b_table".to_string()]);
        assert!(matches!(
            catalog.create_table("a_table", int_attributes(&["x"]), 16),
            Err(CatalogError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn statistics_follow_inserts() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 100, 10, 2);
        let table = catalog.table("t").unwrap();
        assert_eq!(table.row_count(), 100);
        assert_eq!(table.chunk_count(), 2);
        let distinct = table.distinct_count(1).unwrap();
        assert!((8..=12).contains(&distinct), "distinct estimate was {}", distinct);
        let sel = table.selectivity(1, PredicateOp::Equals, Some(&TupleValue::Int(3))).unwrap();
        assert!((sel - 0.1).abs() < 0.02, "selectivity was {}", sel);
    }

    #[test]
    fn index_lifecycle() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 100, 10, 2);

        catalog.create_index("t", &[1], IndexType::GroupKey).unwrap();
        let infos = catalog.table("t").unwrap().indexes();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].index_type, IndexType::GroupKey);
        assert!(infos[0].memory_consumption > 0);
        assert_eq!(catalog.total_index_memory(), infos[0].memory_consumption);

        assert!(matches!(
            catalog.create_index("t", &[1], IndexType::GroupKey),
            Err(CatalogError::IndexAlreadyExists { .. })
        ));

        catalog.drop_index("t", &[1], IndexType::GroupKey).unwrap();
        assert!(catalog.table("t").unwrap().indexes().is_empty());
        assert!(matches!(
            catalog.drop_index("t", &[1], IndexType::GroupKey),
            Err(CatalogError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn create_index_validates_input() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 10, 2, 1);
        assert!(matches!(
            catalog.create_index("missing", &[0], IndexType::GroupKey),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(matches!(
            catalog.create_index("t", &[9], IndexType::GroupKey),
            Err(CatalogError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            catalog.create_index("t", &[0, 1], IndexType::GroupKey),
            Err(CatalogError::UnsupportedIndexKey(_))
        ));
    }

    #[test]
    fn byte_width_fixed_and_variable() {
        let catalog = Catalog::new();
        let attributes = vec![
            AttributeDesc { id: 0, name: "n".to_string(), data_type: TupleValueType::Int, nullable: false },
            AttributeDesc { id: 1, name: "s".to_string(), data_type: TupleValueType::VarChar(64), nullable: false },
        ];
        catalog.create_table("t", attributes, 16).unwrap();
        let table = catalog.table("t").unwrap();
        table.append_row(vec![
            Some(TupleValue::Int(1)),
            Some(TupleValue::String("abcdef".to_string())),
        ]);
        table.append_row(vec![
            Some(TupleValue::Int(2)),
            Some(TupleValue::String("ab".to_string())),
        ]);
        assert_eq!(table.column_byte_width(0), Some(4));
        assert_eq!(table.column_byte_width(1), Some(4));
    }
}
