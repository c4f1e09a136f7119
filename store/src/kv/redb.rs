use std::path::Path;

use redb::{Database, DatabaseError, ReadableTable, TableDefinition};

use super::{Backend, KVError, KVResult, storage_err};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("faceid");

/// A persistent [`Backend`] backed by a single redb database file.
///
/// Every write runs in its own write transaction, so `batch_set` commits
/// all of its entries or none of them. The file is locked for as long as
/// the backend lives.
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open or create the database at `path`.
    ///
    /// Fails with [`KVError::Locked`] if the file is already open.
    pub fn open<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => KVError::Locked(path.display().to_string()),
            e => storage_err(e),
        })?;

        // Make sure the table exists so read transactions never miss it.
        let tx = db.begin_write().map_err(storage_err)?;
        tx.open_table(TABLE).map_err(storage_err)?;
        tx.commit().map_err(storage_err)?;

        Ok(Self { db })
    }
}

impl Backend for RedbBackend {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let table = tx.open_table(TABLE).map_err(storage_err)?;
        let value = table.get(key).map_err(storage_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.batch_set(&[(key, value)])
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()> {
        let tx = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = tx.open_table(TABLE).map_err(storage_err)?;
            for (key, value) in entries {
                table.insert(*key, *value).map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let table = tx.open_table(TABLE).map_err(storage_err)?;

        let mut results = Vec::new();
        for item in table.range(prefix..).map_err(storage_err)? {
            let (key, value) = item.map_err(storage_err)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_string(), value.value().to_vec()));
        }
        Ok(results)
    }
}
