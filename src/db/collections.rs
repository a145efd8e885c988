use super::{Db, models::*, vec_table};
use chrono::Utc;
use rusqlite::{OptionalExtension, Result, params};

fn map_collection_row(row: &rusqlite::Row<'_>) -> Result<CollectionInfo> {
    Ok(CollectionInfo {
        id: row.get(0)?,
        name: row.get(1)?,
        model_name: row.get(2)?,
        dimensions: row.get::<_, i64>(3)? as usize,
        created_at: row.get(4)?,
    })
}

impl Db {
    /// Look up a collection by name.
    pub fn find_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.conn
            .query_row(
                "SELECT id, name, model_name, dimensions, created_at FROM collections WHERE name = ?",
                params![name],
                map_collection_row,
            )
            .optional()
    }

    /// Return the named collection, creating it (and its vector table) if missing.
    ///
    /// An existing collection is returned as stored; callers compare its
    /// `model_name`/`dimensions` against their embedder.
    pub fn ensure_collection(
        &mut self,
        name: &str,
        model_name: &str,
        dimensions: usize,
    ) -> Result<CollectionInfo> {
        if let Some(existing) = self.find_collection(name)? {
            return Ok(existing);
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO collections (name, model_name, dimensions, created_at) VALUES (?, ?, ?, ?)",
            params![name, model_name, dimensions as i64, Utc::now()],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(embedding FLOAT[{dimensions}]);",
            vec_table(id)
        ))?;
        tx.commit()?;

        self.find_collection(name)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// List every collection in the store.
    pub fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, model_name, dimensions, created_at FROM collections ORDER BY name",
        )?;
        let rows = stmt.query_map([], map_collection_row)?;
        rows.collect()
    }

    /// Drop a collection with all its chunks and vectors.
    ///
    /// Returns the number of chunks removed; a missing collection removes 0.
    pub fn clear_collection(&mut self, name: &str) -> Result<usize> {
        let Some(collection) = self.find_collection(name)? else {
            return Ok(0);
        };

        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM chunks WHERE collection_id = ?",
            params![collection.id],
        )?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", vec_table(collection.id)))?;
        tx.execute("DELETE FROM collections WHERE id = ?", params![collection.id])?;
        tx.commit()?;

        Ok(removed)
    }

    /// Count chunks and distinct pages in a collection.
    pub fn collection_stats(&self, collection: &CollectionInfo) -> Result<CollectionStats> {
        let (chunk_count, page_count): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT page_number) FROM chunks WHERE collection_id = ?",
            params![collection.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(CollectionStats {
            name: collection.name.clone(),
            model_name: collection.model_name.clone(),
            dimensions: collection.dimensions,
            chunk_count: chunk_count as usize,
            page_count: page_count as usize,
        })
    }
}
