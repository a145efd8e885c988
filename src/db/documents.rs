use super::{Db, models::*, serialize_vector, vec_table};
use chrono::Utc;
use rusqlite::{Result, params};
use serde::Serialize;
use std::collections::HashSet;

/// A chunk as stored, without its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredChunk {
    pub id: i64,
    pub chunk_key: String,
    pub page_number: u32,
    pub chunk_index: usize,
    pub content: String,
}

impl Db {
    /// Return the subset of `keys` already stored in the collection.
    pub fn existing_chunk_keys(
        &self,
        collection: &CollectionInfo,
        keys: &[&str],
    ) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM chunks WHERE collection_id = ? AND chunk_key = ?")?;

        let mut found = HashSet::new();
        for key in keys {
            if stmt.exists(params![collection.id, key])? {
                found.insert((*key).to_string());
            }
        }
        Ok(found)
    }

    /// Insert chunk rows and their vectors in one transaction.
    ///
    /// Either every record of the slice is committed or none is.
    pub fn insert_chunks(
        &mut self,
        collection: &CollectionInfo,
        records: &[ChunkRecord<'_>],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let now = Utc::now();
        let vec_insert = format!(
            "INSERT INTO {} (rowid, embedding) VALUES (?, ?)",
            vec_table(collection.id)
        );

        for record in records {
            tx.execute(
                "INSERT INTO chunks (collection_id, chunk_key, page_number, chunk_index, content, indexed_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    collection.id,
                    record.chunk_key,
                    record.page_number,
                    record.chunk_index as i64,
                    record.content,
                    now,
                ],
            )?;
            let chunk_id = tx.last_insert_rowid();

            let vector_blob = serialize_vector(record.embedding);
            tx.execute(&vec_insert, params![chunk_id, vector_blob])?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    /// All chunks of a collection in document order.
    pub fn list_chunks(&self, collection: &CollectionInfo) -> Result<Vec<StoredChunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, chunk_key, page_number, chunk_index, content FROM chunks
             WHERE collection_id = ? ORDER BY page_number, chunk_index, id",
        )?;
        let rows = stmt.query_map(params![collection.id], |row| {
            Ok(StoredChunk {
                id: row.get(0)?,
                chunk_key: row.get(1)?,
                page_number: row.get(2)?,
                chunk_index: row.get::<_, i64>(3)? as usize,
                content: row.get(4)?,
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(
        key: &'a str,
        page: u32,
        content: &'a str,
        embedding: &'a [f32],
    ) -> ChunkRecord<'a> {
        ChunkRecord {
            chunk_key: key,
            page_number: page,
            chunk_index: 0,
            content,
            embedding,
        }
    }

    #[test]
    fn test_insert_and_list_chunks() {
        let mut db = Db::open_in_memory().unwrap();
        let collection = db.ensure_collection("manual", "mock", 3).unwrap();

        let inserted = db
            .insert_chunks(
                &collection,
                &[
                    record("b", 2, "Second page", &[0.0, 1.0, 0.0]),
                    record("a", 1, "First page", &[1.0, 0.0, 0.0]),
                ],
            )
            .unwrap();
        assert_eq!(inserted, 2);

        let chunks = db.list_chunks(&collection).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_number, 1);
        assert_eq!(chunks[0].content, "First page");
        assert_eq!(chunks[1].page_number, 2);

        let vec_rows: i64 = db
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", vec_table(collection.id)),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(vec_rows, 2);
    }

    #[test]
    fn test_existing_chunk_keys() {
        let mut db = Db::open_in_memory().unwrap();
        let collection = db.ensure_collection("manual", "mock", 2).unwrap();
        db.insert_chunks(&collection, &[record("known", 1, "text", &[1.0, 0.0])])
            .unwrap();

        let found = db
            .existing_chunk_keys(&collection, &["known", "unknown"])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains("known"));
    }

    #[test]
    fn test_dimension_mismatch_rolls_back_whole_batch() {
        let mut db = Db::open_in_memory().unwrap();
        let collection = db.ensure_collection("manual", "mock", 4).unwrap();

        let result = db.insert_chunks(
            &collection,
            &[
                record("ok", 1, "fits", &[1.0, 0.0, 0.0, 0.0]),
                record("bad", 1, "too short", &[1.0, 0.0]),
            ],
        );
        assert!(result.is_err());

        // Neither the good row nor a dangling chunk row survives.
        assert!(db.list_chunks(&collection).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut db = Db::open_in_memory().unwrap();
        let collection = db.ensure_collection("manual", "mock", 2).unwrap();
        db.insert_chunks(&collection, &[record("same", 1, "text", &[1.0, 0.0])])
            .unwrap();
        assert!(
            db.insert_chunks(&collection, &[record("same", 1, "text", &[1.0, 0.0])])
                .is_err()
        );
    }
}
