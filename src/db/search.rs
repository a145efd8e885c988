use super::{Db, models::CollectionInfo, serialize_vector, vec_table};
use rusqlite::{Result, params};
use serde::Serialize;

/// One ranked hit from a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk_id: i64,
    pub text: String,
    pub page_number: u32,
    pub chunk_index: usize,
    /// Cosine similarity clamped to `[0, 1]`; higher is closer.
    pub similarity_score: f64,
    /// Raw sqlite-vec cosine distance in `[0, 2]`.
    pub distance: f64,
}

/// Map a cosine distance to a similarity score in `[0, 1]`.
#[must_use]
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}

fn map_search_row(row: &rusqlite::Row<'_>) -> Result<SearchResult> {
    let distance: f64 = row.get(4)?;
    Ok(SearchResult {
        chunk_id: row.get(0)?,
        text: row.get(1)?,
        page_number: row.get(2)?,
        chunk_index: row.get::<_, i64>(3)? as usize,
        similarity_score: similarity_from_distance(distance),
        distance,
    })
}

impl Db {
    /// Vector similarity search using cosine distance.
    ///
    /// Equal distances are ordered by page, then position within the page.
    pub fn search(
        &self,
        collection: &CollectionInfo,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let query = format!(
            r#"
            SELECT
                c.id,
                c.content,
                c.page_number,
                c.chunk_index,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM {} v
            JOIN chunks c ON v.rowid = c.id
            WHERE c.collection_id = ?
            ORDER BY distance ASC, c.page_number ASC, c.chunk_index ASC
            LIMIT ?
            "#,
            vec_table(collection.id)
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(
            params![
                serialize_vector(query_vector),
                collection.id,
                top_k as i64
            ],
            map_search_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
