use super::{Db, models::IndexMeta, serialize_vector};
use crate::knowledge::Place;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result, params};

/// Store an optional JSON value as text, keeping `None` as NULL.
fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(|v| v.to_string())
}

impl Db {
    /// Replaces the whole index with `places` and their embeddings.
    ///
    /// Runs in one transaction, so readers see either the old or the new
    /// index, never a mix.
    pub fn replace_places(
        &mut self,
        places: &[Place],
        embeddings: &[Vec<f32>],
        source: &str,
        modified_at: DateTime<Utc>,
    ) -> Result<()> {
        if places.len() != embeddings.len() {
            return Err(rusqlite::Error::InvalidParameterCount(
                embeddings.len(),
                places.len(),
            ));
        }

        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM vec_places", [])?;
        tx.execute("DELETE FROM places", [])?;

        for (i, (place, embedding)) in places.iter().zip(embeddings).enumerate() {
            tx.execute(
                r#"
                INSERT INTO places (position, name, kind, description, location, price, rating, state, city)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    i as i64,
                    place.name,
                    place.kind,
                    place.description,
                    place.location,
                    json_text(place.price.as_ref()),
                    place.rating.to_string(),
                    place.state,
                    place.city,
                ],
            )?;
            let place_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO vec_places (rowid, embedding) VALUES (?, ?)",
                params![place_id, serialize_vector(embedding)],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO index_meta (id, source, modified_at, place_count, dimensions, indexed_at)
            VALUES (1, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                modified_at = excluded.modified_at,
                place_count = excluded.place_count,
                dimensions = excluded.dimensions,
                indexed_at = CURRENT_TIMESTAMP
            "#,
            params![source, modified_at, places.len() as i64, self.dimensions as i64],
        )?;

        tx.commit()
    }

    /// Number of indexed places.
    pub fn place_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM places", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Metadata of the last successful indexing run, if any.
    pub fn index_meta(&self) -> Result<Option<IndexMeta>> {
        self.conn
            .query_row(
                "SELECT source, modified_at, place_count, dimensions FROM index_meta WHERE id = 1",
                [],
                |row| {
                    Ok(IndexMeta {
                        source: row.get(0)?,
                        modified_at: row.get(1)?,
                        place_count: row.get::<_, i64>(2)? as usize,
                        dimensions: row.get::<_, i64>(3)? as usize,
                    })
                },
            )
            .optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn place(name: &str, state: &str, city: &str) -> Place {
        Place {
            name: name.to_string(),
            kind: "attraction".to_string(),
            description: format!("{name} description"),
            location: "Old City".to_string(),
            price: None,
            rating: json!(4.1),
            state: state.to_string(),
            city: city.to_string(),
        }
    }

    #[test]
    fn test_replace_places_and_meta() {
        let mut db = Db::open_in_memory(4).unwrap();
        assert!(db.index_meta().unwrap().is_none());

        let places = vec![place("A", "Goa", "Panaji"), place("B", "Goa", "Margao")];
        let embeddings = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
        let now = Utc::now();
        db.replace_places(&places, &embeddings, "kb.json", now).unwrap();

        assert_eq!(db.place_count().unwrap(), 2);
        let meta = db.index_meta().unwrap().unwrap();
        assert_eq!(meta.source, "kb.json");
        assert_eq!(meta.place_count, 2);
        assert_eq!(meta.dimensions, 4);
        assert_eq!(meta.modified_at.timestamp(), now.timestamp());

        // Replacing drops the previous rows, vectors included
        db.replace_places(&places[..1], &embeddings[..1], "kb.json", now)
            .unwrap();
        assert_eq!(db.place_count().unwrap(), 1);
        let vec_rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM vec_places", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vec_rows, 1);
    }

    #[test]
    fn test_replace_places_length_mismatch() {
        let mut db = Db::open_in_memory(4).unwrap();
        let places = vec![place("A", "Goa", "Panaji")];
        let result = db.replace_places(&places, &[], "kb.json", Utc::now());
        assert!(result.is_err());
        assert_eq!(db.place_count().unwrap(), 0);
    }
}
