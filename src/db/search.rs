use super::{Db, models::PlaceHit, serialize_vector};
use crate::knowledge::Place;
use rusqlite::{Result, params};

fn parse_json_column(idx: usize, text: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_hit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlaceHit> {
    let price: Option<String> = row.get(5)?;
    let rating: String = row.get(6)?;

    Ok(PlaceHit {
        place: Place {
            name: row.get(0)?,
            kind: row.get(1)?,
            description: row.get(2)?,
            location: row.get(3)?,
            price: price.as_deref().map(|p| parse_json_column(5, p)).transpose()?,
            rating: parse_json_column(6, &rating)?,
            state: row.get(7)?,
            city: row.get(8)?,
        },
        distance: row.get(4)?,
    })
}

impl Db {
    /// Exact nearest-neighbour search by L2 distance, closest first.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<PlaceHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                p.name,
                p.kind,
                p.description,
                p.location,
                vec_distance_l2(v.embedding, ?) AS distance,
                p.price,
                p.rating,
                p.state,
                p.city
            FROM vec_places v
            JOIN places p ON v.rowid = p.id
            ORDER BY distance ASC, p.position ASC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            map_hit_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
