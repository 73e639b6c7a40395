//! Vector index over knowledge-base places, using SQLite and sqlite-vec
use rusqlite::{Connection, OptionalExtension, Result};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use tracing::{info, warn};

pub mod models;
pub mod places;
pub mod search;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS places (
    id INTEGER PRIMARY KEY,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    description TEXT NOT NULL,
    location TEXT NOT NULL,
    price TEXT,
    rating TEXT NOT NULL,
    state TEXT NOT NULL,
    city TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_places_state ON places(state);
CREATE INDEX IF NOT EXISTS idx_places_city ON places(city);

CREATE TABLE IF NOT EXISTS index_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    source TEXT NOT NULL,
    modified_at DATETIME NOT NULL,
    place_count INTEGER NOT NULL,
    dimensions INTEGER NOT NULL,
    indexed_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection initialized with sqlite-vec and the places schema.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open the index at `path` for vectors of the given dimensionality.
    ///
    /// An index built for a different dimensionality is dropped so the next
    /// indexing run rebuilds it.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening place index: {}", path.display());
        init_sqlite_vec();
        Self::init(Connection::open(path)?, dimensions)
    }

    /// Open an in-memory index (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        Self::init(Connection::open_in_memory()?, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;

        let stored: Option<i64> = conn
            .query_row("SELECT dimensions FROM index_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        // The vec0 table can outlive a failed first index run with no meta row.
        let stale = [declared_dimensions(&conn)?, stored.map(|d| d as usize)]
            .into_iter()
            .flatten()
            .find(|&d| d != dimensions);
        if let Some(stale) = stale {
            warn!("Index was built for {stale} dimensions, now {dimensions}; clearing it");
            conn.execute_batch(
                "DROP TABLE IF EXISTS vec_places; DELETE FROM places; DELETE FROM index_meta;",
            )?;
        }

        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_places USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        Ok(Self { conn, dimensions })
    }

    /// Dimensionality of the stored vectors.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Width of the existing `vec_places` table, read from its schema.
fn declared_dimensions(conn: &Connection) -> Result<Option<usize>> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE name = 'vec_places'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(sql.as_deref().and_then(parse_float_width))
}

fn parse_float_width(sql: &str) -> Option<usize> {
    let upper = sql.to_ascii_uppercase();
    let start = upper.find("FLOAT[")? + "FLOAT[".len();
    let end = start + upper[start..].find(']')?;
    upper[start..end].trim().parse().ok()
}

/// Serialize a float32 vector into little-endian bytes for the vec0 table.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
