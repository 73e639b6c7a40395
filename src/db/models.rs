use chrono::{DateTime, Utc};

use crate::knowledge::Place;

/// A retrieved place and its L2 distance to the query vector.
#[derive(Debug, Clone)]
pub struct PlaceHit {
    pub place: Place,
    pub distance: f64,
}

/// What the current index was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub source: String,
    pub modified_at: DateTime<Utc>,
    pub place_count: usize,
    pub dimensions: usize,
}
