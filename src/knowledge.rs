//! Static knowledge base of places, grouped as `state > city > places`.
//!
//! The file is flattened into a list of [`Place`]s, each stamped with the
//! state and city it was listed under. This list is what gets embedded and
//! returned to clients as `sources`.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single place from the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<serde_json::Value>,
    /// Number or string in the source data; kept as given.
    pub rating: serde_json::Value,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Deserialize)]
struct CityEntry {
    #[serde(default)]
    places: Vec<Place>,
}

impl Place {
    /// Text that gets embedded; the location prefix helps retrieval for
    /// queries that only name a city or state.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!("In {}, {}: {}", self.city, self.state, self.description)
    }

    /// One line of the knowledge-base context handed to the LLM.
    #[must_use]
    pub fn context_line(&self) -> String {
        format!(
            "- {} in {}, {} ({}): {} | Location: {} | Price: {} | Rating: {}",
            self.name,
            self.city,
            self.state,
            self.kind,
            self.description,
            self.location,
            DisplayValue(self.price.as_ref().unwrap_or(&serde_json::Value::Null)),
            DisplayValue(&self.rating),
        )
    }

    /// Whether the place matches the optional state and city filters,
    /// compared case-insensitively. Empty filters match everything.
    #[must_use]
    pub fn matches_location(&self, state: Option<&str>, city: Option<&str>) -> bool {
        let matches = |filter: Option<&str>, value: &str| match filter.map(str::trim) {
            None | Some("") => true,
            Some(f) => f.to_lowercase() == value.to_lowercase(),
        };
        matches(state, &self.state) && matches(city, &self.city)
    }
}

struct DisplayValue<'a>(&'a serde_json::Value);

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            serde_json::Value::Null => f.write_str("N/A"),
            other => write!(f, "{other}"),
        }
    }
}

/// Parse knowledge-base JSON and flatten it into places.
///
/// Relies on serde_json's `preserve_order` so states and cities come out in
/// file order.
pub fn parse_knowledge_base(json: &str) -> Result<Vec<Place>> {
    let states: Map<String, Value> = serde_json::from_str(json)
        .context("knowledge base is not valid state > city > places JSON")?;

    let mut places = Vec::new();
    for (state, cities) in states {
        let Value::Object(cities) = cities else {
            anyhow::bail!("state \"{state}\" must map city names to objects");
        };
        for (city, entry) in cities {
            let entry: CityEntry = serde_json::from_value(entry)
                .with_context(|| format!("invalid places for {city}, {state}"))?;
            for mut place in entry.places {
                place.state = state.clone();
                place.city = city.clone();
                places.push(place);
            }
        }
    }
    Ok(places)
}

/// Load and flatten the knowledge-base file.
pub fn load_knowledge_base(path: &Path) -> Result<Vec<Place>> {
    if !path.exists() {
        anyhow::bail!(
            "{} not found. Create it with the state > city > places structure.",
            path.display()
        );
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read knowledge base: {}", path.display()))?;
    parse_knowledge_base(&data).with_context(|| format!("in {}", path.display()))
}

/// Keep only places matching the optional state and city.
#[must_use]
pub fn filter_by_location(
    places: Vec<Place>,
    state: Option<&str>,
    city: Option<&str>,
) -> Vec<Place> {
    places
        .into_iter()
        .filter(|p| p.matches_location(state, city))
        .collect()
}

/// Count places per state, for startup logging.
#[must_use]
pub fn places_per_state(places: &[Place]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for p in places {
        *counts.entry(p.state.as_str()).or_insert(0) += 1;
    }
    counts
}
