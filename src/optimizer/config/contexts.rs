//! Pricing-context loading.
//!
//! Two JSON inputs describe which spaces exist and their price ranges:
//!
//! ```json
//! // ranges file
//! [{"context_hash": "banner_us", "range": [0.1, 4.0]}]
//!
//! // space descriptions
//! [{"context_hash": "banner_us"}, {"context_hash": "video", "min_price": 1.0, "max_price": 20.0}]
//! ```
//!
//! A description takes its range from the ranges file when listed there,
//! otherwise from its own `min_price`/`max_price` (default `[0, 1]`).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::core::ContextsConfig;
use crate::errors::{ConfigError, Error, Result};

const DEFAULT_MIN_PRICE: f64 = 0.0;
const DEFAULT_MAX_PRICE: f64 = 1.0;

/// One entry of the ranges file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextRangeEntry {
    pub context_hash: String,
    pub range: [f64; 2],
}

/// One entry of the space-description list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpaceDescription {
    pub context_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

/// A resolved pricing context, ready for space construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSpec {
    pub context_id: String,
    pub min_price: f64,
    pub max_price: f64,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::json_parse(format!("{}: {e}", path.display())))
}

/// Load the context → `(min, max)` map.
pub fn load_context_ranges(path: impl AsRef<Path>) -> Result<HashMap<String, (f64, f64)>> {
    let entries: Vec<ContextRangeEntry> = read_json(path.as_ref())?;
    Ok(entries
        .into_iter()
        .map(|e| (e.context_hash, (e.range[0], e.range[1])))
        .collect())
}

pub fn load_space_descriptions(path: impl AsRef<Path>) -> Result<Vec<SpaceDescription>> {
    read_json(path.as_ref())
}

/// Merge descriptions with the ranges map. Duplicate contexts are rejected.
pub fn resolve_contexts(
    descriptions: &[SpaceDescription],
    ranges: &HashMap<String, (f64, f64)>,
) -> std::result::Result<Vec<ContextSpec>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    descriptions
        .iter()
        .map(|desc| {
            if !seen.insert(desc.context_hash.as_str()) {
                return Err(ConfigError::DuplicateContext(desc.context_hash.clone()));
            }
            let (min_price, max_price) = ranges.get(&desc.context_hash).copied().unwrap_or((
                desc.min_price.unwrap_or(DEFAULT_MIN_PRICE),
                desc.max_price.unwrap_or(DEFAULT_MAX_PRICE),
            ));
            Ok(ContextSpec {
                context_id: desc.context_hash.clone(),
                min_price,
                max_price,
            })
        })
        .collect()
}

/// Load and resolve every configured context.
pub fn load_contexts(config: &ContextsConfig) -> Result<Vec<ContextSpec>> {
    let ranges = match &config.ranges_file {
        Some(path) => load_context_ranges(path)?,
        None => HashMap::new(),
    };

    let descriptions = match &config.space_desc_file {
        Some(path) => load_space_descriptions(path)?,
        None if !config.spaces.is_empty() => config.spaces.clone(),
        None => return Err(ConfigError::MissingSpaceDescFile.into()),
    };

    Ok(resolve_contexts(&descriptions, &ranges)?)
}
