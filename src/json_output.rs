//! JSON export of profile snapshots
//!
//! The document is a [`ProfileSnapshot`] plus a `legend` mapping each tracked
//! class to its chart colour. Reading a document back ignores the legend.

use crate::error::Result;
use crate::palette::class_color;
use crate::profiler::ProfileSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Legend entry for one tracked class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonLegendEntry {
    pub class: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    format: &'static str,
    version: &'static str,
    #[serde(flatten)]
    snapshot: &'a ProfileSnapshot,
    legend: Vec<JsonLegendEntry>,
}

/// Legend in registration order
pub fn legend(snapshot: &ProfileSnapshot) -> Vec<JsonLegendEntry> {
    snapshot
        .tracked_classes
        .iter()
        .map(|class| JsonLegendEntry {
            class: class.clone(),
            color: class_color(class),
        })
        .collect()
}

/// Serialize a snapshot to pretty-printed JSON
pub fn to_json(snapshot: &ProfileSnapshot) -> Result<String> {
    let report = JsonReport {
        format: "frametrack-json-v1",
        version: env!("CARGO_PKG_VERSION"),
        snapshot,
        legend: legend(snapshot),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Parse a document written by [`to_json`]
pub fn from_json(json: &str) -> Result<ProfileSnapshot> {
    Ok(serde_json::from_str(json)?)
}

/// Colour per class, keyed by name
pub fn color_map(snapshot: &ProfileSnapshot) -> BTreeMap<String, String> {
    legend(snapshot)
        .into_iter()
        .map(|entry| (entry.class, entry.color))
        .collect()
}
