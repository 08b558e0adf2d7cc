use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoordError {
    #[error("empty coordinate string")]
    Empty,
    #[error("digit portion must be 6 (DDMMSS) or 7 (DDDMMSS) digits, got {0}")]
    BadLength(usize),
    #[error("direction must be one of N/S/E/W, got '{0}'")]
    BadDirection(char),
    #[error("non-digit character in coordinate '{0}'")]
    BadDigits(String),
}

/// Convert a DMS coordinate string ("DDMMSS" + N/S or "DDDMMSS" + E/W)
/// into signed decimal degrees, rounded to 4 decimal places.
pub fn dms_to_decimal(input: &str) -> Result<f64, CoordError> {
    let s = input.trim();
    let mut chars = s.chars();
    let direction = chars.next_back().ok_or(CoordError::Empty)?;
    let digits = chars.as_str();

    if !matches!(direction, 'N' | 'S' | 'E' | 'W') {
        return Err(CoordError::BadDirection(direction));
    }
    if digits.is_empty() || digits.bytes().any(|b| !b.is_ascii_digit()) {
        return Err(CoordError::BadDigits(s.to_string()));
    }

    // 6 digits = latitude (DDMMSS), 7 digits = longitude (DDDMMSS)
    let deg_len = match digits.len() {
        6 => 2,
        7 => 3,
        n => return Err(CoordError::BadLength(n)),
    };

    let parse = |part: &str| -> Result<f64, CoordError> {
        part.parse::<f64>()
            .map_err(|_| CoordError::BadDigits(s.to_string()))
    };
    let degrees = parse(&digits[..deg_len])?;
    let minutes = parse(&digits[deg_len..deg_len + 2])?;
    let seconds = parse(&digits[deg_len + 2..])?;

    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if matches!(direction, 'S' | 'W') {
        decimal = -decimal;
    }

    Ok((decimal * 10_000.0).round() / 10_000.0)
}

// ── GeoJSON shapes ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crs: Option<serde_json::Value>,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: WaypointProperties,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointProperties {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name1: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// [longitude, latitude]
    pub coordinates: [f64; 2],
}

impl FeatureCollection {
    pub fn empty() -> Self {
        FeatureCollection {
            kind: "FeatureCollection".to_string(),
            crs: None,
            features: Vec::new(),
        }
    }

    fn sort_by_id(&mut self) {
        self.features
            .sort_by(|a, b| a.properties.id.cmp(&b.properties.id));
    }
}

/// Build a Point feature from DMS coordinate strings.
pub fn waypoint_feature(
    id: &str,
    name1: &str,
    kind: &str,
    lat_dms: &str,
    lon_dms: &str,
) -> Result<Feature, CoordError> {
    let lat = dms_to_decimal(lat_dms)?;
    let lon = dms_to_decimal(lon_dms)?;
    Ok(Feature {
        kind: "Feature".to_string(),
        properties: WaypointProperties {
            id: id.to_string(),
            kind: kind.to_string(),
            name1: name1.to_string(),
        },
        geometry: Geometry {
            kind: "Point".to_string(),
            coordinates: [lon, lat],
        },
    })
}

/// Insert a feature unless its id already exists; keeps the collection
/// sorted by id. Returns false when the id was a duplicate.
pub fn add_waypoint(collection: &mut FeatureCollection, feature: Feature) -> bool {
    let exists = collection
        .features
        .iter()
        .any(|f| f.properties.id == feature.properties.id);
    if exists {
        return false;
    }
    collection.features.push(feature);
    collection.sort_by_id();
    true
}

pub struct MergeStats {
    pub added: usize,
    pub duplicates: usize,
}

/// Fold `src` into `dst`, skipping duplicate ids, then sort by id.
pub fn merge_collections(dst: &mut FeatureCollection, src: FeatureCollection) -> MergeStats {
    let mut seen: HashSet<String> = dst
        .features
        .iter()
        .map(|f| f.properties.id.clone())
        .collect();

    let mut stats = MergeStats {
        added: 0,
        duplicates: 0,
    };
    for feature in src.features {
        if seen.insert(feature.properties.id.clone()) {
            dst.features.push(feature);
            stats.added += 1;
        } else {
            stats.duplicates += 1;
        }
    }
    dst.sort_by_id();
    stats
}

pub fn load_collection(path: &Path) -> Result<FeatureCollection> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let collection: FeatureCollection = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;
    Ok(collection)
}

pub fn save_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let json = serde_json::to_string_pretty(collection)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
