//! GeoJSON bounding-box input.
//!
//! The bounds file is a GeoJSON FeatureCollection where every feature carries
//! a `bbox` member. Only the boxes are used; geometries are ignored.

use std::path::Path;

use serde::Deserialize;

use crate::error::{StreamFilterError, StreamResult};

/// A geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Render this box as a filtered-stream rule clause.
    #[must_use]
    pub fn rule_clause(&self) -> String {
        format!(
            "bounding_box:[{} {} {} {}]",
            self.west, self.south, self.east, self.north
        )
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    bbox: Option<Vec<f64>>,
}

/// Read every feature's bounding box from a GeoJSON file.
pub fn read_bounding_boxes(path: &Path) -> StreamResult<Vec<BoundingBox>> {
    let raw = std::fs::read_to_string(path)?;
    parse_feature_collection(&raw)
}

fn parse_feature_collection(raw: &str) -> StreamResult<Vec<BoundingBox>> {
    let collection: FeatureCollection =
        serde_json::from_str(raw).map_err(|e| StreamFilterError::Geo(e.to_string()))?;

    if collection.kind != "FeatureCollection" {
        return Err(StreamFilterError::Geo(format!(
            "expected a FeatureCollection, got {:?}",
            collection.kind
        )));
    }

    if collection.features.is_empty() {
        return Err(StreamFilterError::Geo("no features present".into()));
    }

    collection
        .features
        .iter()
        .enumerate()
        .map(|(i, feature)| match feature.bbox.as_deref() {
            Some([west, south, east, north, ..]) => Ok(BoundingBox {
                west: *west,
                south: *south,
                east: *east,
                north: *north,
            }),
            Some(short) => Err(StreamFilterError::Geo(format!(
                "feature {i}: bbox has {} elements, need 4",
                short.len()
            ))),
            None => Err(StreamFilterError::Geo(format!("feature {i}: missing bbox"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DC_BBOX: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "bbox": [-77.119, 38.791, -76.909, 38.995],
                "properties": {"name": "Washington, DC"},
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn parses_feature_bboxes() {
        let boxes = parse_feature_collection(DC_BBOX).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].west, -77.119);
        assert_eq!(boxes[0].north, 38.995);
    }

    #[test]
    fn collects_all_features() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {"bbox": [-1.0, -1.0, 1.0, 1.0]},
                {"bbox": [10.0, 20.0, 30.0, 40.0]}
            ]
        }"#;
        let boxes = parse_feature_collection(raw).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1].south, 20.0);
    }

    #[test]
    fn rejects_non_feature_collection() {
        let raw = r#"{"type": "Feature", "bbox": [0.0, 0.0, 1.0, 1.0]}"#;
        let err = parse_feature_collection(raw).unwrap_err();
        assert!(matches!(err, StreamFilterError::Geo(_)));
    }

    #[test]
    fn rejects_feature_without_bbox() {
        let raw = r#"{"type": "FeatureCollection", "features": [{"geometry": null}]}"#;
        let err = parse_feature_collection(raw).unwrap_err();
        assert!(err.to_string().contains("missing bbox"));
    }

    #[test]
    fn rejects_short_bbox() {
        let raw = r#"{"type": "FeatureCollection", "features": [{"bbox": [1.0, 2.0]}]}"#;
        let err = parse_feature_collection(raw).unwrap_err();
        assert!(err.to_string().contains("need 4"));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_feature_collection("not geojson at all").unwrap_err();
        assert!(matches!(err, StreamFilterError::Geo(_)));
    }

    #[test]
    fn rule_clause_format() {
        let bbox = BoundingBox {
            west: -77.119,
            south: 38.791,
            east: -76.909,
            north: 38.995,
        };
        assert_eq!(
            bbox.rule_clause(),
            "bounding_box:[-77.119 38.791 -76.909 38.995]"
        );
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DC_BBOX.as_bytes()).unwrap();
        let boxes = read_bounding_boxes(file.path()).unwrap();
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_bounding_boxes(Path::new("/nonexistent/bounds.geojson")).unwrap_err();
        assert!(matches!(err, StreamFilterError::Io(_)));
    }
}
