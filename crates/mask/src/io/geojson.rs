use std::{collections::BTreeMap, path::Path};

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{json, Map};

use crate::{
    error::{MaskError, Result},
    types::{MaskGeometry, Polygon},
};

impl MaskGeometry {
    /// One GeoJSON feature per polygon. Holes are exported as their own
    /// features, the same way they are stored.
    pub fn to_features(&self, object_id: usize, score: Option<f64>) -> Vec<Feature> {
        self.polygons
            .iter()
            .map(|polygon| {
                let mut properties = Map::new();
                properties.insert("object_id".to_string(), json!(object_id));
                properties.insert("area".to_string(), json!(self.area));
                if let Some(score) = score {
                    properties.insert("score".to_string(), json!(score));
                }

                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Polygon(vec![closed_ring(polygon)]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect()
    }
}

/// GeoJSON rings repeat their first position at the end
fn closed_ring(polygon: &Polygon) -> Vec<Vec<f64>> {
    let mut ring: Vec<Vec<f64>> = polygon.points().iter().map(|&[x, y]| vec![x, y]).collect();
    if let Some(first) = ring.first().cloned() {
        ring.push(first);
    }
    ring
}

/// Export the geometry of every object in an image as one feature collection.
///
/// `scores`, when given, is indexed like `geometries`.
pub fn to_feature_collection(geometries: &[MaskGeometry], scores: Option<&[f64]>) -> FeatureCollection {
    let features = geometries
        .iter()
        .enumerate()
        .flat_map(|(i, geometry)| {
            let score = scores.and_then(|s| s.get(i).copied());
            geometry.to_features(i, score)
        })
        .collect();

    let mut foreign_members = Map::new();
    foreign_members.insert("object_count".to_string(), json!(geometries.len()));

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    }
}

/// Export to GeoJSON and serialize to a JSON string
pub fn to_geojson_string(geometries: &[MaskGeometry], scores: Option<&[f64]>) -> Result<String> {
    let collection = to_feature_collection(geometries, scores);
    Ok(serde_json::to_string_pretty(&collection)?)
}

/// Save GeoJSON to file
pub fn save_geojson(path: impl AsRef<Path>, geometries: &[MaskGeometry], scores: Option<&[f64]>) -> Result<()> {
    std::fs::write(path, to_geojson_string(geometries, scores)?)?;
    Ok(())
}

/// Upper bound on the object count an imported collection may declare
pub const MAX_IMPORTED_OBJECTS: usize = 100_000;

/// Rebuild per-object geometry from a feature collection written by
/// [`to_feature_collection`]. Objects without polygons cannot be recovered
/// unless `object_count` is present.
pub fn from_geojson_string(geojson_str: &str) -> Result<Vec<MaskGeometry>> {
    let collection: FeatureCollection = geojson_str.parse()?;

    let mut objects: BTreeMap<usize, MaskGeometry> = BTreeMap::new();
    for feature in &collection.features {
        let properties = feature
            .properties
            .as_ref()
            .ok_or_else(|| MaskError::GeometricComputation("Feature without properties".to_string()))?;
        let object_id = properties
            .get("object_id")
            .and_then(|v| v.as_u64())
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&id| id < MAX_IMPORTED_OBJECTS)
            .ok_or_else(|| MaskError::GeometricComputation("Missing or invalid object_id".to_string()))?;
        let area = properties
            .get("area")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| MaskError::GeometricComputation("Missing or invalid area".to_string()))?;

        let Some(Value::Polygon(rings)) = feature.geometry.as_ref().map(|g| &g.value) else {
            return Err(MaskError::GeometricComputation("Expected Polygon geometry".to_string()));
        };

        let entry = objects.entry(object_id).or_insert_with(|| MaskGeometry::area_only(area));
        for ring in rings {
            let mut points: Vec<[f64; 2]> = ring
                .iter()
                .filter(|position| position.len() >= 2)
                .map(|position| [position[0], position[1]])
                .collect();
            if points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            let polygon = Polygon::new(points)
                .ok_or_else(|| MaskError::GeometricComputation("Ring with fewer than 3 positions".to_string()))?;
            entry.polygons.push(polygon);
        }
    }

    let highest = objects.keys().next_back().map_or(0, |&last| last + 1);
    let object_count = match collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("object_count"))
    {
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= MAX_IMPORTED_OBJECTS)
            .ok_or_else(|| MaskError::GeometricComputation(format!("Invalid object_count {value}")))?,
        None => highest,
    };
    if highest > object_count {
        return Err(MaskError::GeometricComputation(format!(
            "object_id {} is outside object_count {object_count}",
            highest - 1
        )));
    }

    Ok((0..object_count)
        .map(|i| objects.remove(&i).unwrap_or_default())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(offset: f64) -> Polygon {
        Polygon::new(vec![
            [offset, offset],
            [offset, offset + 4.0],
            [offset + 4.0, offset + 4.0],
            [offset + 4.0, offset],
        ])
        .unwrap()
    }

    fn sample() -> Vec<MaskGeometry> {
        vec![
            MaskGeometry {
                polygons: vec![square(0.0), square(1.0)],
                area: 21.0,
            },
            MaskGeometry::area_only(0.0),
            MaskGeometry {
                polygons: vec![square(10.0)],
                area: 25.0,
            },
        ]
    }

    #[test]
    fn test_every_polygon_becomes_a_closed_feature() {
        let collection = to_feature_collection(&sample(), Some(&[0.9, 0.8, 0.7]));
        assert_eq!(collection.features.len(), 3);

        let feature = &collection.features[2];
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["object_id"], json!(2));
        assert_eq!(properties["area"], json!(25.0));
        assert_eq!(properties["score"], json!(0.7));

        let Some(Value::Polygon(rings)) = feature.geometry.as_ref().map(|g| &g.value) else {
            panic!("expected polygon geometry");
        };
        assert_eq!(rings[0].len(), 5);
        assert_eq!(rings[0].first(), rings[0].last());
    }

    #[test]
    fn test_scores_are_optional() {
        let collection = to_feature_collection(&sample(), None);
        assert!(collection.features.iter().all(|f| !f.properties.as_ref().unwrap().contains_key("score")));
    }

    #[test]
    fn test_import_restores_objects_by_id() {
        let geometries = sample();
        let text = to_geojson_string(&geometries, None).unwrap();
        let restored = from_geojson_string(&text).unwrap();
        assert_eq!(restored, geometries);
    }

    #[test]
    fn test_import_rejects_out_of_range_ids_and_counts() {
        let feature = |id: &str| {
            format!(
                r#"{{"type":"Feature","properties":{{"object_id":{id},"area":1.0}},"geometry":{{"type":"Polygon","coordinates":[[[0,0],[0,1],[1,1],[0,0]]]}}}}"#
            )
        };
        let collection = |features: String, count: &str| {
            format!(r#"{{"type":"FeatureCollection","features":[{features}]{count}}}"#)
        };

        let max_id = collection(feature(&u64::MAX.to_string()), "");
        assert!(from_geojson_string(&max_id).is_err());
        let huge_count = collection(feature("0"), r#","object_count":18446744073709551615"#);
        assert!(from_geojson_string(&huge_count).is_err());
        let id_past_count = collection(feature("3"), r#","object_count":2"#);
        assert!(from_geojson_string(&id_past_count).is_err());

        let padded = collection(feature("1"), r#","object_count":3"#);
        let restored = from_geojson_string(&padded).unwrap();
        assert_eq!(restored.len(), 3);
        assert!(restored[0].polygons.is_empty());
        assert_eq!(restored[1].polygons.len(), 1);
    }

    #[test]
    fn test_import_rejects_foreign_geometry() {
        let text = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"object_id":0,"area":1.0},"geometry":{"type":"Point","coordinates":[1.0,2.0]}}]}"#;
        assert!(from_geojson_string(text).is_err());
    }
}
