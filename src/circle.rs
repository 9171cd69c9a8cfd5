//! Map widget payloads and their reduction to a canonical circle.
//!
//! The drawing tool reports circles either as a GeoJSON `Point` carrying a
//! `radius` property in meters, or as a `Polygon` ring approximating the
//! circle. GeoJSON positions are `[lon, lat]`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geo::{haversine_km, Coordinates};

/// What the map widget reports after an interaction.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct MapOutput {
    pub last_active_drawing: Option<Feature>,
    pub all_drawings: Vec<Feature>,
    pub last_clicked: Option<LatLng>,
}

impl MapOutput {
    /// The shape the resolver looks at: the active drawing, else the most
    /// recent one in history.
    pub fn latest_drawing(&self) -> Option<&Feature> {
        self.last_active_drawing
            .as_ref()
            .or_else(|| self.all_drawings.last())
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<LatLng> for Coordinates {
    fn from(value: LatLng) -> Self {
        Coordinates::new(value.lat, value.lng)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn point(lon: f64, lat: f64, radius_m: f64) -> Self {
        let mut properties = Map::new();
        properties.insert("radius".to_string(), Value::from(radius_m));
        Self {
            geometry: Geometry {
                kind: "Point".to_string(),
                coordinates: Value::from(vec![lon, lat]),
            },
            properties,
        }
    }

    pub fn polygon(ring: &[[f64; 2]]) -> Self {
        let ring: Vec<Value> = ring.iter().map(|pos| Value::from(pos.to_vec())).collect();
        Self {
            geometry: Geometry {
                kind: "Polygon".to_string(),
                coordinates: Value::Array(vec![Value::Array(ring)]),
            },
            properties: Map::new(),
        }
    }

    fn radius_m(&self) -> Option<f64> {
        match self.properties.get("radius")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Unknown geometry types and malformed coordinates resolve to no circle
/// rather than failing deserialization.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Value,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ResolvedCircle {
    pub center: Coordinates,
    pub radius_km: f64,
}

/// Circle described by the widget's latest drawing, if any.
pub fn resolve_map_output(output: Option<&MapOutput>) -> Option<ResolvedCircle> {
    resolve_feature(output?.latest_drawing())
}

pub fn resolve_feature(feature: Option<&Feature>) -> Option<ResolvedCircle> {
    let feature = feature?;
    let resolved = match feature.geometry.kind.as_str() {
        "Point" => resolve_point(feature),
        "Polygon" => resolve_polygon(&feature.geometry.coordinates),
        _ => None,
    }?;
    (resolved.center.lat.is_finite()
        && resolved.center.lon.is_finite()
        && resolved.radius_km.is_finite())
    .then_some(resolved)
}

fn resolve_point(feature: &Feature) -> Option<ResolvedCircle> {
    let radius_m = feature.radius_m()?;
    let [lon, lat] = position(&feature.geometry.coordinates)?;
    Some(ResolvedCircle {
        center: Coordinates::new(lat, lon),
        radius_km: radius_m / 1000.0,
    })
}

/// Centroid is the plain vertex mean and the radius is measured to the first
/// vertex. Neither is exact for the drawn circle.
fn resolve_polygon(coordinates: &Value) -> Option<ResolvedCircle> {
    let ring = coordinates.as_array()?.first()?.as_array()?;
    let vertices = ring.iter().map(position).collect::<Option<Vec<_>>>()?;
    let [first_lon, first_lat] = *vertices.first()?;

    let count = vertices.len() as f64;
    let lat = vertices.iter().map(|[_, lat]| lat).sum::<f64>() / count;
    let lon = vertices.iter().map(|[lon, _]| lon).sum::<f64>() / count;

    Some(ResolvedCircle {
        center: Coordinates::new(lat, lon),
        radius_km: haversine_km(lat, lon, first_lat, first_lon),
    })
}

fn position(value: &Value) -> Option<[f64; 2]> {
    let pair = value.as_array()?;
    Some([pair.first()?.as_f64()?, pair.get(1)?.as_f64()?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(value: Value) -> MapOutput {
        serde_json::from_value(value).expect("map output json")
    }

    #[test]
    fn point_with_radius_resolves_in_km() {
        let feature = Feature::point(58.33, 37.96, 1500.0);
        let circle = resolve_feature(Some(&feature)).expect("circle");
        assert_eq!(circle.center, Coordinates::new(37.96, 58.33));
        assert_eq!(circle.radius_km, 1.5);
    }

    #[test]
    fn point_radius_may_be_a_string() {
        let out = output(json!({
            "last_active_drawing": {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [58.33, 37.96]},
                "properties": {"radius": "2500"}
            }
        }));
        let circle = resolve_map_output(Some(&out)).expect("circle");
        assert_eq!(circle.radius_km, 2.5);
    }

    #[test]
    fn point_without_radius_is_not_a_circle() {
        let out = output(json!({
            "last_active_drawing": {
                "geometry": {"type": "Point", "coordinates": [58.33, 37.96]},
                "properties": {}
            }
        }));
        assert!(resolve_map_output(Some(&out)).is_none());
    }

    #[test]
    fn absent_payload_resolves_to_none() {
        assert!(resolve_map_output(None).is_none());
        assert!(resolve_map_output(Some(&MapOutput::default())).is_none());
        assert!(resolve_feature(None).is_none());
    }

    #[test]
    fn falls_back_to_last_history_entry() {
        let out = MapOutput {
            last_active_drawing: None,
            all_drawings: vec![
                Feature::point(58.0, 37.0, 1000.0),
                Feature::point(61.83, 37.60, 3000.0),
            ],
            last_clicked: None,
        };
        let circle = resolve_map_output(Some(&out)).expect("circle");
        assert_eq!(circle.center, Coordinates::new(37.60, 61.83));
        assert_eq!(circle.radius_km, 3.0);
    }

    #[test]
    fn active_drawing_wins_over_history() {
        let out = MapOutput {
            last_active_drawing: Some(Feature::point(58.0, 37.0, 1000.0)),
            all_drawings: vec![Feature::point(61.83, 37.60, 3000.0)],
            last_clicked: None,
        };
        assert_eq!(resolve_map_output(Some(&out)).unwrap().radius_km, 1.0);
    }

    #[test]
    fn polygon_uses_vertex_mean_and_first_vertex_radius() {
        // Approximation only: a square ring, closed like GeoJSON rings are.
        let ring = [[58.0, 38.0], [58.2, 38.0], [58.2, 38.2], [58.0, 38.2], [58.0, 38.0]];
        let circle = resolve_feature(Some(&Feature::polygon(&ring))).expect("circle");

        let lat = (38.0 + 38.0 + 38.2 + 38.2 + 38.0) / 5.0;
        let lon = (58.0 + 58.2 + 58.2 + 58.0 + 58.0) / 5.0;
        assert!((circle.center.lat - lat).abs() < 1e-12);
        assert!((circle.center.lon - lon).abs() < 1e-12);
        let expected = haversine_km(lat, lon, 38.0, 58.0);
        assert!((circle.radius_km - expected).abs() < 1e-9);
        assert!(circle.radius_km > 0.0);
    }

    #[test]
    fn empty_or_malformed_polygon_is_none() {
        assert!(resolve_feature(Some(&Feature::polygon(&[]))).is_none());
        let broken = output(json!({
            "last_active_drawing": {
                "geometry": {"type": "Polygon", "coordinates": [[[58.0, "x"], [58.1, 38.0]]]}
            }
        }));
        assert!(resolve_map_output(Some(&broken)).is_none());
    }

    #[test]
    fn other_geometries_are_ignored() {
        let out = output(json!({
            "last_active_drawing": {
                "geometry": {"type": "LineString", "coordinates": [[58.0, 38.0], [58.1, 38.1]]},
                "properties": {"radius": 100}
            }
        }));
        assert!(resolve_map_output(Some(&out)).is_none());
    }

    #[test]
    fn click_converts_to_coordinates() {
        let out = output(json!({"last_clicked": {"lat": 37.95, "lng": 58.38}}));
        let clicked: Coordinates = out.last_clicked.expect("click").into();
        assert_eq!(clicked, Coordinates::new(37.95, 58.38));
    }
}
