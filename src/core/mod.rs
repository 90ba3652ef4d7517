//! Foundation types shared by every layer.

pub mod geo;

pub use geo::{
    BoundingBox, GeoPoint, bearing_deg, distance_to_polyline_m, distance_to_segment_m, haversine_m,
};
