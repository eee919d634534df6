//! Geographic helpers for radius search.
//!
//! Distances are carried in kilometres on the wire and miles in the UI, so the
//! conversions live here next to the bounding-box math. Longitude deltas widen
//! with latitude so a box covers the same physical radius anywhere on the map.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

pub const KM_PER_MILE: f64 = 1.609_344;
const KM_PER_LAT_DEGREE: f64 = 111.32;
const EARTH_RADIUS_KM: f64 = 6_371.008_8;
/// Web-mercator ground resolution at zoom 0 on the equator, metres per pixel.
const METERS_PER_PIXEL_Z0: f64 = 156_543.033_92;
/// Floor for `cos(lat)` so boxes near the poles stay finite.
const MIN_COS_LAT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Viewport or search rectangle. `west > east` means the box crosses the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Longitudinal span in degrees, accounting for antimeridian wrap.
    #[must_use]
    pub fn width_degrees(&self) -> f64 {
        if self.crosses_antimeridian() {
            (180.0 - self.west) + (self.east + 180.0)
        } else {
            self.east - self.west
        }
    }

    #[must_use]
    pub fn height_degrees(&self) -> f64 {
        self.north - self.south
    }

    /// Area in square degrees. Only meaningful for relative comparisons.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width_degrees() * self.height_degrees()
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        let lat = (self.north + self.south) / 2.0;
        let lng = wrap_longitude(self.west + self.width_degrees() / 2.0);
        LatLng { lat, lng }
    }

    /// Inclusive containment test with `epsilon` slack on every edge.
    ///
    /// When the box crosses the antimeridian the two longitude half-planes
    /// are OR-combined instead of AND-combined.
    #[must_use]
    pub fn contains(&self, point: LatLng, epsilon: f64) -> bool {
        let lat_ok = point.lat >= self.south - epsilon && point.lat <= self.north + epsilon;
        if !lat_ok {
            return false;
        }
        let east_of_west = point.lng >= self.west - epsilon;
        let west_of_east = point.lng <= self.east + epsilon;
        if self.crosses_antimeridian() {
            east_of_west || west_of_east
        } else {
            east_of_west && west_of_east
        }
    }
}

#[must_use]
pub fn miles_to_km(miles: f64) -> f64 {
    miles * KM_PER_MILE
}

#[must_use]
pub fn km_to_miles(km: f64) -> f64 {
    km / KM_PER_MILE
}

/// Wrap a longitude into `[-180, 180]`.
#[must_use]
pub fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lng > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Bounding box covering `radius_km` around `center`.
///
/// Latitude is clamped to the poles; longitude edges are wrapped, so a box
/// near the antimeridian comes back with `west > east`.
#[must_use]
pub fn bbox_around(center: LatLng, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / KM_PER_LAT_DEGREE;
    let cos_lat = (center.lat * PI / 180.0).cos().abs().max(MIN_COS_LAT);
    let lng_delta = (radius_km / (KM_PER_LAT_DEGREE * cos_lat)).min(180.0);

    BoundingBox {
        north: (center.lat + lat_delta).min(90.0),
        south: (center.lat - lat_delta).max(-90.0),
        east: wrap_longitude(center.lng + lng_delta),
        west: wrap_longitude(center.lng - lng_delta),
    }
}

/// Great-circle distance in kilometres.
#[must_use]
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let to_rad = PI / 180.0;
    let d_lat = (b.lat - a.lat) * to_rad;
    let d_lng = (b.lng - a.lng) * to_rad;
    let h = (d_lat / 2.0).sin().powi(2)
        + (a.lat * to_rad).cos() * (b.lat * to_rad).cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Radius that covers a viewport: centre to the north-east corner.
#[must_use]
pub fn radius_km_from_bounds(bounds: &BoundingBox) -> f64 {
    haversine_km(
        bounds.center(),
        LatLng {
            lat: bounds.north,
            lng: bounds.east,
        },
    )
}

/// Approximate search radius for a map zoom level.
///
/// Uses web-mercator ground resolution at `lat` and half the viewport width.
#[must_use]
pub fn approx_radius_km_for_zoom(zoom: f64, lat: f64, viewport_width_px: f64) -> f64 {
    let cos_lat = (lat * PI / 180.0).cos().abs().max(MIN_COS_LAT);
    let meters_per_px = METERS_PER_PIXEL_Z0 * cos_lat / 2f64.powf(zoom);
    meters_per_px * viewport_width_px / 2.0 / 1000.0
}
