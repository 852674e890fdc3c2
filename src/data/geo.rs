use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Fixed-point units per degree. Keeps lon in range of an `i32`.
pub const COORD_SCALE: f64 = 10_000_000.0;

/// A position in fixed-point lat/lon units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coordinate {
    pub lat: i32,
    pub lon: i32,
}

impl Coordinate {
    pub const fn new(lat: i32, lon: i32) -> Self {
        Coordinate { lat, lon }
    }

    pub fn from_degrees(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::format(format!("coordinate ({lat}, {lon}) out of range")));
        }
        Ok(Coordinate {
            lat: (lat * COORD_SCALE).round() as i32,
            lon: (lon * COORD_SCALE).round() as i32,
        })
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / COORD_SCALE
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / COORD_SCALE
    }
}

/// Axis-aligned box over [`Coordinate`]s. A box with `min == max` is a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Envelope {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl Envelope {
    pub fn new(min: Coordinate, max: Coordinate) -> Self {
        Envelope {
            min: Coordinate::new(min.lat.min(max.lat), min.lon.min(max.lon)),
            max: Coordinate::new(min.lat.max(max.lat), min.lon.max(max.lon)),
        }
    }

    pub fn point(coord: Coordinate) -> Self {
        Envelope { min: coord, max: coord }
    }

    /// Smallest envelope holding every coordinate, `None` for an empty slice.
    pub fn from_coords(coords: &[Coordinate]) -> Option<Self> {
        let (first, rest) = coords.split_first()?;
        let mut envelope = Envelope::point(*first);
        for coord in rest {
            envelope.extend_coord(*coord);
        }
        Some(envelope)
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    pub fn extend_coord(&mut self, coord: Coordinate) {
        self.min.lat = self.min.lat.min(coord.lat);
        self.min.lon = self.min.lon.min(coord.lon);
        self.max.lat = self.max.lat.max(coord.lat);
        self.max.lon = self.max.lon.max(coord.lon);
    }

    pub fn extend(&mut self, other: &Envelope) {
        self.extend_coord(other.min);
        self.extend_coord(other.max);
    }

    pub fn union(&self, other: &Envelope) -> Envelope {
        let mut out = *self;
        out.extend(other);
        out
    }

    /// Boundaries count as intersecting.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min.lat <= other.max.lat
            && other.min.lat <= self.max.lat
            && self.min.lon <= other.max.lon
            && other.min.lon <= self.max.lon
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        self.min.lat <= other.min.lat
            && self.min.lon <= other.min.lon
            && other.max.lat <= self.max.lat
            && other.max.lon <= self.max.lon
    }

    pub fn center(&self) -> Coordinate {
        let (lat, lon) = self.center2();
        Coordinate::new((lat / 2) as i32, (lon / 2) as i32)
    }

    /// Center in doubled units so integer rounding never reorders neighbours.
    pub fn center2(&self) -> (i64, i64) {
        (
            self.min.lat as i64 + self.max.lat as i64,
            self.min.lon as i64 + self.max.lon as i64,
        )
    }
}

/// Query or region bounds in degrees.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        BoundingBox { min_lat, min_lon, max_lat, max_lon }
    }

    pub fn to_envelope(&self) -> Result<Envelope> {
        Ok(Envelope::new(
            Coordinate::from_degrees(self.min_lat, self.min_lon)?,
            Coordinate::from_degrees(self.max_lat, self.max_lon)?,
        ))
    }

    pub fn from_envelope(envelope: &Envelope) -> Self {
        BoundingBox {
            min_lat: envelope.min.lat_degrees(),
            min_lon: envelope.min.lon_degrees(),
            max_lat: envelope.max.lat_degrees(),
            max_lon: envelope.max.lon_degrees(),
        }
    }
}
