use crate::core::geo::{is_valid_lat, is_valid_lng, LatLng};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A geographic rectangle in degrees.
///
/// Every constructor normalizes its input: values must be finite and inside
/// the ±180/±90 domain, and reversed `west/east` or `south/north` pairs are
/// swapped rather than rejected. A `BoundingBox` therefore always satisfies
/// `west <= east` and `south <= north`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Creates a normalized bounding box from its four edges
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        for (name, value) in [("west", west), ("south", south), ("east", east), ("north", north)] {
            if !value.is_finite() {
                return Err(MapError::InvalidBoundingBox(format!(
                    "{name} is not a finite number"
                )));
            }
        }
        if !is_valid_lng(west) || !is_valid_lng(east) {
            return Err(MapError::InvalidBoundingBox(format!(
                "longitude out of range: west={west}, east={east}"
            )));
        }
        if !is_valid_lat(south) || !is_valid_lat(north) {
            return Err(MapError::InvalidBoundingBox(format!(
                "latitude out of range: south={south}, north={north}"
            )));
        }

        Ok(Self {
            west: west.min(east),
            south: south.min(north),
            east: west.max(east),
            north: south.max(north),
        })
    }

    /// Builds the box covering `radius_km` around `center`.
    ///
    /// Uses the flat-earth approximation: a fixed number of kilometers per
    /// degree of latitude, and the same for longitude scaled by
    /// `cos(latitude)`. The result is clamped to the valid domain.
    pub fn from_center_radius(center: LatLng, radius_km: f64) -> Result<Self> {
        if !center.is_valid() {
            return Err(MapError::InvalidBoundingBox(format!(
                "center out of range: lat={}, lng={}",
                center.lat, center.lng
            )));
        }
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(MapError::InvalidBoundingBox(format!(
                "radius must be a non-negative number of kilometers, got {radius_km}"
            )));
        }

        let dlat = radius_km * LatLng::lat_degrees_per_km();
        let dlng = radius_km * center.lng_degrees_per_km();

        Self::new(
            (center.lng - dlng).max(-180.0),
            (center.lat - dlat).max(-90.0),
            (center.lng + dlng).min(180.0),
            (center.lat + dlat).min(90.0),
        )
    }

    /// Re-validates an already built box. Idempotent for every valid box.
    pub fn normalized(&self) -> Result<Self> {
        Self::new(self.west, self.south, self.east, self.north)
    }

    /// Gets the center point of the box
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Radius in kilometers of the circle around the center that encloses the box
    pub fn radius_km(&self) -> f64 {
        let center = self.center();
        let half_height_km = (self.north - self.south) / 2.0 / LatLng::lat_degrees_per_km();
        let half_width_km = (self.east - self.west) / 2.0 / center.lng_degrees_per_km();
        half_height_km.hypot(half_width_km)
    }

    /// Converts the box to its center + radius representation
    pub fn to_center_radius(&self) -> (LatLng, f64) {
        (self.center(), self.radius_km())
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Area in square degrees
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Checks if the box contains a point (edges inclusive)
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    pub fn south_west(&self) -> LatLng {
        LatLng::new(self.south, self.west)
    }

    pub fn north_east(&self) -> LatLng {
        LatLng::new(self.north, self.east)
    }
}

impl FromStr for BoundingBox {
    type Err = MapError;

    /// Parses either the positional `west,south,east,north` form or the named
    /// form `west=..,south=..,east=..,north=..` (`:` also accepted as the
    /// separator, fields in any order).
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s
            .trim()
            .trim_start_matches(['(', '[', '{'])
            .trim_end_matches([')', ']', '}'])
            .split([',', ';'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.len() != 4 {
            return Err(MapError::InvalidBoundingBox(format!(
                "expected 4 values, got {} in {s:?}",
                parts.len()
            )));
        }

        let named = parts.iter().any(|part| part.contains(['=', ':']));
        let values = if named {
            parse_named(&parts)?
        } else {
            let mut values = [0.0; 4];
            for (slot, part) in values.iter_mut().zip(&parts) {
                *slot = parse_number(part)?;
            }
            values
        };

        Self::new(values[0], values[1], values[2], values[3])
    }
}

fn parse_named(parts: &[&str]) -> Result<[f64; 4]> {
    let mut values: [Option<f64>; 4] = [None; 4];
    for part in parts {
        let (name, value) = part.split_once(['=', ':']).ok_or_else(|| {
            MapError::InvalidBoundingBox(format!("mixed positional and named fields: {part:?}"))
        })?;
        let name = name.trim().trim_matches('"').to_ascii_lowercase();
        let slot = match name.as_str() {
            "west" | "w" | "minlng" | "min_lng" => 0,
            "south" | "s" | "minlat" | "min_lat" => 1,
            "east" | "e" | "maxlng" | "max_lng" => 2,
            "north" | "n" | "maxlat" | "max_lat" => 3,
            other => {
                return Err(MapError::InvalidBoundingBox(format!("unknown field {other:?}")))
            }
        };
        values[slot] = Some(parse_number(value)?);
    }

    let mut out = [0.0; 4];
    for (i, value) in values.iter().enumerate() {
        out[i] = value.ok_or_else(|| {
            MapError::InvalidBoundingBox(format!(
                "missing field {}",
                ["west", "south", "east", "north"][i]
            ))
        })?;
    }
    Ok(out)
}

fn parse_number(raw: &str) -> Result<f64> {
    raw.trim()
        .trim_matches('"')
        .parse::<f64>()
        .map_err(|_| MapError::InvalidBoundingBox(format!("{raw:?} is not a number")))
}

#[derive(Deserialize)]
struct RawBoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawBoundingBox::deserialize(deserializer)?;
        BoundingBox::new(raw.west, raw.south, raw.east, raw.north).map_err(serde::de::Error::custom)
    }
}
