use super::Point3d;

/// Mean Earth radius in m.
const EARTH_RADIUS: f64 = 6.371e6;

/// Maps geographic coordinates onto the local simulation plane.
///
/// Uses an equirectangular approximation around the origin, which is accurate
/// enough for networks spanning a few tens of kilometres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateSpace {
    /// Latitude of the origin, in degrees north.
    lat: f64,
    /// Longitude of the origin, in degrees east.
    lon: f64,
    /// Cosine of the origin latitude.
    cos: f64,
}

impl CoordinateSpace {
    /// Creates a coordinate space centred at the given origin.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            cos: lat.to_radians().cos(),
        }
    }

    /// The origin as a `(lat, lon)` pair.
    pub fn origin(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    /// Projects a geographic coordinate into the simulation plane, in m.
    pub fn to_local(&self, lat: f64, lon: f64) -> Point3d {
        let dlat = (lat - self.lat).to_radians();
        let dlon = (lon - self.lon).to_radians();
        Point3d::new(self.cos * EARTH_RADIUS * dlon, EARTH_RADIUS * dlat, 0.0)
    }
}
