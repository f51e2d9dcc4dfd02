//! Metro-area airport index.
//!
//! Groups airports by great-circle nearness so the matcher can treat e.g.
//! GRO and BCN as the same destination area. Coordinates are loaded once at
//! startup from an airport table in ourairports CSV format; nearby-set
//! lookups are cached for the lifetime of the process.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// Calculate the great-circle distance between two points using the
/// haversine formula. Returns distance in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[derive(Debug, Deserialize)]
struct AirportRow {
    iata_code: Option<String>,
    latitude_deg: Option<f64>,
    longitude_deg: Option<f64>,
}

/// Read-only index of airport coordinates with cached metro-area lookups.
/// Immutable after load; share via `Arc`.
pub struct MetroIndex {
    coords: HashMap<String, (f64, f64)>,
    // Keyed by (iata, radius bits) so differently-configured callers don't
    // poison each other's entries.
    cache: RwLock<HashMap<(String, u64), Arc<BTreeSet<String>>>>,
}

impl MetroIndex {
    /// Load the index from a CSV airport table. Rows without an IATA code or
    /// coordinates are skipped. Fails when the file cannot be read — the
    /// caller treats that as fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open airport table at {}", path.display()))?;

        let mut coords = HashMap::new();
        for row in reader.deserialize::<AirportRow>() {
            let row = row.context("malformed airport table row")?;
            let Some(iata) = row.iata_code.as_deref().map(str::trim) else {
                continue;
            };
            if iata.is_empty() {
                continue;
            }
            if let (Some(lat), Some(lon)) = (row.latitude_deg, row.longitude_deg) {
                coords.insert(iata.to_string(), (lat, lon));
            }
        }

        info!("Loaded {} airports from {}", coords.len(), path.display());
        Ok(Self::from_coords(coords))
    }

    /// Build an index directly from coordinates. Used by tests.
    pub fn from_coords(coords: HashMap<String, (f64, f64)>) -> Self {
        Self {
            coords,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// All IATA codes within `radius_km` of the given airport, including the
    /// airport itself. An unknown code or non-positive radius yields only the
    /// airport itself.
    pub fn nearby(&self, iata: &str, radius_km: f64) -> Arc<BTreeSet<String>> {
        let key = (iata.to_string(), radius_km.to_bits());
        if let Some(cached) = self.cache.read().expect("metro cache poisoned").get(&key) {
            return Arc::clone(cached);
        }

        let set = Arc::new(self.compute_nearby(iata, radius_km));
        self.cache
            .write()
            .expect("metro cache poisoned")
            .insert(key, Arc::clone(&set));
        set
    }

    fn compute_nearby(&self, iata: &str, radius_km: f64) -> BTreeSet<String> {
        let mut nearby = BTreeSet::new();
        nearby.insert(iata.to_string());

        let Some(&(lat, lon)) = self.coords.get(iata) else {
            warn!("Airport {} not found in airport table, treating as isolated", iata);
            return nearby;
        };
        if radius_km <= 0.0 {
            return nearby;
        }

        for (other, &(other_lat, other_lon)) in &self.coords {
            if other == iata {
                continue;
            }
            if haversine_km(lat, lon, other_lat, other_lon) <= radius_km {
                nearby.insert(other.clone());
            }
        }
        nearby
    }

    /// Whether two airports lie within the metro-area radius of each other.
    pub fn are_nearby(&self, iata_a: &str, iata_b: &str, radius_km: f64) -> bool {
        if iata_a == iata_b {
            return true;
        }
        self.nearby(iata_a, radius_km).contains(iata_b)
    }
}
