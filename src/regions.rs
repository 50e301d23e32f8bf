use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Grid region with its EIA facet codes and a representative weather point
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionConfig {
    /// Display name used in reports
    pub name: String,
    /// Parent balancing authority (EIA `facets[parent][]`)
    pub parent: String,
    /// Sub-balancing-authority (EIA `facets[subba][]`)
    pub subba: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
}

/// Built-in regions: (key, name, parent, subba, lat, lon, timezone)
const BUILTIN_REGIONS: &[(&str, &str, &str, &str, f64, f64, &str)] = &[
    // California ISO
    ("ciso_pgae", "California - Pacific Gas & Electric", "CISO", "PGAE", 37.7749, -122.4194, "America/Los_Angeles"),
    ("ciso_sce", "California - Southern California Edison", "CISO", "SCE", 34.0522, -118.2437, "America/Los_Angeles"),
    ("ciso_sdge", "California - San Diego Gas & Electric", "CISO", "SDGE", 32.7157, -117.1611, "America/Los_Angeles"),
    // ERCOT weather zones
    ("erco_coas", "Texas - ERCOT Coast", "ERCO", "COAS", 29.7604, -95.3698, "America/Chicago"),
    ("erco_ncen", "Texas - ERCOT North Central", "ERCO", "NCEN", 32.7767, -96.7970, "America/Chicago"),
    // NYISO load zones
    ("nyis_zonj", "New York - New York City (Zone J)", "NYIS", "ZONJ", 40.7128, -74.0060, "America/New_York"),
    // PJM transmission zones
    ("pjm_dom", "Virginia - Dominion", "PJM", "DOM", 37.5407, -77.4360, "America/New_York"),
    // Southwest Power Pool
    ("swpp_okge", "Oklahoma - OG&E", "SWPP", "OKGE", 35.4676, -97.5164, "America/Chicago"),
    // ISO New England
    ("isne_4008", "New England - Northeast Massachusetts", "ISNE", "4008", 42.3601, -71.0589, "America/New_York"),
];

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Region '{key}' not found. Available: {}", .available.join(", "))]
pub struct UnknownRegion {
    pub key: String,
    pub available: Vec<String>,
}

/// Immutable lookup table of regions, built once at start-up
#[derive(Debug, Clone)]
pub struct RegionRegistry {
    regions: BTreeMap<String, RegionConfig>,
}

impl RegionRegistry {
    pub fn builtin() -> Self {
        let regions = BUILTIN_REGIONS
            .iter()
            .map(|&(key, name, parent, subba, lat, lon, timezone)| {
                (
                    key.to_string(),
                    RegionConfig {
                        name: name.to_string(),
                        parent: parent.to_string(),
                        subba: subba.to_string(),
                        lat,
                        lon,
                        timezone: timezone.to_string(),
                    },
                )
            })
            .collect();
        Self { regions }
    }

    /// Add regions from the config file; a key that already exists is replaced.
    pub fn with_overrides(mut self, extra: &BTreeMap<String, RegionConfig>) -> Self {
        for (key, region) in extra {
            if self.regions.insert(key.clone(), region.clone()).is_some() {
                tracing::debug!("Region '{}' overridden from config", key);
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&RegionConfig> {
        self.regions.get(key)
    }

    /// Look up a key, failing with the list of known keys.
    pub fn resolve(&self, key: &str) -> Result<&RegionConfig, UnknownRegion> {
        self.get(key).ok_or_else(|| UnknownRegion {
            key: key.to_string(),
            available: self.regions.keys().cloned().collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegionConfig)> {
        self.regions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_pgae() {
        let registry = RegionRegistry::builtin();
        let region = registry.get("ciso_pgae").unwrap();
        assert_eq!(region.parent, "CISO");
        assert_eq!(region.subba, "PGAE");
        assert_eq!(registry.len(), BUILTIN_REGIONS.len());
    }

    #[test]
    fn test_resolve_unknown_lists_keys() {
        let registry = RegionRegistry::builtin();
        let err = registry.resolve("atlantis").unwrap_err();
        assert_eq!(err.key, "atlantis");
        assert!(err.available.contains(&"ciso_pgae".to_string()));
        assert!(err.to_string().starts_with("Region 'atlantis' not found. Available: "));
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let mut extra = BTreeMap::new();
        extra.insert(
            "ciso_pgae".to_string(),
            RegionConfig {
                name: "PG&E (custom point)".to_string(),
                parent: "CISO".to_string(),
                subba: "PGAE".to_string(),
                lat: 38.5816,
                lon: -121.4944,
                timezone: "America/Los_Angeles".to_string(),
            },
        );
        extra.insert(
            "miso_0001".to_string(),
            RegionConfig {
                name: "MISO Zone 1".to_string(),
                parent: "MISO".to_string(),
                subba: "0001".to_string(),
                lat: 44.9778,
                lon: -93.2650,
                timezone: "America/Chicago".to_string(),
            },
        );

        let registry = RegionRegistry::builtin().with_overrides(&extra);
        assert_eq!(registry.len(), BUILTIN_REGIONS.len() + 1);
        assert_eq!(registry.get("ciso_pgae").unwrap().name, "PG&E (custom point)");
        assert!(registry.resolve("miso_0001").is_ok());
    }
}
