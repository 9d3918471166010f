use crate::projection::ProjectionKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub map: MapConfig,
    pub media: MediaConfig,
    pub geocoder: GeocoderConfig,
    pub overlays: OverlaysConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    /// Initial view center, [longitude, latitude].
    pub default_center: [f64; 2],
    pub default_zoom: f64,
    /// Distance-to-edge applied when a request omits it, meters.
    pub default_distance_m: f64,
    /// Floor for resolved distances; a zero-area ring cannot be vertex-edited.
    pub min_distance_m: f64,
    /// Padding passed with every fit-view request, pixels.
    pub fit_padding: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_center: [73.07, 31.41],
            default_zoom: 9.0,
            default_distance_m: 2000.0,
            min_distance_m: 1.0,
            fit_padding: 40.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MediaConfig {
    /// Media URLs are this base joined with the server-relative path.
    pub base_url: String,
    /// When set, the server also serves this directory under /media.
    pub serve_dir: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/media".to_string(),
            serve_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub access_token: String,
    /// Result cap per suggest call.
    pub limit: u32,
    /// Optional ISO country filter, e.g. "pk".
    pub country: Option<String>,
    /// Zoom applied when flying to a selected place.
    pub select_zoom: f64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mapbox.com/search/searchbox/v1".to_string(),
            access_token: String::new(),
            limit: 5,
            country: None,
            select_zoom: 12.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OverlaysConfig {
    pub change_detection: OverlayFamilyConfig,
    pub land_cover: OverlayFamilyConfig,
}

impl Default for OverlaysConfig {
    fn default() -> Self {
        // The two families historically used different projection strategies
        // and only the land-cover panel recenters the view. Both knobs are
        // configuration so the pairing can be unified without code changes.
        Self {
            change_detection: OverlayFamilyConfig {
                projection: ProjectionKind::Equirectangular,
                recenter: false,
                opacity: 0.75,
            },
            land_cover: OverlayFamilyConfig {
                projection: ProjectionKind::Mercator,
                recenter: true,
                opacity: 0.8,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OverlayFamilyConfig {
    pub projection: ProjectionKind,
    pub recenter: bool,
    pub opacity: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Built-in defaults when no config file exists (one-shot CLI use).
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9001

            [overlays.land_cover]
            projection = "equirectangular"
            recenter = false
            opacity = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.map.default_distance_m, 2000.0);
        assert_eq!(
            config.overlays.change_detection.projection,
            ProjectionKind::Equirectangular
        );
        assert_eq!(
            config.overlays.land_cover.projection,
            ProjectionKind::Equirectangular
        );
        assert!(!config.overlays.land_cover.recenter);
    }

    #[test]
    fn empty_toml_is_fully_defaulted() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.map.default_center, [73.07, 31.41]);
        assert_eq!(config.geocoder.limit, 5);
        assert_eq!(
            config.overlays.land_cover.projection,
            ProjectionKind::Mercator
        );
        assert!(config.overlays.land_cover.recenter);
        assert!(!config.overlays.change_detection.recenter);
    }
}
