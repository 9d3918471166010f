use geo::Coord;
use serde::{Deserialize, Serialize};

/// A disambiguated, range-validated location: the square's center plus the
/// distance from center to edge in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub distance_to_edge: f64,
}

impl CanonicalLocation {
    /// Center as a map coordinate (x = longitude, y = latitude).
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }
}

/// Emitted on every square creation or drag so external state can track the
/// current ROI. Center is [longitude, latitude].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapeUpdate {
    pub center: [f64; 2],
    pub distance_to_edge: f64,
}

/// A group of mutually exclusive raster layers sharing one mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayFamily {
    ChangeDetection,
    LandCover,
}

impl OverlayFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayFamily::ChangeDetection => "change-detection",
            OverlayFamily::LandCover => "land-cover",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "change-detection" | "change_detection" => Some(OverlayFamily::ChangeDetection),
            "land-cover" | "land_cover" => Some(OverlayFamily::LandCover),
            _ => None,
        }
    }

    pub fn source_id(&self) -> &'static str {
        match self {
            OverlayFamily::ChangeDetection => "change-detection-source",
            OverlayFamily::LandCover => "land-cover-source",
        }
    }

    pub fn layer_id(&self) -> &'static str {
        match self {
            OverlayFamily::ChangeDetection => "change-detection-layer",
            OverlayFamily::LandCover => "land-cover-layer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeVariant {
    Before,
    After,
    #[default]
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandCoverVariant {
    #[default]
    Imagery,
    Mask,
}

/// A request parsed upstream from free text. `location` is deliberately kept
/// as raw JSON: depending on the parser it arrives as an object, an array,
/// or a "lat, lng" string with unknown axis order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParsedRequest {
    pub location: Option<serde_json::Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_to_edge: Option<f64>,
    pub region_name: Option<String>,
    pub study_type: Option<String>,
    #[serde(default)]
    pub is_timeseries: bool,
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
}

/// Completed change-detection analysis for one ROI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeforestationResult {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_to_edge: Option<f64>,
    pub before_image_path: Option<String>,
    pub after_image_path: Option<String>,
    pub mask_path: Option<String>,
    pub mask_colormap_path: Option<String>,
}

impl DeforestationResult {
    /// Server-relative image path for a variant, or None when the result has
    /// nothing to show for it. The change variant prefers the colormapped
    /// mask over the raw one.
    pub fn path_for(&self, variant: ChangeVariant) -> Option<&str> {
        let path = match variant {
            ChangeVariant::Before => self.before_image_path.as_deref(),
            ChangeVariant::After => self.after_image_path.as_deref(),
            ChangeVariant::Change => self
                .mask_colormap_path
                .as_deref()
                .or(self.mask_path.as_deref()),
        };
        path.filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LulcYearResult {
    pub year: i32,
    pub image_path: Option<String>,
    pub mask_path: Option<String>,
}

/// Completed multi-year land-cover study. Carries its originating request,
/// which is where the canonical location lives.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LulcStudy {
    pub parsed_request: Option<ParsedRequest>,
    #[serde(default)]
    pub year_results: Vec<LulcYearResult>,
}

impl LulcStudy {
    /// Year results keep arriving while a study runs, so a stale index from
    /// the selector falls back to the first year rather than showing nothing.
    pub fn year(&self, index: usize) -> Option<&LulcYearResult> {
        self.year_results
            .get(index)
            .or_else(|| self.year_results.first())
    }

    pub fn path_for(&self, index: usize, variant: LandCoverVariant) -> Option<&str> {
        let year = self.year(index)?;
        let path = match variant {
            LandCoverVariant::Imagery => year.image_path.as_deref(),
            LandCoverVariant::Mask => year.mask_path.as_deref(),
        };
        path.filter(|p| !p.is_empty())
    }
}
