use geo::{Coord, Rect};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// The failure conditions the rendering engine rejects: duplicate source ids,
/// and operations on handles that do not exist. These are caught at the
/// boundary and suppressed; they must never escape the subsystem.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("source '{0}' already exists")]
    DuplicateSource(String),
    #[error("source '{0}' does not exist")]
    UnknownSource(String),
    #[error("layer '{0}' does not exist")]
    UnknownLayer(String),
    #[error("feature '{0}' does not exist")]
    UnknownFeature(String),
}

/// Narrow seam to the map canvas and its draw layer. The ROI synthesizer and
/// the overlay managers are the only writers; nothing else mutates canvas
/// state.
pub trait Canvas {
    fn add_feature(&mut self, ring: &[Coord<f64>]) -> String;
    fn set_feature_coordinates(&mut self, id: &str, ring: &[Coord<f64>]) -> Result<(), CanvasError>;
    fn delete_feature(&mut self, id: &str) -> Result<(), CanvasError>;
    /// Switch the draw layer into per-vertex editing on a feature.
    fn direct_select(&mut self, id: &str) -> Result<(), CanvasError>;

    fn fit_bounds(&mut self, bounds: Rect<f64>, padding: f64);
    fn fly_to(&mut self, center: Coord<f64>, zoom: f64);

    fn has_source(&self, id: &str) -> bool;
    fn has_layer(&self, id: &str) -> bool;
    fn add_image_source(
        &mut self,
        id: &str,
        url: &str,
        corners: [Coord<f64>; 4],
    ) -> Result<(), CanvasError>;
    fn add_raster_layer(&mut self, id: &str, source: &str, opacity: f64)
        -> Result<(), CanvasError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), CanvasError>;
    fn remove_source(&mut self, id: &str) -> Result<(), CanvasError>;

    fn style_ready(&self) -> bool;
    fn set_style_ready(&mut self, ready: bool);
}

#[derive(Debug, Clone)]
struct ImageSource {
    url: String,
    corners: [Coord<f64>; 4],
}

#[derive(Debug, Clone)]
struct RasterLayer {
    source: String,
    opacity: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct View {
    pub center: Coord<f64>,
    pub zoom: f64,
}

impl Default for View {
    fn default() -> Self {
        Self {
            center: Coord { x: 0.0, y: 0.0 },
            zoom: 0.0,
        }
    }
}

/// In-memory canvas backing serve mode and the tests. Mirrors the real
/// engine's rejection rules: a source id can only be added once, and a raster
/// layer requires its source to exist first.
#[derive(Debug, Default)]
pub struct CanvasModel {
    features: HashMap<String, Vec<Coord<f64>>>,
    sources: HashMap<String, ImageSource>,
    layers: HashMap<String, RasterLayer>,
    selected: Option<String>,
    view: View,
    view_bounds: Option<Rect<f64>>,
    ready: bool,
    next_feature: u64,
}

impl CanvasModel {
    pub fn new(ready: bool) -> Self {
        Self {
            ready,
            ..Default::default()
        }
    }

    pub fn with_view(ready: bool, center: Coord<f64>, zoom: f64) -> Self {
        Self {
            ready,
            view: View { center, zoom },
            ..Default::default()
        }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn feature_ring(&self, id: &str) -> Option<&[Coord<f64>]> {
        self.features.get(id).map(Vec::as_slice)
    }

    pub fn source_url(&self, id: &str) -> Option<&str> {
        self.sources.get(id).map(|s| s.url.as_str())
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        let mut features: Vec<FeatureSnapshot> = self
            .features
            .iter()
            .map(|(id, ring)| FeatureSnapshot {
                id: id.clone(),
                ring: ring.iter().map(|c| [c.x, c.y]).collect(),
            })
            .collect();
        features.sort_by(|a, b| a.id.cmp(&b.id));

        let mut layers: Vec<LayerSnapshot> = self
            .layers
            .iter()
            .filter_map(|(id, layer)| {
                self.sources.get(&layer.source).map(|source| LayerSnapshot {
                    layer_id: id.clone(),
                    source_id: layer.source.clone(),
                    image_url: source.url.clone(),
                    corners: source.corners.iter().map(|c| [c.x, c.y]).collect(),
                    opacity: layer.opacity,
                })
            })
            .collect();
        layers.sort_by(|a, b| a.layer_id.cmp(&b.layer_id));

        CanvasSnapshot {
            features,
            layers,
            center: [self.view.center.x, self.view.center.y],
            zoom: self.view.zoom,
            bounds: self
                .view_bounds
                .map(|r| [[r.min().x, r.min().y], [r.max().x, r.max().y]]),
        }
    }
}

impl Canvas for CanvasModel {
    fn add_feature(&mut self, ring: &[Coord<f64>]) -> String {
        self.next_feature += 1;
        let id = format!("feature-{}", self.next_feature);
        self.features.insert(id.clone(), ring.to_vec());
        id
    }

    fn set_feature_coordinates(&mut self, id: &str, ring: &[Coord<f64>]) -> Result<(), CanvasError> {
        match self.features.get_mut(id) {
            Some(existing) => {
                *existing = ring.to_vec();
                Ok(())
            }
            None => Err(CanvasError::UnknownFeature(id.to_string())),
        }
    }

    fn delete_feature(&mut self, id: &str) -> Result<(), CanvasError> {
        if self.features.remove(id).is_none() {
            return Err(CanvasError::UnknownFeature(id.to_string()));
        }
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        Ok(())
    }

    fn direct_select(&mut self, id: &str) -> Result<(), CanvasError> {
        if !self.features.contains_key(id) {
            return Err(CanvasError::UnknownFeature(id.to_string()));
        }
        self.selected = Some(id.to_string());
        Ok(())
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>, _padding: f64) {
        self.view.center = bounds.center();
        self.view_bounds = Some(bounds);
    }

    fn fly_to(&mut self, center: Coord<f64>, zoom: f64) {
        self.view.center = center;
        self.view.zoom = zoom;
        self.view_bounds = None;
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }

    fn add_image_source(
        &mut self,
        id: &str,
        url: &str,
        corners: [Coord<f64>; 4],
    ) -> Result<(), CanvasError> {
        if self.sources.contains_key(id) {
            return Err(CanvasError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(
            id.to_string(),
            ImageSource {
                url: url.to_string(),
                corners,
            },
        );
        Ok(())
    }

    fn add_raster_layer(
        &mut self,
        id: &str,
        source: &str,
        opacity: f64,
    ) -> Result<(), CanvasError> {
        if !self.sources.contains_key(source) {
            return Err(CanvasError::UnknownSource(source.to_string()));
        }
        self.layers.insert(
            id.to_string(),
            RasterLayer {
                source: source.to_string(),
                opacity,
            },
        );
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), CanvasError> {
        self.layers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CanvasError::UnknownLayer(id.to_string()))
    }

    fn remove_source(&mut self, id: &str) -> Result<(), CanvasError> {
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CanvasError::UnknownSource(id.to_string()))
    }

    fn style_ready(&self) -> bool {
        self.ready
    }

    fn set_style_ready(&mut self, ready: bool) {
        self.ready = ready;
    }
}

#[derive(Debug, Serialize)]
pub struct CanvasSnapshot {
    pub features: Vec<FeatureSnapshot>,
    pub layers: Vec<LayerSnapshot>,
    pub center: [f64; 2],
    pub zoom: f64,
    pub bounds: Option<[[f64; 2]; 2]>,
}

#[derive(Debug, Serialize)]
pub struct FeatureSnapshot {
    pub id: String,
    pub ring: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
pub struct LayerSnapshot {
    pub layer_id: String,
    pub source_id: String,
    pub image_url: String,
    pub corners: Vec<[f64; 2]>,
    pub opacity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corners() -> [Coord<f64>; 4] {
        [
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
        ]
    }

    #[test]
    fn duplicate_source_is_rejected() {
        let mut canvas = CanvasModel::new(true);
        canvas.add_image_source("s", "http://x/a.png", corners()).unwrap();
        let err = canvas
            .add_image_source("s", "http://x/b.png", corners())
            .unwrap_err();
        assert!(matches!(err, CanvasError::DuplicateSource(_)));
        // The original survives.
        assert_eq!(canvas.source_url("s"), Some("http://x/a.png"));
    }

    #[test]
    fn layer_requires_existing_source() {
        let mut canvas = CanvasModel::new(true);
        let err = canvas.add_raster_layer("l", "missing", 0.8).unwrap_err();
        assert!(matches!(err, CanvasError::UnknownSource(_)));

        canvas.add_image_source("s", "http://x/a.png", corners()).unwrap();
        canvas.add_raster_layer("l", "s", 0.8).unwrap();
        assert!(canvas.has_layer("l"));
    }

    #[test]
    fn feature_lifecycle() {
        let mut canvas = CanvasModel::new(true);
        let ring = [Coord { x: 0.0, y: 0.0 }; 5];
        let id = canvas.add_feature(&ring);
        canvas.direct_select(&id).unwrap();
        assert_eq!(canvas.selected(), Some(id.as_str()));

        let moved = [Coord { x: 1.0, y: 1.0 }; 5];
        canvas.set_feature_coordinates(&id, &moved).unwrap();
        assert_eq!(canvas.feature_ring(&id).unwrap()[0].x, 1.0);

        canvas.delete_feature(&id).unwrap();
        assert_eq!(canvas.selected(), None);
        assert!(matches!(
            canvas.delete_feature(&id),
            Err(CanvasError::UnknownFeature(_))
        ));
    }

    #[test]
    fn snapshot_joins_layers_to_their_sources() {
        let mut canvas = CanvasModel::new(true);
        canvas.add_image_source("s", "http://x/a.png", corners()).unwrap();
        canvas.add_raster_layer("l", "s", 0.6).unwrap();
        let snapshot = canvas.snapshot();
        assert_eq!(snapshot.layers.len(), 1);
        assert_eq!(snapshot.layers[0].image_url, "http://x/a.png");
        assert_eq!(snapshot.layers[0].corners.len(), 4);
    }
}
