use crate::canvas::Canvas;
use crate::config::OverlayFamilyConfig;
use crate::projection;
use crate::square;
use crate::types::{CanonicalLocation, OverlayFamily};
use geo::Coord;
use tracing::{debug, warn};

/// A georeferenced raster layer as mounted on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayer {
    pub source_id: String,
    pub layer_id: String,
    pub image_url: String,
    pub corners: [Coord<f64>; 4],
    pub opacity: f64,
}

/// A fully resolved mount request: canonical location plus the
/// server-relative image path for the currently selected variant.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRequest {
    pub location: CanonicalLocation,
    pub image_path: String,
}

/// Mount/unmount lifecycle for one overlay family. At most one layer is
/// mounted at any time; every mount removes the previous source+layer pair
/// first, because the engine rejects duplicate source ids.
#[derive(Debug)]
pub struct OverlayManager {
    family: OverlayFamily,
    config: OverlayFamilyConfig,
    media_base: String,
    panel_open: bool,
    mounted: Option<OverlayLayer>,
    /// Mount waiting for the canvas style to finish loading. Taken exactly
    /// once when readiness is signalled.
    pending: Option<OverlayRequest>,
}

impl OverlayManager {
    pub fn new(family: OverlayFamily, config: OverlayFamilyConfig, media_base: String) -> Self {
        Self {
            family,
            config,
            media_base,
            panel_open: false,
            mounted: None,
            pending: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.panel_open
    }

    pub fn mounted(&self) -> Option<&OverlayLayer> {
        self.mounted.as_ref()
    }

    /// Panel opened. With nothing mountable (no result, missing coordinates,
    /// no path for the active variant) the panel still opens; there is just
    /// no layer to show.
    pub fn open<C: Canvas>(&mut self, canvas: &mut C, request: Option<OverlayRequest>) {
        self.panel_open = true;
        match request {
            Some(request) => self.mount(canvas, request),
            None => {
                debug!(
                    family = self.family.as_str(),
                    "panel opened with nothing to mount"
                );
            }
        }
    }

    /// Active variant or year changed while the panel is open: same replace
    /// sequence with the newly selected path.
    pub fn refresh<C: Canvas>(&mut self, canvas: &mut C, request: Option<OverlayRequest>) {
        if !self.panel_open {
            return;
        }
        match request {
            Some(request) => self.mount(canvas, request),
            None => {
                debug!(
                    family = self.family.as_str(),
                    "selected variant has no image, unmounting"
                );
                self.pending = None;
                self.unmount(canvas);
            }
        }
    }

    pub fn close<C: Canvas>(&mut self, canvas: &mut C) {
        self.panel_open = false;
        self.pending = None;
        self.unmount(canvas);
    }

    /// Canvas signalled style readiness: run the deferred mount once.
    pub fn style_ready<C: Canvas>(&mut self, canvas: &mut C) {
        if let Some(request) = self.pending.take() {
            if self.panel_open {
                self.mount(canvas, request);
            }
        }
    }

    fn mount<C: Canvas>(&mut self, canvas: &mut C, request: OverlayRequest) {
        if !canvas.style_ready() {
            debug!(
                family = self.family.as_str(),
                "canvas style not ready, deferring mount"
            );
            self.pending = Some(request);
            return;
        }

        self.unmount(canvas);

        let center = request.location.center();
        let corners = projection::corners(
            self.config.projection,
            center,
            request.location.distance_to_edge,
        );
        let layer = OverlayLayer {
            source_id: self.family.source_id().to_string(),
            layer_id: self.family.layer_id().to_string(),
            image_url: join_media_url(&self.media_base, &request.image_path),
            corners,
            opacity: self.config.opacity,
        };

        // unmount() just cleared these ids; a survivor means the engine is in
        // a state we don't understand, so skip rather than feed it a
        // duplicate.
        if canvas.has_source(&layer.source_id) || canvas.has_layer(&layer.layer_id) {
            warn!(
                source = %layer.source_id,
                "source still mounted after removal, skipping add"
            );
            return;
        }
        if let Err(err) = canvas.add_image_source(&layer.source_id, &layer.image_url, layer.corners)
        {
            warn!(family = self.family.as_str(), %err, "could not add image source");
            return;
        }
        if let Err(err) = canvas.add_raster_layer(&layer.layer_id, &layer.source_id, layer.opacity)
        {
            warn!(family = self.family.as_str(), %err, "could not add raster layer");
            if let Err(err) = canvas.remove_source(&layer.source_id) {
                warn!(%err, "could not remove orphaned source");
            }
            return;
        }

        if self.config.recenter {
            if let Some(bounds) = square::bounds(&layer.corners) {
                canvas.fit_bounds(bounds, 0.0);
            }
        }

        self.mounted = Some(layer);
    }

    fn unmount<C: Canvas>(&mut self, canvas: &mut C) {
        let layer_id = self.family.layer_id();
        let source_id = self.family.source_id();
        if canvas.has_layer(layer_id) {
            if let Err(err) = canvas.remove_layer(layer_id) {
                warn!(family = self.family.as_str(), %err, "could not remove layer");
            }
        }
        if canvas.has_source(source_id) {
            if let Err(err) = canvas.remove_source(source_id) {
                warn!(family = self.family.as_str(), %err, "could not remove source");
            }
        }
        self.mounted = None;
    }
}

/// Media URLs are the fixed base joined with the server-relative path; no
/// other transformation.
pub fn join_media_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasModel;
    use crate::config::OverlaysConfig;

    fn location() -> CanonicalLocation {
        CanonicalLocation {
            latitude: 31.48,
            longitude: 74.30,
            distance_to_edge: 2000.0,
        }
    }

    fn request(path: &str) -> Option<OverlayRequest> {
        Some(OverlayRequest {
            location: location(),
            image_path: path.to_string(),
        })
    }

    fn manager(family: OverlayFamily) -> OverlayManager {
        let overlays = OverlaysConfig::default();
        let config = match family {
            OverlayFamily::ChangeDetection => overlays.change_detection,
            OverlayFamily::LandCover => overlays.land_cover,
        };
        OverlayManager::new(family, config, "http://localhost:8000/media".to_string())
    }

    #[test]
    fn variant_switch_never_leaves_two_sources() {
        let mut canvas = CanvasModel::new(true);
        let mut overlay = manager(OverlayFamily::ChangeDetection);

        overlay.open(&mut canvas, request("runs/7/before.png"));
        assert_eq!(canvas.source_count(), 1);
        assert_eq!(canvas.layer_count(), 1);

        overlay.refresh(&mut canvas, request("runs/7/after.png"));
        assert_eq!(canvas.source_count(), 1);
        assert_eq!(canvas.layer_count(), 1);
        assert_eq!(
            canvas.source_url("change-detection-source"),
            Some("http://localhost:8000/media/runs/7/after.png")
        );
    }

    #[test]
    fn change_detection_corners_use_the_simple_projection() {
        let mut canvas = CanvasModel::new(true);
        let mut overlay = manager(OverlayFamily::ChangeDetection);
        overlay.open(&mut canvas, request("runs/7/mask.png"));

        let mounted = overlay.mounted().unwrap();
        let [tl, tr, _br, bl] = mounted.corners;
        // 2000 m at 31.48°N through the equirectangular conversion.
        assert!(((tl.y - 31.48) - 0.0181).abs() < 1e-4);
        assert!(((tr.x - 74.30) - 0.0211).abs() < 1e-4);
        assert!(((31.48 - bl.y) - 0.0181).abs() < 1e-4);
        assert_eq!(canvas.layer_count(), 1);
    }

    #[test]
    fn close_unmounts_everything() {
        let mut canvas = CanvasModel::new(true);
        let mut overlay = manager(OverlayFamily::ChangeDetection);
        overlay.open(&mut canvas, request("runs/7/mask.png"));
        overlay.close(&mut canvas);
        assert_eq!(canvas.source_count(), 0);
        assert_eq!(canvas.layer_count(), 0);
        assert!(overlay.mounted().is_none());
        assert!(!overlay.is_open());
    }

    #[test]
    fn close_is_idempotent_when_nothing_is_mounted() {
        let mut canvas = CanvasModel::new(true);
        let mut overlay = manager(OverlayFamily::LandCover);
        overlay.close(&mut canvas);
        overlay.close(&mut canvas);
        assert_eq!(canvas.source_count(), 0);
    }

    #[test]
    fn mount_defers_until_style_ready_and_runs_once() {
        let mut canvas = CanvasModel::new(false);
        let mut overlay = manager(OverlayFamily::LandCover);

        overlay.open(&mut canvas, request("lulc/2019.png"));
        assert_eq!(canvas.source_count(), 0);

        canvas.set_style_ready(true);
        overlay.style_ready(&mut canvas);
        assert_eq!(canvas.source_count(), 1);
        assert_eq!(canvas.layer_count(), 1);

        // The listener detached: a second readiness signal does nothing.
        overlay.style_ready(&mut canvas);
        assert_eq!(canvas.source_count(), 1);
    }

    #[test]
    fn deferred_mount_is_dropped_if_panel_closed_meanwhile() {
        let mut canvas = CanvasModel::new(false);
        let mut overlay = manager(OverlayFamily::LandCover);
        overlay.open(&mut canvas, request("lulc/2019.png"));
        overlay.close(&mut canvas);

        canvas.set_style_ready(true);
        overlay.style_ready(&mut canvas);
        assert_eq!(canvas.source_count(), 0);
    }

    #[test]
    fn land_cover_recenters_change_detection_does_not() {
        let mut canvas = CanvasModel::new(true);
        let mut overlay = manager(OverlayFamily::LandCover);
        overlay.open(&mut canvas, request("lulc/2019.png"));
        let view = canvas.view();
        assert!((view.center.x - 74.30).abs() < 1e-6);
        assert!((view.center.y - 31.48).abs() < 1e-3);

        let mut canvas = CanvasModel::new(true);
        let mut overlay = manager(OverlayFamily::ChangeDetection);
        overlay.open(&mut canvas, request("runs/7/mask.png"));
        let view = canvas.view();
        assert_eq!(view.center.x, 0.0);
        assert_eq!(view.center.y, 0.0);
    }

    #[test]
    fn refresh_to_missing_variant_unmounts() {
        let mut canvas = CanvasModel::new(true);
        let mut overlay = manager(OverlayFamily::ChangeDetection);
        overlay.open(&mut canvas, request("runs/7/before.png"));
        overlay.refresh(&mut canvas, None);
        assert_eq!(canvas.source_count(), 0);
        assert!(overlay.mounted().is_none());
        assert!(overlay.is_open());
    }

    #[test]
    fn media_url_join_handles_slashes() {
        assert_eq!(
            join_media_url("http://localhost:8000/media/", "/runs/7/mask.png"),
            "http://localhost:8000/media/runs/7/mask.png"
        );
        assert_eq!(
            join_media_url("http://localhost:8000/media", "runs/7/mask.png"),
            "http://localhost:8000/media/runs/7/mask.png"
        );
    }
}
