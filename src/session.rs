use crate::canvas::Canvas;
use crate::config::AppConfig;
use crate::location;
use crate::overlay::{OverlayManager, OverlayRequest};
use crate::projection;
use crate::square;
use crate::types::{
    CanonicalLocation, ChangeVariant, DeforestationResult, LandCoverVariant, LulcStudy,
    OverlayFamily, ParsedRequest, ShapeUpdate,
};
use geo::Coord;
use tracing::{debug, warn};

/// Owner of the interactive map state: the single ROI feature handle, one
/// overlay manager per family, and the last emitted shape update. All
/// geometry recomputation runs synchronously inside these methods; nothing
/// else writes to the canvas.
pub struct MapSession<C: Canvas> {
    canvas: C,
    config: AppConfig,
    roi_feature: Option<String>,
    change: OverlayManager,
    change_variant: ChangeVariant,
    change_result: Option<DeforestationResult>,
    land_cover: OverlayManager,
    land_cover_variant: LandCoverVariant,
    land_cover_year: usize,
    land_cover_result: Option<LulcStudy>,
    last_shape: Option<ShapeUpdate>,
}

impl<C: Canvas> MapSession<C> {
    pub fn new(canvas: C, config: AppConfig) -> Self {
        let change = OverlayManager::new(
            OverlayFamily::ChangeDetection,
            config.overlays.change_detection.clone(),
            config.media.base_url.clone(),
        );
        let land_cover = OverlayManager::new(
            OverlayFamily::LandCover,
            config.overlays.land_cover.clone(),
            config.media.base_url.clone(),
        );
        Self {
            canvas,
            config,
            roi_feature: None,
            change,
            change_variant: ChangeVariant::default(),
            change_result: None,
            land_cover,
            land_cover_variant: LandCoverVariant::default(),
            land_cover_year: 0,
            land_cover_result: None,
            last_shape: None,
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn last_shape(&self) -> Option<ShapeUpdate> {
        self.last_shape
    }

    /// A parsed request arrived (or changed): draw or move the ROI square.
    /// Unresolvable locations are a logged no-op.
    pub fn apply_request(&mut self, request: &ParsedRequest) -> Option<ShapeUpdate> {
        let location = location::normalize(request, &self.config.map)?;
        self.draw_square(&location)
    }

    /// A vertex-update event from the draw layer: collapse the dragged ring
    /// back to a perfect square and write it in place.
    pub fn vertex_update(&mut self, raw: &[Coord<f64>]) -> Option<ShapeUpdate> {
        let Some(feature) = self.roi_feature.clone() else {
            debug!("vertex update without an ROI feature, ignoring");
            return None;
        };
        let Some(squared) = square::resquare(raw) else {
            debug!(vertices = raw.len(), "vertex update too short to re-square");
            return None;
        };
        if let Err(err) = self.canvas.set_feature_coordinates(&feature, &squared.ring) {
            warn!(%err, "could not write re-squared ring");
            return None;
        }
        let update = ShapeUpdate {
            center: [squared.center.x, squared.center.y],
            distance_to_edge: projection::drag_deg_to_meters(squared.half_side_deg),
        };
        self.last_shape = Some(update);
        Some(update)
    }

    pub fn open_change_panel(&mut self, result: DeforestationResult) {
        self.change_result = Some(result);
        if let Some(loc) = self.change_location() {
            self.draw_square(&loc);
        }
        let request = self.change_request();
        self.change.open(&mut self.canvas, request);
    }

    pub fn set_change_variant(&mut self, variant: ChangeVariant) {
        self.change_variant = variant;
        let request = self.change_request();
        self.change.refresh(&mut self.canvas, request);
    }

    pub fn close_change_panel(&mut self) {
        self.change.close(&mut self.canvas);
        self.change_result = None;
        self.drop_square_if_unneeded();
    }

    pub fn open_land_cover_panel(&mut self, study: LulcStudy) {
        self.land_cover_result = Some(study);
        if let Some(loc) = self.land_cover_location() {
            self.draw_square(&loc);
        }
        let request = self.land_cover_request();
        self.land_cover.open(&mut self.canvas, request);
    }

    pub fn set_land_cover_selection(&mut self, variant: LandCoverVariant, year_index: usize) {
        self.land_cover_variant = variant;
        self.land_cover_year = year_index;
        let request = self.land_cover_request();
        self.land_cover.refresh(&mut self.canvas, request);
    }

    pub fn close_land_cover_panel(&mut self) {
        self.land_cover.close(&mut self.canvas);
        self.land_cover_result = None;
        self.drop_square_if_unneeded();
    }

    pub fn panel_open(&self, family: OverlayFamily) -> bool {
        match family {
            OverlayFamily::ChangeDetection => self.change.is_open(),
            OverlayFamily::LandCover => self.land_cover.is_open(),
        }
    }

    /// The canvas finished loading its style: flush deferred overlay mounts.
    pub fn style_ready(&mut self) {
        self.canvas.set_style_ready(true);
        self.change.style_ready(&mut self.canvas);
        self.land_cover.style_ready(&mut self.canvas);
    }

    /// A geocode place was resolved to a coordinate: recenter and place a
    /// default-sized square there.
    pub fn select_place(&mut self, lng: f64, lat: f64) -> Option<ShapeUpdate> {
        self.canvas.fly_to(
            Coord { x: lng, y: lat },
            self.config.geocoder.select_zoom,
        );
        let location = CanonicalLocation {
            latitude: lat.clamp(-90.0, 90.0),
            longitude: lng.clamp(-180.0, 180.0),
            distance_to_edge: self.config.map.default_distance_m,
        };
        self.draw_square(&location)
    }

    /// One square at a time: overwrite the existing feature's coordinates in
    /// place, or create it and hand the draw layer per-vertex editing.
    fn draw_square(&mut self, location: &CanonicalLocation) -> Option<ShapeUpdate> {
        let ring = square::square_ring(location);

        match self.roi_feature.clone() {
            Some(id) => {
                if let Err(err) = self.canvas.set_feature_coordinates(&id, &ring) {
                    // The handle went stale underneath us; start over.
                    warn!(%err, "ROI feature handle is stale, recreating");
                    self.roi_feature = None;
                    self.create_feature(&ring);
                }
            }
            None => self.create_feature(&ring),
        }

        if let Some(bounds) = square::bounds(&ring) {
            self.canvas.fit_bounds(bounds, self.config.map.fit_padding);
        }

        let update = ShapeUpdate {
            center: [location.longitude, location.latitude],
            distance_to_edge: location.distance_to_edge,
        };
        self.last_shape = Some(update);
        Some(update)
    }

    fn create_feature(&mut self, ring: &[Coord<f64>]) {
        let id = self.canvas.add_feature(ring);
        if let Err(err) = self.canvas.direct_select(&id) {
            warn!(%err, "could not enter vertex editing on new feature");
        }
        self.roi_feature = Some(id);
    }

    /// The square only lives while some panel (or its result context) needs
    /// it.
    fn drop_square_if_unneeded(&mut self) {
        if self.change.is_open() || self.land_cover.is_open() {
            return;
        }
        if let Some(id) = self.roi_feature.take() {
            if let Err(err) = self.canvas.delete_feature(&id) {
                warn!(%err, "could not delete ROI feature");
            }
        }
    }

    fn change_location(&self) -> Option<CanonicalLocation> {
        let result = self.change_result.as_ref()?;
        location::from_fields(
            result.latitude,
            result.longitude,
            result.distance_to_edge,
            &self.config.map,
        )
    }

    fn change_request(&self) -> Option<OverlayRequest> {
        let location = self.change_location()?;
        let path = self
            .change_result
            .as_ref()?
            .path_for(self.change_variant)?;
        Some(OverlayRequest {
            location,
            image_path: path.to_string(),
        })
    }

    fn land_cover_location(&self) -> Option<CanonicalLocation> {
        let study = self.land_cover_result.as_ref()?;
        location::normalize(study.parsed_request.as_ref()?, &self.config.map)
    }

    fn land_cover_request(&self) -> Option<OverlayRequest> {
        let location = self.land_cover_location()?;
        let path = self
            .land_cover_result
            .as_ref()?
            .path_for(self.land_cover_year, self.land_cover_variant)?;
        Some(OverlayRequest {
            location,
            image_path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasModel;
    use crate::types::LulcYearResult;

    fn session(ready: bool) -> MapSession<CanvasModel> {
        MapSession::new(CanvasModel::new(ready), AppConfig::default())
    }

    fn request(lat: f64, lng: f64, distance: f64) -> ParsedRequest {
        ParsedRequest {
            latitude: Some(lat),
            longitude: Some(lng),
            distance_to_edge: Some(distance),
            ..Default::default()
        }
    }

    fn change_result() -> DeforestationResult {
        DeforestationResult {
            latitude: Some(31.48),
            longitude: Some(74.30),
            distance_to_edge: Some(2000.0),
            before_image_path: Some("runs/7/before.png".into()),
            after_image_path: Some("runs/7/after.png".into()),
            mask_path: Some("runs/7/mask.png".into()),
            mask_colormap_path: None,
        }
    }

    fn lulc_study() -> LulcStudy {
        LulcStudy {
            parsed_request: Some(request(31.48, 74.30, 2000.0)),
            year_results: vec![LulcYearResult {
                year: 2019,
                image_path: Some("lulc/2019.png".into()),
                mask_path: Some("lulc/2019_mask.png".into()),
            }],
        }
    }

    #[test]
    fn request_draws_a_square_and_emits_shape_update() {
        let mut session = session(true);
        let update = session.apply_request(&request(31.48, 74.30, 2000.0)).unwrap();
        assert_eq!(update.center, [74.30, 31.48]);
        assert_eq!(update.distance_to_edge, 2000.0);
        assert_eq!(session.canvas().feature_count(), 1);
        // New feature goes straight into vertex editing.
        assert!(session.canvas().selected().is_some());
    }

    #[test]
    fn second_request_overwrites_the_same_feature() {
        let mut session = session(true);
        session.apply_request(&request(31.48, 74.30, 2000.0));
        let first_id = session.canvas().snapshot().features[0].id.clone();

        session.apply_request(&request(-12.0, 130.0, 5000.0));
        let snapshot = session.canvas().snapshot();
        assert_eq!(snapshot.features.len(), 1);
        assert_eq!(snapshot.features[0].id, first_id);
    }

    #[test]
    fn invalid_request_draws_nothing() {
        let mut session = session(true);
        assert!(session.apply_request(&ParsedRequest::default()).is_none());
        assert_eq!(session.canvas().feature_count(), 0);
        assert!(session.last_shape().is_none());
    }

    #[test]
    fn vertex_update_resquares_and_reports_meters() {
        let mut session = session(true);
        session.apply_request(&request(31.48, 74.30, 2000.0)).unwrap();

        let id = session.canvas().snapshot().features[0].id.clone();
        let mut ring: Vec<Coord<f64>> = session
            .canvas()
            .feature_ring(&id)
            .unwrap()
            .to_vec();
        ring[2].x += 0.01;

        let update = session.vertex_update(&ring).unwrap();
        // Distance comes from the degree half-side via the fixed-radius
        // approximation, so it changed with the drag.
        assert!(update.distance_to_edge > 0.0);

        let stored = session.canvas().feature_ring(&id).unwrap();
        assert_eq!(stored.len(), 5);
        assert_eq!(stored[0], stored[4]);
    }

    #[test]
    fn vertex_update_without_feature_is_ignored() {
        let mut session = session(true);
        let ring = [Coord { x: 0.0, y: 0.0 }; 5];
        assert!(session.vertex_update(&ring).is_none());
    }

    #[test]
    fn opening_a_panel_mounts_overlay_and_draws_square() {
        let mut session = session(true);
        session.open_change_panel(change_result());
        assert_eq!(session.canvas().layer_count(), 1);
        assert_eq!(session.canvas().feature_count(), 1);
        assert_eq!(
            session.canvas().source_url("change-detection-source"),
            Some("http://localhost:8000/media/runs/7/mask.png")
        );
    }

    #[test]
    fn variant_switch_replaces_the_single_layer() {
        let mut session = session(true);
        session.open_change_panel(change_result());
        session.set_change_variant(ChangeVariant::Before);
        assert_eq!(session.canvas().source_count(), 1);
        assert_eq!(
            session.canvas().source_url("change-detection-source"),
            Some("http://localhost:8000/media/runs/7/before.png")
        );
        session.set_change_variant(ChangeVariant::After);
        assert_eq!(session.canvas().source_count(), 1);
        assert_eq!(
            session.canvas().source_url("change-detection-source"),
            Some("http://localhost:8000/media/runs/7/after.png")
        );
    }

    #[test]
    fn both_families_can_be_mounted_at_once() {
        let mut session = session(true);
        session.open_change_panel(change_result());
        session.open_land_cover_panel(lulc_study());
        assert_eq!(session.canvas().source_count(), 2);
        assert_eq!(session.canvas().layer_count(), 2);
    }

    #[test]
    fn square_survives_until_both_panels_close() {
        let mut session = session(true);
        session.open_change_panel(change_result());
        session.open_land_cover_panel(lulc_study());

        session.close_change_panel();
        assert_eq!(session.canvas().feature_count(), 1);
        assert_eq!(session.canvas().layer_count(), 1);

        session.close_land_cover_panel();
        assert_eq!(session.canvas().feature_count(), 0);
        assert_eq!(session.canvas().layer_count(), 0);
        assert_eq!(session.canvas().source_count(), 0);
    }

    #[test]
    fn panel_open_before_style_ready_defers_mount() {
        let mut session = session(false);
        session.open_land_cover_panel(lulc_study());
        assert_eq!(session.canvas().layer_count(), 0);

        session.style_ready();
        assert_eq!(session.canvas().layer_count(), 1);
    }

    #[test]
    fn result_without_coordinates_mounts_nothing() {
        let mut session = session(true);
        session.open_change_panel(DeforestationResult {
            mask_path: Some("runs/7/mask.png".into()),
            ..Default::default()
        });
        assert_eq!(session.canvas().layer_count(), 0);
        assert_eq!(session.canvas().feature_count(), 0);
        assert!(session.panel_open(OverlayFamily::ChangeDetection));
    }

    #[test]
    fn select_place_recenters_and_uses_default_distance() {
        let mut session = session(true);
        let update = session.select_place(74.30, 31.48).unwrap();
        assert_eq!(update.distance_to_edge, 2000.0);
        assert_eq!(session.canvas().feature_count(), 1);
    }

    #[test]
    fn land_cover_year_and_variant_selection() {
        let mut session = session(true);
        let mut study = lulc_study();
        study.year_results.push(LulcYearResult {
            year: 2020,
            image_path: Some("lulc/2020.png".into()),
            mask_path: None,
        });
        session.open_land_cover_panel(study);

        session.set_land_cover_selection(LandCoverVariant::Imagery, 1);
        assert_eq!(
            session.canvas().source_url("land-cover-source"),
            Some("http://localhost:8000/media/lulc/2020.png")
        );

        // 2020 has no mask: switching the variant unmounts rather than
        // leaving the stale imagery up.
        session.set_land_cover_selection(LandCoverVariant::Mask, 1);
        assert_eq!(session.canvas().source_url("land-cover-source"), None);

        session.set_land_cover_selection(LandCoverVariant::Mask, 0);
        assert_eq!(
            session.canvas().source_url("land-cover-source"),
            Some("http://localhost:8000/media/lulc/2019_mask.png")
        );
    }
}
