use crate::canvas::{CanvasModel, CanvasSnapshot};
use crate::config::AppConfig;
use crate::geocode::{GeocodeClient, Suggestion, SuggestionController, SuggestionKind};
use crate::session::MapSession;
use crate::types::{
    ChangeVariant, DeforestationResult, LandCoverVariant, LulcStudy, OverlayFamily, ParsedRequest,
    ShapeUpdate,
};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct AppState {
    pub session: Mutex<MapSession<CanvasModel>>,
    pub suggestions: Mutex<SuggestionController>,
    pub geocode: GeocodeClient,
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let canvas = CanvasModel::with_view(
        true,
        Coord {
            x: config.map.default_center[0],
            y: config.map.default_center[1],
        },
        config.map.default_zoom,
    );

    let state = Arc::new(AppState {
        session: Mutex::new(MapSession::new(canvas, config.clone())),
        suggestions: Mutex::new(SuggestionController::new()),
        geocode: GeocodeClient::new(config.geocoder.clone()),
    });

    let mut app = Router::new()
        .route("/api/request", post(apply_request))
        .route("/api/vertex-update", post(vertex_update))
        .route("/api/panel/:family/open", post(open_panel))
        .route("/api/panel/:family/close", post(close_panel))
        .route("/api/panel/:family/variant", post(set_variant))
        .route("/api/style-ready", post(style_ready))
        .route("/api/suggest", get(suggest))
        .route("/api/select", post(select))
        .route("/api/state", get(canvas_state))
        .layer(CorsLayer::permissive())
        .with_state(state);

    if let Some(dir) = &config.media.serve_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn apply_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ParsedRequest>,
) -> Json<Option<ShapeUpdate>> {
    let mut session = state.session.lock().await;
    Json(session.apply_request(&request))
}

#[derive(Deserialize)]
struct VertexUpdateBody {
    /// Raw ring from the draw layer, [lng, lat] pairs.
    coordinates: Vec<[f64; 2]>,
}

async fn vertex_update(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VertexUpdateBody>,
) -> Json<Option<ShapeUpdate>> {
    let ring: Vec<Coord<f64>> = body
        .coordinates
        .iter()
        .map(|c| Coord { x: c[0], y: c[1] })
        .collect();
    let mut session = state.session.lock().await;
    Json(session.vertex_update(&ring))
}

fn parse_family(segment: &str) -> Result<OverlayFamily, StatusCode> {
    OverlayFamily::parse(segment).ok_or(StatusCode::NOT_FOUND)
}

async fn open_panel(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<CanvasSnapshot>, StatusCode> {
    let family = parse_family(&family)?;
    let mut session = state.session.lock().await;
    match family {
        OverlayFamily::ChangeDetection => {
            let result: DeforestationResult =
                serde_json::from_value(body).map_err(|_| StatusCode::BAD_REQUEST)?;
            session.open_change_panel(result);
        }
        OverlayFamily::LandCover => {
            let study: LulcStudy =
                serde_json::from_value(body).map_err(|_| StatusCode::BAD_REQUEST)?;
            session.open_land_cover_panel(study);
        }
    }
    Ok(Json(session.canvas().snapshot()))
}

async fn close_panel(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
) -> Result<Json<CanvasSnapshot>, StatusCode> {
    let family = parse_family(&family)?;
    let mut session = state.session.lock().await;
    match family {
        OverlayFamily::ChangeDetection => session.close_change_panel(),
        OverlayFamily::LandCover => session.close_land_cover_panel(),
    }
    Ok(Json(session.canvas().snapshot()))
}

#[derive(Deserialize)]
struct VariantBody {
    variant: String,
    year: Option<usize>,
}

async fn set_variant(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    Json(body): Json<VariantBody>,
) -> Result<Json<CanvasSnapshot>, StatusCode> {
    let family = parse_family(&family)?;
    let mut session = state.session.lock().await;
    match family {
        OverlayFamily::ChangeDetection => {
            let variant = match body.variant.as_str() {
                "before" => ChangeVariant::Before,
                "after" => ChangeVariant::After,
                "change" => ChangeVariant::Change,
                _ => return Err(StatusCode::BAD_REQUEST),
            };
            session.set_change_variant(variant);
        }
        OverlayFamily::LandCover => {
            let variant = match body.variant.as_str() {
                "imagery" => LandCoverVariant::Imagery,
                "mask" => LandCoverVariant::Mask,
                _ => return Err(StatusCode::BAD_REQUEST),
            };
            session.set_land_cover_selection(variant, body.year.unwrap_or(0));
        }
    }
    Ok(Json(session.canvas().snapshot()))
}

async fn style_ready(State(state): State<Arc<AppState>>) -> Json<CanvasSnapshot> {
    let mut session = state.session.lock().await;
    session.style_ready();
    Json(session.canvas().snapshot())
}

#[derive(Deserialize)]
struct SuggestParams {
    #[serde(default)]
    q: String,
}

/// Issue the sequence token under the lock, fetch outside it, re-lock to
/// apply: a slow response to an old keystroke can never clobber a fresher
/// batch, and the lock is never held across the network call.
async fn suggest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuggestParams>,
) -> Json<Vec<Suggestion>> {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        let mut controller = state.suggestions.lock().await;
        controller.clear();
        return Json(Vec::new());
    }

    let seq = state.suggestions.lock().await.begin();
    match state.geocode.suggest(&query).await {
        Ok(results) => {
            let mut controller = state.suggestions.lock().await;
            controller.apply(seq, results);
            Json(controller.suggestions().to_vec())
        }
        Err(err) => {
            warn!(%err, "suggest request failed");
            let controller = state.suggestions.lock().await;
            Json(controller.suggestions().to_vec())
        }
    }
}

#[derive(Deserialize)]
struct SelectBody {
    id: String,
    text: String,
    kind: String,
}

#[derive(Serialize)]
struct SelectResponse {
    /// Text to put in the search field.
    query: String,
    /// Present when the selection resolved to a coordinate.
    shape: Option<ShapeUpdate>,
}

async fn select(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectBody>,
) -> Result<Json<SelectResponse>, StatusCode> {
    let kind = match body.kind.as_str() {
        "place" => SuggestionKind::Place,
        "query" => SuggestionKind::Query,
        _ => return Err(StatusCode::BAD_REQUEST),
    };

    state.suggestions.lock().await.clear();

    // Query suggestions only fill the text field; no lookup.
    if kind == SuggestionKind::Query {
        return Ok(Json(SelectResponse {
            query: body.text,
            shape: None,
        }));
    }

    let shape = match state.geocode.retrieve(&body.id).await {
        Ok(Some((lng, lat))) => {
            let mut session = state.session.lock().await;
            session.select_place(lng, lat)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(%err, "place retrieve failed");
            None
        }
    };

    Ok(Json(SelectResponse {
        query: body.text,
        shape,
    }))
}

async fn canvas_state(State(state): State<Arc<AppState>>) -> Json<CanvasSnapshot> {
    let session = state.session.lock().await;
    Json(session.canvas().snapshot())
}
