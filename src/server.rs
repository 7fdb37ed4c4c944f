use crate::render::{RegionIndex, RenderedRegion, Tooltip};
use crate::scale::Rgb;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

/// Everything the handlers read. Built once; never mutated.
pub struct AppState {
    pub regions: Vec<RenderedRegion>,
    pub index: RegionIndex,
    pub collection: FeatureCollection,
}

impl AppState {
    pub fn new(regions: Vec<RenderedRegion>, collection: FeatureCollection) -> Self {
        info!("Building spatial index for {} regions...", regions.len());
        let index = RegionIndex::build(&regions);
        Self {
            regions,
            index,
            collection,
        }
    }

    /// The region under a pointer at `lat`/`lon`, as shown on hover.
    pub fn hover(&self, lat: f64, lon: f64) -> Option<HoverResponse> {
        let i = self.index.locate(&self.regions, lon, lat)?;
        let region = &self.regions[i];
        Some(HoverResponse {
            id: region.boundary.id.clone(),
            average: region.average,
            color: region.color,
            tooltip: region.tooltip.clone(),
        })
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HoverResponse {
    pub id: String,
    pub average: Option<f64>,
    pub color: Option<Rgb>,
    pub tooltip: Tooltip,
}

pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/choropleth", get(choropleth_handler))
        .route("/api/query", get(query_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16, static_dir: &Path) -> Result<()> {
    let app = router(Arc::new(state), static_dir);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn choropleth_handler(State(state): State<Arc<AppState>>) -> Json<FeatureCollection> {
    Json(state.collection.clone())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<HoverResponse>> {
    Json(state.hover(params.lat, params.lon))
}
