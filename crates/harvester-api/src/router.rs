use axum::{
    Router,
    http::{Extensions, HeaderMap, StatusCode, Version},
    middleware,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer, decompression::RequestDecompressionLayer, trace::TraceLayer,
};

use crate::{handlers, middleware::verify_signature, state::AppState};

pub fn metrics_router(state: AppState) -> Router {
    let batch = post(handlers::update::update_batch).route_layer(
        middleware::from_fn_with_state(state.clone(), verify_signature),
    );

    Router::new()
        .route("/", get(handlers::value::list_metrics))
        .route("/ping", get(handlers::health::ping))
        .route("/updates/", batch)
        .route("/update/", post(handlers::update::update_json))
        .route(
            "/update/{kind}/{id}/{value}",
            post(handlers::update::update_from_path),
        )
        .route("/value/", post(handlers::value::value_json))
        .route("/value/{kind}/{id}", get(handlers::value::value_from_path))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new().compress_when(always_compress))
        .layer(TraceLayer::new_for_http())
}

// Every client that advertises gzip gets it, however small the body.
fn always_compress(_: StatusCode, _: Version, _: &HeaderMap, _: &Extensions) -> bool {
    true
}
