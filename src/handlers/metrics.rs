use axum::http::header;
use axum::response::IntoResponse;

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        crate::metrics::render(),
    )
}
