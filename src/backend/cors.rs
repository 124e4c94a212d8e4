//! CORS handling for the two backend variants.

use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
        },
        HeaderName, HeaderValue, Method, Request, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

use crate::config::BackendVariant;

const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
const MAX_AGE_SECS: u64 = 86_400;

/// Wrap `router` with the CORS behavior of `variant`.
pub fn apply<S>(router: Router<S>, variant: BackendVariant) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    match variant {
        BackendVariant::Local => router
            .layer(middleware::from_fn(local_preflight))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("X-Requested-With, Content-type"),
            )),
        BackendVariant::Https => router.layer(https_cors()),
    }
}

/// Answer any `OPTIONS` request with a permissive `200`.
async fn local_preflight(request: Request<Body>, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let max_age = MAX_AGE_SECS.to_string();
    (
        StatusCode::OK,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (ACCESS_CONTROL_ALLOW_METHODS, "POST, GET, OPTIONS"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (ACCESS_CONTROL_MAX_AGE, max_age.as_str()),
        ],
    )
        .into_response()
}

/// Origin-mirroring CORS with credentials.
fn https_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, X_REQUESTED_WITH])
        .max_age(Duration::from_secs(MAX_AGE_SECS))
}
