use axum::{
    extract::{Request, State},
    http::{StatusCode, Uri, header, uri::PathAndQuery},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use vysion_core::routing::RoutingDecision;

use crate::AppState;

/// Tenant a request was routed to from its host. Identity only, not authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant(pub String);

/// Classify each request by host before routing: pass it through, redirect
/// `www.` tenant hosts, or rewrite the path into the tenant's storefront.
pub async fn tenant_routing(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())
        .map(str::to_owned);
    let Some(host) = host else {
        return next.run(req).await;
    };

    let decision = app_state.config.routing.resolve_and_route(
        &host,
        req.uri().path(),
        req.uri().query(),
    );

    match decision {
        RoutingDecision::Passthrough => next.run(req).await,
        RoutingDecision::Redirect { location } => {
            debug!(host = %host, location = %location, "Redirecting www tenant host");
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        RoutingDecision::Rewrite {
            tenant,
            path_and_query,
        } => {
            let rewritten: Result<Uri, http::Error> =
                PathAndQuery::try_from(path_and_query.as_str())
                    .map_err(http::Error::from)
                    .and_then(|pq| {
                        let mut parts = req.uri().clone().into_parts();
                        parts.path_and_query = Some(pq);
                        Uri::from_parts(parts).map_err(http::Error::from)
                    });
            match rewritten {
                Ok(uri) => {
                    debug!(host = %host, tenant = %tenant, from = %req.uri(), to = %uri, "Rewriting to tenant storefront");
                    *req.uri_mut() = uri;
                    req.extensions_mut().insert(ResolvedTenant(tenant));
                }
                Err(e) => warn!(host = %host, "Could not rewrite request URI, passing through: {}", e),
            }
            next.run(req).await
        }
    }
}
