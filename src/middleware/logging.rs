//! Per-invocation request logging.
//!
//! Every request is one trigger invocation. It gets a fresh UUID that is logged on
//! start and completion and echoed back in the `x-invocation-id` response header,
//! so a trigger's delivery log can be matched against ours.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const INVOCATION_ID_HEADER: &str = "x-invocation-id";

/// Invocation id stored in the request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    /// Id assigned to `req` by [`InvocationLogging`], if it ran.
    pub fn of(req: &HttpRequest) -> Option<Uuid> {
        req.extensions().get::<InvocationId>().map(|id| id.0)
    }
}

pub struct InvocationLogging;

impl<S, B> Transform<S, ServiceRequest> for InvocationLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = InvocationLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(InvocationLoggingMiddleware { service }))
    }
}

pub struct InvocationLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for InvocationLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let invocation_id = Uuid::new_v4();
        let method = req.method().to_string();
        let path = req.path().to_string();

        req.extensions_mut().insert(InvocationId(invocation_id));
        info!(
            invocation_id = %invocation_id,
            method = %method,
            path = %path,
            "Invocation started"
        );

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis();

            match result {
                Ok(mut response) => {
                    let status = response.status();
                    if status.is_server_error() || status.is_client_error() {
                        warn!(
                            invocation_id = %invocation_id,
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            duration_ms = %duration_ms,
                            "Invocation failed"
                        );
                    } else {
                        info!(
                            invocation_id = %invocation_id,
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            duration_ms = %duration_ms,
                            "Invocation completed"
                        );
                    }
                    if let Ok(value) = HeaderValue::from_str(&invocation_id.to_string()) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(INVOCATION_ID_HEADER), value);
                    }
                    Ok(response)
                }
                Err(err) => {
                    error!(
                        invocation_id = %invocation_id,
                        method = %method,
                        path = %path,
                        duration_ms = %duration_ms,
                        error = %err,
                        "Invocation errored"
                    );
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn echo_id(req: HttpRequest) -> HttpResponse {
        let id = InvocationId::of(&req).map(|id| id.to_string());
        HttpResponse::Ok().body(id.unwrap_or_default())
    }

    #[actix_web::test]
    async fn test_invocation_id_header_matches_extension() {
        let app = test::init_service(
            App::new()
                .wrap(InvocationLogging)
                .route("/", web::get().to(echo_id)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let header = resp
            .headers()
            .get(INVOCATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap();
        let body = test::read_body(resp).await;

        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(body, header.as_bytes());
    }
}
