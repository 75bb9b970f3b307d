//! Request-scoped middleware: structured access logging and the
//! rate-limit response-shaping point. Per §4.7, the limiter itself is a
//! reverse-proxy/sidecar concern, not this crate's (Non-goal); this
//! middleware only translates that external verdict into the
//! `AppError::RateLimited` 429 + Retry-After shape every client sees, so the
//! sidecar has one stable contract to populate regardless of which limiter
//! fronts a given deployment.

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;

use crate::error::AppError;

/// Header an upstream limiter sets once it has decided to reject a request;
/// its value is the `Retry-After` seconds to echo back. Requests without the
/// header pass straight through — absence means no sidecar is in front of
/// this instance (e.g. local dev), not "allow everything forever."
pub const RATE_LIMIT_VERDICT_HEADER: &str = "x-ratelimit-retry-after";

#[derive(Clone, Default)]
pub struct RateLimitMiddleware;

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let retry_after_s = req
            .headers()
            .get(RATE_LIMIT_VERDICT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let service = self.service.clone();

        Box::pin(async move {
            if let Some(retry_after_s) = retry_after_s {
                return Err(AppError::RateLimited { retry_after_s }.into());
            }
            service.call(req).await
        })
    }
}

pub struct RequestMetrics;

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestMetricsService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestMetricsService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestMetricsService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestMetricsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let path = req.path().to_string();
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let res = service.call(req).await;
            let elapsed = start.elapsed();
            tracing::debug!(%method, %path, elapsed_ms = elapsed.as_millis(), "request completed");
            if let Ok(res) = &res {
                crate::metrics::observe_http_request(
                    &method,
                    &path,
                    res.status().as_u16(),
                    elapsed.as_secs_f64(),
                );
            }
            res
        })
    }
}
