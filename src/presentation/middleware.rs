use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
};
use std::{
    future::{Ready, ready},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Instant,
};
use tracing::{Instrument, Span, info, info_span, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Correlation id for one HTTP request, readable from request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Opens a `registration_request` span around each request.
///
/// Handler spans (carrying `email`, `partial_id`, `user_id`) nest under it, so every
/// log line of a signup step shares one `request_id`. The id and the elapsed time are
/// echoed back in response headers.
pub struct RequestContextMiddleware;

impl<S, B> Transform<S, ServiceRequest> for RequestContextMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestContextService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestContextService {
            inner: Rc::new(service),
        }))
    }
}

pub struct RequestContextService<S> {
    inner: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestContextService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let request_id = RequestId(Uuid::new_v4().to_string());
        let span = info_span!(
            "registration_request",
            request_id = %request_id.0,
            method = %req.method(),
            path = %req.path(),
            status = tracing::field::Empty,
        );

        req.extensions_mut().insert(request_id.clone());
        let fut = span.in_scope(|| self.inner.call(req));

        Box::pin(
            async move {
                let mut res = fut.await?;
                let elapsed_ms = started.elapsed().as_millis();
                let status = res.status();
                Span::current().record("status", status.as_u16());

                let headers = res.headers_mut();
                headers.insert(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    HeaderValue::from_str(&request_id.0)
                        .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
                );
                headers.insert(
                    HeaderName::from_static(RESPONSE_TIME_HEADER),
                    HeaderValue::from_str(&format!("{elapsed_ms}ms"))
                        .unwrap_or_else(|_| HeaderValue::from_static("0ms")),
                );

                if status.is_server_error() {
                    warn!(elapsed_ms = elapsed_ms, "Registration request failed");
                } else {
                    info!(elapsed_ms = elapsed_ms, "Registration request handled");
                }
                Ok(res)
            }
            .instrument(span),
        )
    }
}
