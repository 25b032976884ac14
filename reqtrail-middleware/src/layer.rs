use crate::body::{CaptureBody, FinishBody};
use crate::capture::{BodyBuffer, RequestSnapshot, capture_limit, params_object};
use crate::config::LoggerConfig;
use crate::context::{RequestContext, RequestId, correlation_id};
use crate::pending::PendingEntry;
use axum::body::Body;
use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::response::Response;
use reqtrail_core::{FieldMasker, GeoEnricher};
use reqtrail_writer::LogWriter;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

/// State shared by every request passing through one layer.
pub(crate) struct Shared {
    pub config: LoggerConfig,
    pub masker: FieldMasker,
    pub geo: GeoEnricher,
    pub writer: LogWriter,
}

/// Tower layer that writes one structured entry per request.
///
/// Building the layer starts the background writer, so it must happen inside
/// a tokio runtime.
#[derive(Clone)]
pub struct RequestLoggerLayer {
    shared: Arc<Shared>,
}

impl RequestLoggerLayer {
    pub fn new(config: LoggerConfig) -> Self {
        let writer = LogWriter::spawn(
            config.settings.log_file.clone(),
            Arc::clone(&config.error_reporter),
        );
        let masker = FieldMasker::new(config.settings.mask_fields.iter().cloned());
        let geo = GeoEnricher::new(config.settings.enable_geoip, config.geo_lookup.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                masker,
                geo,
                writer,
            }),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.shared.config
    }

    pub fn writer(&self) -> &LogWriter {
        &self.shared.writer
    }

    /// Wait until every entry finished so far has been written.
    pub async fn flush(&self) {
        self.shared.writer.flush().await;
    }
}

impl std::fmt::Debug for RequestLoggerLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLoggerLayer")
            .field("config", &self.shared.config)
            .finish()
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggerService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

#[derive(Clone)]
pub struct RequestLoggerService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S> Service<Request> for RequestLoggerService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let settings = &shared.config.settings;

        if settings.is_excluded(request.uri().path()) {
            debug!(path = %request.uri().path(), "Path excluded from request logging");
            return Box::pin(self.inner.call(request));
        }

        let context = RequestContext::start(correlation_id(
            request.headers(),
            &settings.request_id_header,
            shared.config.id_generator.as_ref(),
        ));
        request
            .extensions_mut()
            .insert(RequestId(context.request_id.clone()));

        let body_buffer = settings
            .capture_body
            .then(|| BodyBuffer::new(capture_limit(settings.max_body_size)));
        if let Some(buffer) = &body_buffer {
            let body = std::mem::replace(request.body_mut(), Body::empty());
            *request.body_mut() = Body::new(CaptureBody::new(body, buffer.clone()));
        }

        // The ready service moves into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let settings = &shared.config.settings;
            let (mut parts, body) = request.into_parts();
            let params = if settings.log_params {
                RawPathParams::from_request_parts(&mut parts, &())
                    .await
                    .ok()
                    .and_then(|params| params_object(&params))
            } else {
                None
            };
            let snapshot = RequestSnapshot::capture(&shared.config, &parts, params, body_buffer);

            let mut response = inner.call(Request::from_parts(parts, body)).await?;

            let suppressed = settings.only_log_on_error && response.status().as_u16() < 400;
            let origin = if settings.track_origin && !suppressed {
                shared.config.origin_provider.resolve(response.extensions())
            } else {
                None
            };
            let pending = PendingEntry::new(
                Arc::clone(&shared),
                context,
                snapshot,
                response.status(),
                origin,
            );
            let capture_snippet = settings.log_response_body;
            let body = std::mem::replace(response.body_mut(), Body::empty());
            *response.body_mut() = Body::new(FinishBody::new(body, pending, capture_snippet));
            Ok(response)
        })
    }
}
