use crate::capture::{CapturedBody, RequestSnapshot, decode_body};
use crate::context::RequestContext;
use crate::layer::Shared;
use http::StatusCode;
use reqtrail_core::entry::round_ms;
use reqtrail_core::ip::anonymize_ip;
use reqtrail_core::mask::too_large_placeholder;
use reqtrail_core::{LogEntry, Origin, limit_size};
use std::sync::Arc;
use tracing::debug;

/// Everything gathered for one request, waiting for the response to finish.
pub(crate) struct PendingEntry {
    shared: Arc<Shared>,
    context: RequestContext,
    request: RequestSnapshot,
    status: StatusCode,
    origin: Option<Origin>,
}

impl PendingEntry {
    pub fn new(
        shared: Arc<Shared>,
        context: RequestContext,
        request: RequestSnapshot,
        status: StatusCode,
        origin: Option<Origin>,
    ) -> Self {
        Self {
            shared,
            context,
            request,
            status,
            origin,
        }
    }

    /// Build the entry, hand it to the callback and queue it for writing.
    ///
    /// Runs once, synchronously, when the response has been sent.
    pub fn finish(self, response_snippet: Option<String>) {
        let settings = &self.shared.config.settings;
        if settings.only_log_on_error && self.status.as_u16() < 400 {
            debug!(
                request_id = %self.context.request_id,
                status = self.status.as_u16(),
                "Non-error response, not logged"
            );
            return;
        }

        let entry = self.assemble(response_snippet);
        if let Some(on_log) = &self.shared.config.on_log {
            on_log(&entry);
        }
        self.shared.writer.append(&entry, settings.pretty_print);
    }

    fn assemble(&self, response_snippet: Option<String>) -> LogEntry {
        let shared = &self.shared;
        let settings = &shared.config.settings;
        let request = &self.request;
        let duration_ms = round_ms(self.context.started.elapsed());

        let mut entry = LogEntry::new(
            self.context.request_id.clone(),
            request.method.clone(),
            request.route.clone(),
            self.status.as_u16(),
        );
        entry.ip = Some(request.ip.clone());
        entry.duration_ms = duration_ms;
        entry.user = request.user.clone();
        if settings.capture_body {
            entry.body = self.body();
        }
        entry.response_snippet = response_snippet;
        entry.slow = settings.slow_flag(duration_ms);
        entry.query = request.query.as_ref().map(|q| shared.masker.mask_value(q));
        entry.origin = self.origin.clone();
        entry.location = shared.geo.locate(Some(request.ip.as_str()));
        entry.headers = request.headers.as_ref().map(|h| shared.masker.mask_value(h));
        entry.params = request.params.clone();

        if settings.anonymize_ips {
            entry.ip = entry.ip.as_deref().map(anonymize_ip);
        }
        entry
    }

    fn body(&self) -> Option<serde_json::Value> {
        let buffer = self.request.body.as_ref()?;
        match buffer.take() {
            CapturedBody::Empty => None,
            CapturedBody::Overflowed => Some(too_large_placeholder()),
            CapturedBody::Bytes(bytes) => {
                let decoded = decode_body(&bytes, self.request.content_type.as_deref());
                let masked = self.shared.masker.mask_value(&decoded);
                Some(limit_size(masked, self.shared.config.settings.max_body_size))
            }
        }
    }
}
