//! Request orchestration
//!
//! Every operation call follows the same sequence:
//!
//! 1. ask the limiter to admit the client for the endpoint class
//! 2. validate the input and run the collaborator on the blocking pool
//! 3. append exactly one log entry describing the outcome
//!
//! A rejected call never reaches step 2, and a malformed request is only
//! looked at after it has been admitted, so it still counts against the
//! client's limit. The sequence runs in its own task: if the client goes
//! away mid-request the entry is still written.

use crate::actor::RateLimiterHandle;
use crate::engines::{Engines, EngineError, OcrLanguage, QrStyle, parse_color, parse_languages};
use crate::error::{ApiError, Result};
use crate::journal::JournalHandle;
use crate::metrics::{Metrics, Outcome};
use crate::types::{AdmissionRequest, ClientKey, EndpointClass};
use qrgate::audit::{
    Action, Bucket, Detail, LogEntry, LogFilter, PendingEntry, StatsSummary,
};
use qrgate::codec::{self, COMPRESSED_MARKER};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Input of a generate call
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub text: String,
    pub compress: bool,
    pub color: Option<String>,
    pub bg_color: Option<String>,
    pub logo: Option<Vec<u8>>,
}

/// Input of a decode call
#[derive(Debug, Clone, Default)]
pub struct DecodeRequest {
    pub image: Vec<u8>,
}

/// Input of an OCR call
#[derive(Debug, Clone, Default)]
pub struct OcrRequest {
    pub image: Vec<u8>,
    /// Comma separated; the configured default when absent or blank
    pub languages: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeOutput {
    pub decoded: String,
    pub compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrOutput {
    pub text: String,
}

/// Tunables of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_languages: Vec<OcrLanguage>,
    pub engine_timeout: Duration,
}

#[derive(Clone)]
pub struct Orchestrator {
    limiter: RateLimiterHandle,
    journal: JournalHandle,
    engines: Engines,
    metrics: Arc<Metrics>,
    default_languages: Arc<[OcrLanguage]>,
    engine_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        limiter: RateLimiterHandle,
        journal: JournalHandle,
        engines: Engines,
        metrics: Arc<Metrics>,
        settings: OrchestratorSettings,
    ) -> Self {
        Orchestrator {
            limiter,
            journal,
            engines,
            metrics,
            default_languages: settings.default_languages.into(),
            engine_timeout: settings.engine_timeout,
        }
    }

    /// Render `text` as a QR code PNG
    ///
    /// `request` is an error when the transport could not parse the call;
    /// that error is reported only once the call has been admitted.
    pub async fn generate(
        &self,
        client: ClientKey,
        request: Result<GenerateRequest>,
    ) -> Result<Vec<u8>> {
        let this = self.clone();
        detach(async move {
            this.run(EndpointClass::Generate, client, || this.do_generate(request))
                .await
        })
        .await
    }

    /// Scan a QR code image, decompressing codec payloads
    pub async fn decode(
        &self,
        client: ClientKey,
        request: Result<DecodeRequest>,
    ) -> Result<DecodeOutput> {
        let this = self.clone();
        detach(async move {
            this.run(EndpointClass::Decode, client, || this.do_decode(request))
                .await
        })
        .await
    }

    /// Extract text from an image
    pub async fn ocr(&self, client: ClientKey, request: Result<OcrRequest>) -> Result<OcrOutput> {
        let this = self.clone();
        detach(async move {
            this.run(EndpointClass::Ocr, client, || this.do_ocr(request))
                .await
        })
        .await
    }

    /// Per-action counts, optionally bucketed by hour or day
    pub async fn stats(&self, bucket: Option<Bucket>) -> Result<StatsSummary> {
        Ok(self.journal.summarize(bucket).await?)
    }

    pub async fn logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>> {
        Ok(self.journal.query(filter).await?)
    }

    /// The whole log as CSV
    pub async fn export_csv(&self) -> Result<Vec<u8>> {
        Ok(self.journal.export_csv().await?)
    }

    /// Log a request to a non-operation route
    pub async fn record_access(&self, client: &ClientKey, path: &str) -> Result<()> {
        self.log(PendingEntry::new(
            Action::Access,
            client.as_str(),
            Detail::Accessed {
                path: path.to_string(),
            },
        ))
        .await
    }

    pub fn ocr_available(&self) -> bool {
        self.engines.ocr.is_available()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn run<T, F, Fut>(&self, class: EndpointClass, client: ClientKey, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Detail)>>,
    {
        let started = Instant::now();

        let outcome = match self.admit(class, &client).await {
            Ok(()) => work().await,
            Err(e) => Err(e),
        };

        let (result, entry) = match outcome {
            Ok((value, detail)) => (
                Ok(value),
                PendingEntry::new(class.success_action(), client.as_str(), detail),
            ),
            Err(e) => {
                let entry = PendingEntry::new(class.error_action(), client.as_str(), e.detail());
                (Err(e), entry)
            }
        };

        let result = match (result, self.log(entry).await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(storage)) => Err(storage),
            (Err(e), _) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => Outcome::Succeeded,
            Err(ApiError::RateLimited { .. }) => Outcome::Rejected,
            Err(_) => Outcome::Failed,
        };
        self.metrics
            .record_request(class, started.elapsed().as_micros() as u64, outcome);

        if let Err(e) = &result {
            tracing::debug!(%class, client = %client, error = %e, "Operation failed");
        }
        result
    }

    async fn admit(&self, class: EndpointClass, client: &ClientKey) -> Result<()> {
        let response = self
            .limiter
            .check(AdmissionRequest::new(class, client.clone()))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        if response.allowed {
            Ok(())
        } else {
            Err(ApiError::RateLimited {
                retry_after: response.retry_after,
            })
        }
    }

    async fn log(&self, entry: PendingEntry) -> Result<()> {
        match self.journal.record(entry).await {
            Ok(_) => {
                self.metrics.record_audit_entry();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record operation");
                self.metrics.record_audit_failure();
                Err(e.into())
            }
        }
    }

    /// Run a collaborator on the blocking pool, bounded by the engine timeout
    async fn call_engine<T, F>(&self, call: F) -> Result<T>
    where
        F: FnOnce(Engines) -> std::result::Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let engines = self.engines.clone();
        let task = tokio::task::spawn_blocking(move || call(engines));

        match tokio::time::timeout(self.engine_timeout, task).await {
            Ok(Ok(result)) => result.map_err(ApiError::from),
            Ok(Err(e)) => Err(ApiError::Internal(format!("engine task failed: {e}"))),
            Err(_) => Err(ApiError::Library(format!(
                "operation timed out after {} seconds",
                self.engine_timeout.as_secs_f64()
            ))),
        }
    }

    async fn do_generate(&self, request: Result<GenerateRequest>) -> Result<(Vec<u8>, Detail)> {
        let request = request?;
        if request.text.is_empty() {
            return Err(ApiError::Validation("text must not be empty".to_string()));
        }

        let style = QrStyle {
            foreground: parse_color(request.color.as_deref().unwrap_or("#000000"))?,
            background: parse_color(request.bg_color.as_deref().unwrap_or("#FFFFFF"))?,
            logo: request.logo.filter(|logo| !logo.is_empty()),
        };

        let payload = if request.compress {
            codec::compress(&request.text)?
        } else {
            request.text.as_bytes().to_vec()
        };
        let detail = Detail::Generated {
            text_len: request.text.chars().count(),
            payload_len: payload.len(),
            compressed: payload.first() == Some(&COMPRESSED_MARKER),
        };

        let png = self
            .call_engine(move |engines| engines.encoder.encode(&payload, &style))
            .await?;
        Ok((png, detail))
    }

    async fn do_decode(&self, request: Result<DecodeRequest>) -> Result<(DecodeOutput, Detail)> {
        let request = request?;
        if request.image.is_empty() {
            return Err(ApiError::Validation("image must not be empty".to_string()));
        }

        let image = request.image;
        let payload = self
            .call_engine(move |engines| engines.decoder.decode(&image))
            .await?;
        let decoded = codec::decode_payload(&payload)?;

        let detail = Detail::Decoded {
            payload_len: payload.len(),
            compressed: decoded.was_compressed(),
        };
        Ok((
            DecodeOutput {
                compressed: decoded.was_compressed(),
                decoded: decoded.text,
            },
            detail,
        ))
    }

    async fn do_ocr(&self, request: Result<OcrRequest>) -> Result<(OcrOutput, Detail)> {
        let request = request?;
        let languages: Vec<OcrLanguage> = match request.languages.as_deref() {
            Some(list) if !list.trim().is_empty() => parse_languages(list)?,
            _ => self.default_languages.to_vec(),
        };
        if request.image.is_empty() {
            return Err(ApiError::Validation("image must not be empty".to_string()));
        }

        let image = request.image;
        let langs = languages.clone();
        let text = self
            .call_engine(move |engines| engines.ocr.recognize(&image, &langs))
            .await?;

        let detail = Detail::Extracted {
            languages: languages.iter().map(|l| l.as_str().to_string()).collect(),
            text_len: text.chars().count(),
        };
        Ok((OcrOutput { text }, detail))
    }
}

/// Run `work` in its own task so that dropping the caller cannot cancel it
async fn detach<T, Fut>(work: Fut) -> Result<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| ApiError::Internal(format!("request task failed: {e}")))?
}
