//! Transports a bulk batch can be submitted through. The core only ever
//! sees the [`SubmitOutcome`] result shape; network-layer details stay in
//! here.

use std::io::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::SinkConfig;
use crate::render::WireDocument;

/// Per-batch submission result.
#[derive(Debug, Clone, Default)]
pub struct SubmitOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    /// Short descriptions (index + timestamp) of documents the endpoint
    /// rejected outright.
    pub dropped: Vec<String>,
}

impl SubmitOutcome {
    fn all_ok(count: usize) -> Self {
        Self {
            success_count: count,
            failure_count: 0,
            dropped: Vec::new(),
        }
    }
}

/// Transport dispatches batches to HTTP, stdout, or an in-memory buffer.
///
/// Uses enum dispatch rather than trait objects for zero-cost async dispatch
/// (avoids `Pin<Box<dyn Future>>` overhead on every submission).
pub enum Transport {
    Http(HttpTransport),
    Stdout(StdoutTransport),
    Memory(MemoryTransport),
}

impl Transport {
    /// Returns the transport name for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Http(_) => "http",
            Self::Stdout(_) => "stdout",
            Self::Memory(_) => "memory",
        }
    }

    /// Submits one batch. An `Err` is a transient transport failure the
    /// sink may retry; an `Ok` with `failure_count > 0` is a terminal
    /// per-document rejection.
    pub async fn submit(&self, documents: &[WireDocument]) -> Result<SubmitOutcome> {
        match self {
            Self::Http(t) => t.submit(documents).await,
            Self::Stdout(t) => t.submit(documents),
            Self::Memory(t) => t.submit(documents),
        }
    }
}

/// NDJSON bulk submission over HTTP, optionally gzip-compressed.
pub struct HttpTransport {
    client: reqwest::Client,
    address: String,
    gzip: bool,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new(cfg: &SinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            address: cfg.address.clone(),
            gzip: cfg.gzip,
            headers: cfg.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    async fn submit(&self, documents: &[WireDocument]) -> Result<SubmitOutcome> {
        let body = encode_bulk(documents)?;
        let raw_len = body.len();

        let payload = if self.gzip {
            compress_gzip(&body).context("compressing bulk body")?
        } else {
            body
        };

        let mut request = self
            .client
            .post(&self.address)
            .header("Content-Type", "application/x-ndjson")
            .body(payload);

        if self.gzip {
            request = request.header("Content-Encoding", "gzip");
        }
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.context("sending bulk request")?;
        let status = response.status();
        // Drain body for connection reuse.
        let _ = response.bytes().await;

        if !status.is_success() {
            bail!("bulk endpoint returned status {status}");
        }

        tracing::debug!(
            docs = documents.len(),
            bytes = raw_len,
            "submitted bulk batch",
        );

        Ok(SubmitOutcome::all_ok(documents.len()))
    }
}

/// Serializes documents as action/source NDJSON line pairs. Routing comes
/// from each document's own index, never from out-of-band metadata.
fn encode_bulk(documents: &[WireDocument]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(documents.len() * 384);
    for doc in documents {
        serde_json::to_writer(
            &mut buf,
            &serde_json::json!({"create": {"_index": doc.index}}),
        )
        .context("serializing bulk action")?;
        buf.push(b'\n');
        serde_json::to_writer(&mut buf, &doc.body).context("serializing document")?;
        buf.push(b'\n');
    }
    Ok(buf)
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).context("gzip write")?;
    encoder.finish().context("gzip finish")
}

/// Writes documents as NDJSON to stdout, one object per line with the
/// routing index inlined. Useful for piping into external loaders.
#[derive(Default)]
pub struct StdoutTransport;

impl StdoutTransport {
    pub fn new() -> Self {
        Self
    }

    fn submit(&self, documents: &[WireDocument]) -> Result<SubmitOutcome> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for doc in documents {
            let mut line = doc.body.clone();
            if let Some(map) = line.as_object_mut() {
                map.insert(
                    "_index".to_string(),
                    serde_json::Value::String(doc.index.clone()),
                );
            }
            serde_json::to_writer(&mut out, &line).context("writing document")?;
            out.write_all(b"\n").context("writing newline")?;
        }
        Ok(SubmitOutcome::all_ok(documents.len()))
    }
}

/// Collects batches in memory. Used by tests and dry runs; can be primed to
/// fail the first N submissions to exercise the retry path.
#[derive(Default)]
pub struct MemoryTransport {
    received: Arc<parking_lot::Mutex<Vec<Vec<WireDocument>>>>,
    fail_remaining: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `n` submissions with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Batches received so far, in submission order.
    pub fn batches(&self) -> Vec<Vec<WireDocument>> {
        self.received.lock().clone()
    }

    /// All received documents flattened, in submission order.
    pub fn documents(&self) -> Vec<WireDocument> {
        self.received.lock().iter().flatten().cloned().collect()
    }

    fn submit(&self, documents: &[WireDocument]) -> Result<SubmitOutcome> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            bail!("injected transport failure ({remaining} remaining)");
        }
        self.received.lock().push(documents.to_vec());
        Ok(SubmitOutcome::all_ok(documents.len()))
    }
}
