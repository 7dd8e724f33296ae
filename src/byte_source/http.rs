use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use exponential_backoff::Backoff;
use url::Url;

use super::{ByteSource, SeekOrigin};
use crate::error::{DemuxError, DemuxResult, ErrorKind};

/// Env var overriding the HTTP backend's per-request timeout, in
/// milliseconds.
pub const ENV_HTTP_TIMEOUT_MS: &str = "DEMUX_HTTP_TIMEOUT_MS";

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const MAX_RETRIES: u32 = 5;
const MAX_CLIENTS_PER_HOST: usize = 1;

struct ClientPool {
    clients: Mutex<HashMap<String, reqwest::blocking::Client>>,
}

impl ClientPool {
    fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, host: &str, timeout: Duration) -> reqwest::blocking::Client {
        let mut clients = self.clients.lock().unwrap();
        if clients.len() >= MAX_CLIENTS_PER_HOST * 8 {
            clients.clear();
        }
        clients
            .entry(host.to_string())
            .or_insert_with(|| {
                reqwest::blocking::Client::builder()
                    .timeout(timeout)
                    .build()
                    .expect("reqwest client builder is infallible for default TLS config")
            })
            .clone()
    }
}

/// A [`ByteSource`] over an HTTP(S) resource, using `Range` GETs for
/// seeking.
///
/// Grounded in the behaviours spec'd for the HTTP backend: an initial
/// ranged GET establishes size when the server reports `Content-Range`;
/// subsequent seeks issue fresh ranged requests. `{Io, Timeout}` are
/// retried with exponential backoff via the `exponential-backoff` crate,
/// matching the retry/backoff idiom the pack's `scred47-pleezer` crate
/// uses for its own HTTP streaming.
pub struct HttpByteSource {
    url: Url,
    pool: Arc<ClientPool>,
    timeout: Duration,
    position: u64,
    size: Option<u64>,
    closed: bool,
    supports_range: bool,
}

impl HttpByteSource {
    /// Opens `url`, issuing a 0-byte ranged GET to probe size and range
    /// support.
    pub fn open(url: &str) -> DemuxResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| DemuxError::new(ErrorKind::Validation, format!("invalid URL: {e}")))?;
        let timeout = Duration::from_millis(
            env::var(ENV_HTTP_TIMEOUT_MS)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );
        let pool = Arc::new(ClientPool::new());

        let mut source = Self {
            url,
            pool,
            timeout,
            position: 0,
            size: None,
            closed: false,
            supports_range: false,
        };
        source.probe()?;
        Ok(source)
    }

    fn host(&self) -> String {
        self.url.host_str().unwrap_or("").to_string()
    }

    fn probe(&mut self) -> DemuxResult<()> {
        let client = self.pool.client_for(&self.host(), self.timeout);
        let resp = self
            .retrying(|| {
                client
                    .get(self.url.clone())
                    .header("Range", "bytes=0-0")
                    .send()
            })?;

        self.supports_range = resp.status().as_u16() == 206;
        self.size = resp
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|total| total.parse::<u64>().ok())
            .or_else(|| resp.content_length());
        Ok(())
    }

    fn retrying<F>(&self, mut request: F) -> DemuxResult<reqwest::blocking::Response>
    where
        F: FnMut() -> reqwest::Result<reqwest::blocking::Response>,
    {
        let backoff = Backoff::new(MAX_RETRIES, Duration::from_millis(100), Duration::from_secs(5));
        let mut last_err = None;
        for duration in backoff.into_iter().map(Some).chain(std::iter::once(None)) {
            match request() {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().is_client_error() => {
                    return Err(DemuxError::new(
                        ErrorKind::Io,
                        format!("HTTP {} (non-retryable)", resp.status()),
                    ));
                }
                Ok(resp) => last_err = Some(format!("HTTP {}", resp.status())),
                Err(e) if e.is_timeout() => last_err = Some(format!("timeout: {e}")),
                Err(e) => last_err = Some(e.to_string()),
            }
            match duration {
                Some(d) => std::thread::sleep(d),
                None => break,
            }
        }
        Err(DemuxError::new(
            ErrorKind::Timeout,
            last_err.unwrap_or_else(|| "HTTP request failed".into()),
        ))
    }

    fn range_get(&self, start: u64, len: usize) -> DemuxResult<Vec<u8>> {
        let client = self.pool.client_for(&self.host(), self.timeout);
        let end = start + len as u64 - 1;
        let range = format!("bytes={start}-{end}");
        let resp = self.retrying(|| {
            client
                .get(self.url.clone())
                .header("Range", range.clone())
                .send()
        })?;
        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(|e| DemuxError::new(ErrorKind::Io, e.to_string()))
    }
}

impl ByteSource for HttpByteSource {
    fn read(&mut self, buf: &mut [u8]) -> DemuxResult<usize> {
        if self.closed {
            return Err(DemuxError::new(ErrorKind::Closed, "read on closed HTTP source"));
        }
        if let Some(size) = self.size {
            if self.position >= size {
                return Ok(0);
            }
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let want = match self.size {
            Some(size) => buf.len().min((size - self.position) as usize),
            None => buf.len(),
        };
        if want == 0 {
            return Ok(0);
        }
        let bytes = self.range_get(self.position, want)?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> DemuxResult<u64> {
        if self.closed {
            return Err(DemuxError::new(ErrorKind::Closed, "seek on closed HTTP source"));
        }
        let base = match origin {
            SeekOrigin::Start => 0i64,
            SeekOrigin::Current => self.position as i64,
            SeekOrigin::End => self.size.unwrap_or(0) as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(DemuxError::new(
                ErrorKind::Validation,
                "negative absolute seek position",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    fn tell(&mut self) -> DemuxResult<u64> {
        if self.closed {
            return Err(DemuxError::new(ErrorKind::Closed, "tell on closed HTTP source"));
        }
        Ok(self.position)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
