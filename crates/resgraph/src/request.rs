//! Request construction and the per-batch query context.

use crate::error::{Error, Result};
use reqwest::header::{HeaderValue, CONTENT_TYPE, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Method, Request};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use url::Url;

/// `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("resgraph/", env!("CARGO_PKG_VERSION"));

/// Deadline and cancellation shared by every query of a batch.
#[derive(Debug, Clone)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

/// Cancels every [`QueryContext`] cloned from the one it was created with.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace succeeds even when every receiver is gone.
        self.0.send_replace(true);
    }
}

impl QueryContext {
    /// Context with no deadline that is never cancelled.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancel: rx,
        }
    }

    /// Copy of this context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Copy of this context expiring at `deadline`, or earlier if already set.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// Cancellable context plus the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: rx,
            },
            CancelHandle(tx),
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the context is cancelled; never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without cancelling: nothing can cancel us now.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Resolves once the deadline passes; never resolves without one.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Build the outbound POST for a Resource Graph query.
///
/// The request targets `url` with a trailing `/`, carries exactly the
/// `Content-Type` and `User-Agent` headers, and inherits the remaining
/// time of `ctx` as its timeout.
pub fn construct_request(ctx: &QueryContext, body: Vec<u8>, url: &str) -> Result<Request> {
    let mut target =
        Url::parse(url).map_err(|e| Error::Construction(format!("invalid base URL '{url}': {e}")))?;
    if target.cannot_be_a_base() {
        return Err(Error::Construction(format!(
            "invalid base URL '{url}': not a hierarchical URL"
        )));
    }
    if !target.path().ends_with('/') {
        let path = format!("{}/", target.path());
        target.set_path(&path);
    }

    let mut request = Request::new(Method::POST, target);
    let headers = request.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
    *request.body_mut() = Some(body.into());
    *request.timeout_mut() = ctx.remaining();

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_a_request() {
        let req = construct_request(&QueryContext::background(), Vec::new(), "http://ds").unwrap();

        assert_eq!(req.url().as_str(), "http://ds/");
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.headers()[CONTENT_TYPE], "application/json");
        let ua = req.headers()[USER_AGENT_HEADER].to_str().unwrap();
        assert!(ua.starts_with("resgraph/"), "{ua}");
        assert!(req.timeout().is_none());
    }

    #[test]
    fn test_trailing_slash_is_appended_to_paths() {
        let ctx = QueryContext::background();
        let req = construct_request(&ctx, Vec::new(), "https://example.com/arg").unwrap();
        assert_eq!(req.url().as_str(), "https://example.com/arg/");

        let req = construct_request(&ctx, Vec::new(), "https://example.com/arg/").unwrap();
        assert_eq!(req.url().as_str(), "https://example.com/arg/");
    }

    #[test]
    fn test_body_is_attached() {
        let body = br#"{"query":"resources"}"#.to_vec();
        let req = construct_request(&QueryContext::background(), body.clone(), "http://ds").unwrap();
        let attached = req.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(attached, body.as_slice());
    }

    #[test]
    fn test_malformed_base_url() {
        for bad in ["", "not a url", "://missing-scheme", "mailto:ops@example.com"] {
            assert!(
                matches!(
                    construct_request(&QueryContext::background(), Vec::new(), bad),
                    Err(Error::Construction(_))
                ),
                "{bad:?} should fail"
            );
        }
    }

    #[tokio::test]
    async fn test_deadline_becomes_request_timeout() {
        let ctx = QueryContext::background().with_timeout(Duration::from_secs(10));
        let req = construct_request(&ctx, Vec::new(), "http://ds").unwrap();
        let timeout = req.timeout().copied().unwrap();
        assert!(timeout <= Duration::from_secs(10));
        assert!(timeout > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_earlier_deadline_wins() {
        let ctx = QueryContext::background().with_timeout(Duration::from_secs(1));
        let later = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(later.deadline(), ctx.deadline());
    }

    #[tokio::test]
    async fn test_cancel_handle() {
        let (ctx, handle) = QueryContext::with_cancel();
        let child = ctx.with_timeout(Duration::from_secs(60));
        assert!(!child.is_cancelled());

        handle.cancel();
        assert!(child.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("cancellation should be observed");
    }

    #[tokio::test]
    async fn test_background_is_never_cancelled() {
        let ctx = QueryContext::background();
        let waited = tokio::time::timeout(Duration::from_millis(20), ctx.cancelled()).await;
        assert!(waited.is_err());
    }
}
