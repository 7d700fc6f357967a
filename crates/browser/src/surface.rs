use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::BrowserError;

/// How a selector expression addresses the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    Css,
    XPath,
}

/// A concrete element address on the remote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub kind: LocatorKind,
    pub expr: String,
}

impl Locator {
    pub fn new(kind: LocatorKind, expr: impl Into<String>) -> Self {
        Self {
            kind,
            expr: expr.into(),
        }
    }
}

/// Interaction-level failures the driver reacts to. `Stale` means the
/// element resolved earlier no longer matches; callers re-resolve rather
/// than retrying blindly.
#[derive(Debug, Error)]
pub enum UiError {
    #[error("element not interactable")]
    NotInteractable,

    #[error("element went stale")]
    Stale,

    #[error("script evaluation: {0}")]
    Script(String),
}

/// One captured cookie of the automated session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<f64>,
    pub http_only: bool,
    pub secure: bool,
}

/// The element-level operations the driver needs from a page. Interaction
/// calls (`click`, `type_chunk`, `clear`, `value`) assume the locator was
/// resolved before and report `Stale` when it no longer matches.
#[async_trait]
pub trait UiSurface: Send + Sync {
    /// Does any element currently match?
    async fn present(&self, locator: &Locator) -> Result<bool, UiError>;

    /// Visible, enabled, and of non-zero extent?
    async fn interactive(&self, locator: &Locator) -> Result<bool, UiError>;

    /// Standard click, or the forced script-level path when `forced`.
    async fn click(&self, locator: &Locator, forced: bool) -> Result<(), UiError>;

    /// Append `text` to the element's value, firing input events.
    async fn type_chunk(&self, locator: &Locator, text: &str) -> Result<(), UiError>;

    /// Reset the element's value to empty.
    async fn clear(&self, locator: &Locator) -> Result<(), UiError>;

    /// The element's current value.
    async fn value(&self, locator: &Locator) -> Result<String, UiError>;
}

/// An isolated automated-browser session bound to one egress path.
/// Exclusively owned by the attempt that opened it.
#[async_trait]
pub trait ExecutionContext: UiSurface {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn cookies(&self) -> Result<Vec<SessionCookie>, BrowserError>;

    /// Tear the session down. Safe to call once; later calls are no-ops.
    async fn close(&mut self);
}

/// Opens execution contexts against an optional proxy connection string.
#[async_trait]
pub trait ContextProvisioner: Send + Sync {
    async fn open(&self, proxy: Option<&str>) -> Result<Box<dyn ExecutionContext>, BrowserError>;
}
