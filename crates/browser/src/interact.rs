use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::finder::ResolvedElement;
use crate::surface::{UiError, UiSurface};

/// Fixed pause between interaction retries.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum InteractError {
    /// The element no longer matches; the caller should re-resolve
    /// instead of retrying blindly.
    #[error("element went stale during interaction")]
    Stale,

    #[error("interaction retries exhausted")]
    RetriesExhausted,

    #[error("typed value did not stick after recovery")]
    VerificationFailed,

    #[error(transparent)]
    Surface(UiError),
}

/// Resilient clicking and typing against a resolved element.
pub struct Interactor<'a> {
    surface: &'a dyn UiSurface,
    max_retries: u32,
    humanize: bool,
}

impl<'a> Interactor<'a> {
    pub fn new(surface: &'a dyn UiSurface, max_retries: u32, humanize: bool) -> Self {
        Self {
            surface,
            max_retries,
            humanize,
        }
    }

    /// Click with bounded retries. The first try uses the standard
    /// interaction; a not-interactable condition flips subsequent tries
    /// onto the forced script-level path. A stale element aborts
    /// immediately so the caller can re-resolve.
    pub async fn click(&self, element: &ResolvedElement) -> Result<(), InteractError> {
        let locator = element.locator();
        let mut forced = false;

        for attempt in 1..=self.max_retries.max(1) {
            match self.surface.click(&locator, forced).await {
                Ok(()) => {
                    debug!(query = %element.query, forced, "click succeeded");
                    return Ok(());
                }
                Err(UiError::NotInteractable) => {
                    warn!(query = %element.query, attempt, "element not interactable, switching to forced click");
                    forced = true;
                }
                Err(UiError::Stale) => {
                    warn!(query = %element.query, "element went stale mid-click");
                    return Err(InteractError::Stale);
                }
                Err(e) => {
                    warn!(query = %element.query, attempt, error = %e, "click failed");
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }

        Err(InteractError::RetriesExhausted)
    }

    /// Type `text` into the element and verify it stuck. On a mismatch,
    /// exactly one recovery pass (clear + resubmit) runs before failing.
    pub async fn type_text(
        &self,
        element: &ResolvedElement,
        text: &str,
    ) -> Result<(), InteractError> {
        let locator = element.locator();

        self.surface.clear(&locator).await.map_err(map_ui)?;
        self.send(&locator, text).await?;

        if self.surface.value(&locator).await.map_err(map_ui)? == text {
            debug!(query = %element.query, "typed value verified");
            return Ok(());
        }

        warn!(query = %element.query, "typed value mismatch, running recovery pass");
        self.surface.clear(&locator).await.map_err(map_ui)?;
        self.surface.type_chunk(&locator, text).await.map_err(map_ui)?;

        if self.surface.value(&locator).await.map_err(map_ui)? == text {
            Ok(())
        } else {
            Err(InteractError::VerificationFailed)
        }
    }

    /// Paced character-by-character input when humanizing, one chunk
    /// otherwise.
    async fn send(&self, locator: &crate::surface::Locator, text: &str) -> Result<(), InteractError> {
        if !self.humanize {
            return self.surface.type_chunk(locator, text).await.map_err(map_ui);
        }

        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.surface
                .type_chunk(locator, ch.encode_utf8(&mut buf))
                .await
                .map_err(map_ui)?;
            let pause = rand::thread_rng().gen_range(50..150);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
        Ok(())
    }
}

fn map_ui(e: UiError) -> InteractError {
    match e {
        UiError::Stale => InteractError::Stale,
        other => InteractError::Surface(other),
    }
}
