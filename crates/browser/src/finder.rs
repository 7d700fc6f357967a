use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use regforge_core::retry::BackoffPolicy;

use crate::selectors::{ElementQuery, SelectorStrategy};
use crate::surface::{Locator, UiSurface};

/// Pause between full strategy sweeps.
const SWEEP_BACKOFF: Duration = Duration::from_millis(500);
/// Poll cadence while waiting for one strategy's presence.
const PRESENCE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum FindError {
    #[error("element not found: {query}")]
    NotFound { query: String },
}

/// An element that matched: which query it answers and the strategy that
/// found it. Interactions address it through the strategy's locator and
/// re-resolve through the same query when it goes stale.
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    pub query: String,
    pub strategy: SelectorStrategy,
}

impl ResolvedElement {
    pub fn locator(&self) -> Locator {
        self.strategy.locator()
    }
}

/// Ranked-strategy element resolution: strategies are swept in priority
/// order, each with its own presence budget, and the first interactive
/// match wins. Missed sweeps repeat on a fixed backoff until the overall
/// timeout elapses.
pub struct ElementFinder<'a> {
    surface: &'a dyn UiSurface,
}

impl<'a> ElementFinder<'a> {
    pub fn new(surface: &'a dyn UiSurface) -> Self {
        Self { surface }
    }

    pub async fn find(
        &self,
        query: &ElementQuery,
        timeout: Duration,
    ) -> Result<ResolvedElement, FindError> {
        let policy = BackoffPolicy::deadline(timeout, SWEEP_BACKOFF);

        let outcome = policy
            .run(|sweep| {
                debug!(query = %query.name, sweep, "sweeping strategies");
                self.sweep(query)
            })
            .await;

        outcome.into_value().ok_or_else(|| {
            info!(query = %query.name, "no strategy produced an interactive element");
            FindError::NotFound {
                query: query.name.clone(),
            }
        })
    }

    /// One pass over the chain. Returns on the first interactive match;
    /// later strategies are never consulted past it.
    async fn sweep(&self, query: &ElementQuery) -> Option<ResolvedElement> {
        for strategy in query.strategies() {
            if !self.await_presence(strategy).await {
                continue;
            }

            match self.surface.interactive(&strategy.locator()).await {
                Ok(true) => {
                    info!(query = %query.name, strategy = %strategy.name, "element resolved");
                    return Some(ResolvedElement {
                        query: query.name.clone(),
                        strategy: strategy.clone(),
                    });
                }
                Ok(false) => {
                    debug!(strategy = %strategy.name, "present but not interactable");
                }
                Err(e) => {
                    debug!(strategy = %strategy.name, error = %e, "interactivity check failed");
                }
            }
        }
        None
    }

    /// Wait up to the strategy's own budget for presence.
    async fn await_presence(&self, strategy: &SelectorStrategy) -> bool {
        let policy = BackoffPolicy::deadline(
            Duration::from_secs(strategy.timeout_secs),
            PRESENCE_POLL,
        );
        let locator = strategy.locator();

        policy
            .run(|_| async {
                match self.surface.present(&locator).await {
                    Ok(true) => Some(()),
                    Ok(false) => None,
                    Err(e) => {
                        debug!(strategy = %strategy.name, error = %e, "presence check failed");
                        None
                    }
                }
            })
            .await
            .into_value()
            .is_some()
    }
}
