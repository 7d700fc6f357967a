use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::finder::{ElementFinder, FindError};
use crate::interact::{InteractError, Interactor};
use crate::selectors::ElementQuery;
use crate::surface::UiSurface;

/// Where a UI step currently is. A stale element during `Interacting`
/// moves the step back to `Searching` within the same retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Searching,
    Found,
    Interacting,
    Verified,
    Failed,
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("element not found for step '{query}'")]
    NotFound { query: String },

    #[error("interaction failed for step '{query}': {reason}")]
    Interaction { query: String, reason: String },
}

/// Runs one resolve-then-interact step: Searching -> Found -> Interacting
/// -> Verified, or Failed on a search timeout / exhausted retries.
pub struct StepRunner<'a> {
    surface: &'a dyn UiSurface,
    find_timeout: Duration,
    max_retries: u32,
    humanize: bool,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        surface: &'a dyn UiSurface,
        find_timeout: Duration,
        max_retries: u32,
        humanize: bool,
    ) -> Self {
        Self {
            surface,
            find_timeout,
            max_retries,
            humanize,
        }
    }

    pub async fn click_step(&self, query: &ElementQuery) -> Result<(), StepError> {
        self.run_step(query, |interactor, element| async move {
            interactor.click(&element).await
        })
        .await
    }

    pub async fn type_step(&self, query: &ElementQuery, text: &str) -> Result<(), StepError> {
        self.run_step(query, |interactor, element| async move {
            interactor.type_text(&element, text).await
        })
        .await
    }

    async fn run_step<F, Fut>(&self, query: &ElementQuery, interaction: F) -> Result<(), StepError>
    where
        F: Fn(Interactor<'a>, crate::finder::ResolvedElement) -> Fut,
        Fut: std::future::Future<Output = Result<(), InteractError>>,
    {
        let finder = ElementFinder::new(self.surface);
        // Stale re-resolutions share the interaction retry budget.
        let mut reresolutions = self.max_retries;

        loop {
            debug!(query = %query.name, state = ?StepState::Searching, "step state");

            let element = match finder.find(query, self.find_timeout).await {
                Ok(element) => element,
                Err(FindError::NotFound { query }) => {
                    warn!(query = %query, state = ?StepState::Failed, "step failed while searching");
                    return Err(StepError::NotFound { query });
                }
            };
            debug!(query = %query.name, state = ?StepState::Found, strategy = %element.strategy.name, "step state");

            debug!(query = %query.name, state = ?StepState::Interacting, "step state");
            let interactor = Interactor::new(self.surface, self.max_retries, self.humanize);
            match interaction(interactor, element).await {
                Ok(()) => {
                    debug!(query = %query.name, state = ?StepState::Verified, "step complete");
                    return Ok(());
                }
                Err(InteractError::Stale) if reresolutions > 0 => {
                    reresolutions -= 1;
                    debug!(query = %query.name, remaining = reresolutions, "stale element, re-resolving");
                }
                Err(e) => {
                    warn!(query = %query.name, state = ?StepState::Failed, error = %e, "step failed while interacting");
                    return Err(StepError::Interaction {
                        query: query.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
