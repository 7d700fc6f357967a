pub mod chrome;
pub mod finder;
pub mod interact;
pub mod selectors;
pub mod steps;
pub mod surface;

use thiserror::Error;

pub use chrome::ChromeProvisioner;
pub use finder::{ElementFinder, FindError, ResolvedElement};
pub use interact::{InteractError, Interactor};
pub use selectors::{ElementQuery, SelectorStrategy, SelectorTable};
pub use steps::{StepError, StepRunner};
pub use surface::{
    ContextProvisioner, ExecutionContext, Locator, LocatorKind, SessionCookie, UiError, UiSurface,
};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch: {0}")]
    Launch(String),

    #[error("navigation: {0}")]
    Navigation(String),

    #[error("cookie capture: {0}")]
    Cookies(String),
}
