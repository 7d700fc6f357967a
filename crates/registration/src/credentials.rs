use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use regforge_browser::SessionCookie;

/// Full cookie set artifact.
pub const COOKIES_FILE: &str = "cookies.json";
/// Primary token artifact, standard flow.
pub const SESSION_KEY_FILE: &str = "session-key.txt";
/// Primary token artifact, alternate flow.
pub const SESSION_KEY_PHONE_FILE: &str = "session-key-phone.txt";

/// Which verification flow produced the credential; decides the token
/// file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialVariant {
    Standard,
    AlternateFlow,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("credential io: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The session credential captured at successful verification. Created
/// once, persisted, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    pub token: String,
    pub cookies: Vec<SessionCookie>,
    pub captured_at: DateTime<Utc>,
    pub variant: CredentialVariant,
}

impl SessionCredential {
    /// Build the credential from the session's cookie set; `None` when the
    /// token cookie is absent.
    pub fn capture(
        cookies: Vec<SessionCookie>,
        token_cookie: &str,
        variant: CredentialVariant,
    ) -> Option<Self> {
        let token = cookies
            .iter()
            .find(|c| c.name == token_cookie)?
            .value
            .clone();

        Some(Self {
            token,
            cookies,
            captured_at: Utc::now(),
            variant,
        })
    }

    pub fn token_file_name(&self) -> &'static str {
        match self.variant {
            CredentialVariant::Standard => SESSION_KEY_FILE,
            CredentialVariant::AlternateFlow => SESSION_KEY_PHONE_FILE,
        }
    }

    /// Write both artifacts: the full cookie set as JSON and the bare
    /// token into the variant-selected file.
    pub fn persist(&self, data_dir: &Path) -> Result<(), PersistError> {
        std::fs::create_dir_all(data_dir)?;

        let cookies_path = data_dir.join(COOKIES_FILE);
        std::fs::write(&cookies_path, serde_json::to_string_pretty(&self.cookies)?)?;

        let token_path = data_dir.join(self.token_file_name());
        std::fs::write(&token_path, format!("{}\n", self.token))?;

        info!(
            cookies = %cookies_path.display(),
            token = %token_path.display(),
            "session credential persisted"
        );
        Ok(())
    }
}
