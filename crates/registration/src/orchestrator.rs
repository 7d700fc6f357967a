use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use regforge_address::AddressProvider;
use regforge_browser::selectors::{
    ADDRESS_INPUT, ALTERNATE_FLOW_TOGGLE, CONTINUE_BUTTON, LANDING_MARKER,
};
use regforge_browser::{
    ContextProvisioner, ElementFinder, ElementQuery, ExecutionContext, SelectorTable, StepRunner,
    UiSurface,
};
use regforge_mail::{InboxPoller, Mailbox};
use regforge_proxy::ProxyRotation;

use crate::attempt::{AttemptOutcome, CancelFlag, RegistrationAttempt, Stage};
use crate::credentials::{CredentialVariant, SessionCredential};

/// Everything the orchestrator needs to know about the flow it drives.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub signup_url: String,
    pub require_proxy: bool,
    pub find_timeout: Duration,
    /// Budget for optional elements like the alternate-flow toggle.
    pub optional_find_timeout: Duration,
    pub interact_retries: u32,
    pub humanize_typing: bool,
    /// Randomized pause between typing the address and continuing, seconds.
    pub think_delay_secs: (u64, u64),
    /// Pause before the first inbox sweep.
    pub initial_grace: Duration,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub recent_count: usize,
    pub subject_marker: String,
    pub link_prefix: String,
    pub token_cookie: String,
    pub data_dir: PathBuf,
}

impl EngineConfig {
    /// Assemble the flow knobs from the application config.
    pub fn from_app(config: &regforge_core::AppConfig) -> Self {
        Self {
            signup_url: config.signup.url.clone(),
            require_proxy: config.proxy.require_proxy,
            find_timeout: Duration::from_secs(config.browser.find_timeout_seconds),
            optional_find_timeout: Duration::from_secs(
                config.browser.optional_find_timeout_seconds,
            ),
            interact_retries: config.browser.interact_retries,
            humanize_typing: config.browser.humanize_typing,
            think_delay_secs: (
                config.browser.think_delay_min_seconds,
                config.browser.think_delay_max_seconds,
            ),
            initial_grace: Duration::from_secs(config.mail.initial_grace_seconds),
            poll_attempts: config.mail.poll_attempts,
            poll_interval: Duration::from_secs(config.mail.poll_interval_seconds),
            recent_count: config.mail.recent_count,
            subject_marker: config.signup.subject_marker.clone(),
            link_prefix: config.signup.link_prefix.clone(),
            token_cookie: config.signup.token_cookie.clone(),
            data_dir: config.general.data_dir.clone().into(),
        }
    }
}

/// Sequences one registration attempt: address creation, context
/// provisioning, form fill, inbox polling, link follow, verification,
/// credential persistence, teardown.
pub struct RegisterEngine {
    provider: Arc<dyn AddressProvider>,
    provisioner: Arc<dyn ContextProvisioner>,
    mailbox: Arc<dyn Mailbox>,
    proxies: Arc<ProxyRotation>,
    selectors: Arc<SelectorTable>,
    config: EngineConfig,
}

impl RegisterEngine {
    pub fn new(
        provider: Arc<dyn AddressProvider>,
        provisioner: Arc<dyn ContextProvisioner>,
        mailbox: Arc<dyn Mailbox>,
        proxies: Arc<ProxyRotation>,
        selectors: Arc<SelectorTable>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            provisioner,
            mailbox,
            proxies,
            selectors,
            config,
        }
    }

    /// Run one attempt to completion. The execution context is torn down
    /// exactly once whatever terminal state is reached, and the attempt
    /// record freezes on its terminal outcome.
    pub async fn run(&self, id: impl Into<String>, cancel: &CancelFlag) -> RegistrationAttempt {
        let mut attempt = RegistrationAttempt::new(id);
        let mut context: Option<Box<dyn ExecutionContext>> = None;

        info!(id = %attempt.id, "starting registration attempt");
        let outcome = self.drive(&mut attempt, &mut context, cancel).await;

        if let Some(mut ctx) = context.take() {
            ctx.close().await;
        }

        match &outcome {
            AttemptOutcome::Succeeded => info!(id = %attempt.id, "attempt succeeded"),
            AttemptOutcome::Failed { stage, reason } => {
                warn!(id = %attempt.id, stage = %stage, reason = %reason, "attempt failed")
            }
            AttemptOutcome::Cancelled => info!(id = %attempt.id, "attempt cancelled"),
        }

        attempt.finish(outcome);
        attempt
    }

    async fn drive(
        &self,
        attempt: &mut RegistrationAttempt,
        slot: &mut Option<Box<dyn ExecutionContext>>,
        cancel: &CancelFlag,
    ) -> AttemptOutcome {
        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        // -- AddressCreated ------------------------------------------------
        let label = random_label(8);
        let address = match self.provider.create(&label).await {
            Ok(address) => address,
            Err(e) => return AttemptOutcome::failed(Stage::AddressCreated, e),
        };
        info!(id = %attempt.id, address = %address.address, "disposable address ready");
        attempt.advance(Stage::AddressCreated);

        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        // -- ContextReady --------------------------------------------------
        let proxy = self.proxies.acquire().await;
        if proxy.is_none() && self.config.require_proxy {
            return AttemptOutcome::failed(
                Stage::ContextReady,
                "proxy pool exhausted and a proxy is required",
            );
        }

        let connection = proxy.as_ref().map(|p| p.connection_url());
        let ctx = match self.provisioner.open(connection.as_deref()).await {
            Ok(ctx) => ctx,
            Err(e) => return AttemptOutcome::failed(Stage::ContextReady, e),
        };
        *slot = Some(ctx);
        let Some(ctx) = slot.as_deref() else {
            return AttemptOutcome::failed(Stage::ContextReady, "context slot empty");
        };

        if let Err(e) = ctx.navigate(&self.config.signup_url).await {
            return AttemptOutcome::failed(Stage::ContextReady, e);
        }
        // Charged once per attempt that reached this stage, win or lose.
        if let Some(endpoint) = &proxy {
            self.proxies.record_usage(endpoint).await;
        }
        attempt.advance(Stage::ContextReady);

        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        // -- FormSubmitted -------------------------------------------------
        let surface: &dyn UiSurface = ctx;
        let steps = StepRunner::new(
            surface,
            self.config.find_timeout,
            self.config.interact_retries,
            self.config.humanize_typing,
        );

        let address_input = match self.query(ADDRESS_INPUT) {
            Ok(q) => q,
            Err(reason) => return AttemptOutcome::failed(Stage::FormSubmitted, reason),
        };
        if let Err(e) = steps.type_step(address_input, &address.address).await {
            return AttemptOutcome::failed(Stage::FormSubmitted, e);
        }

        let (min, max) = self.config.think_delay_secs;
        let pause = rand::thread_rng().gen_range(min..=max.max(min));
        tokio::time::sleep(Duration::from_secs(pause)).await;

        let continue_button = match self.query(CONTINUE_BUTTON) {
            Ok(q) => q,
            Err(reason) => return AttemptOutcome::failed(Stage::FormSubmitted, reason),
        };
        if let Err(e) = steps.click_step(continue_button).await {
            return AttemptOutcome::failed(Stage::FormSubmitted, e);
        }
        attempt.advance(Stage::FormSubmitted);

        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        // -- LinkObtained --------------------------------------------------
        tokio::time::sleep(self.config.initial_grace).await;
        let poller = InboxPoller::new(
            self.mailbox.as_ref(),
            self.config.recent_count,
            self.config.subject_marker.clone(),
            self.config.link_prefix.clone(),
        );
        let link = match poller
            .poll(
                &address.address,
                self.config.poll_attempts,
                self.config.poll_interval,
            )
            .await
        {
            Ok(link) => link,
            Err(e) => return AttemptOutcome::failed(Stage::LinkObtained, e),
        };
        attempt.advance(Stage::LinkObtained);

        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        // -- Verified ------------------------------------------------------
        if let Err(e) = ctx.navigate(&link).await {
            return AttemptOutcome::failed(Stage::Verified, e);
        }

        let landing = match self.query(LANDING_MARKER) {
            Ok(q) => q,
            Err(reason) => return AttemptOutcome::failed(Stage::Verified, reason),
        };
        let finder = ElementFinder::new(surface);
        if finder
            .find(landing, self.config.find_timeout)
            .await
            .is_err()
        {
            return AttemptOutcome::failed(
                Stage::Verified,
                "confirmation landing page never appeared",
            );
        }

        let variant = self.resolve_variant(&steps, &finder).await;

        let cookies = match ctx.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => return AttemptOutcome::failed(Stage::Verified, e),
        };
        let Some(credential) =
            SessionCredential::capture(cookies, &self.config.token_cookie, variant)
        else {
            return AttemptOutcome::failed(Stage::Verified, "session token cookie not present");
        };
        attempt.advance(Stage::Verified);

        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        // -- CredentialPersisted -------------------------------------------
        if let Err(e) = credential.persist(&self.config.data_dir) {
            return AttemptOutcome::failed(Stage::CredentialPersisted, e);
        }
        attempt.advance(Stage::CredentialPersisted);

        attempt.advance(Stage::Done);
        AttemptOutcome::Succeeded
    }

    /// The alternate-flow toggle is optional: present and clickable means
    /// the alternate flow, anything else falls back to standard.
    async fn resolve_variant(
        &self,
        steps: &StepRunner<'_>,
        finder: &ElementFinder<'_>,
    ) -> CredentialVariant {
        let Some(toggle) = self.selectors.query(ALTERNATE_FLOW_TOGGLE) else {
            return CredentialVariant::Standard;
        };

        if finder
            .find(toggle, self.config.optional_find_timeout)
            .await
            .is_err()
        {
            return CredentialVariant::Standard;
        }

        match steps.click_step(toggle).await {
            Ok(()) => CredentialVariant::AlternateFlow,
            Err(e) => {
                warn!(error = %e, "alternate-flow toggle present but not clickable, staying standard");
                CredentialVariant::Standard
            }
        }
    }

    fn query(&self, name: &str) -> Result<&ElementQuery, String> {
        self.selectors
            .query(name)
            .ok_or_else(|| format!("selector table has no query '{}'", name))
    }
}

/// Random lowercase alphanumeric local-part label.
fn random_label(len: usize) -> String {
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;
    use regforge_address::{DisposableAddress, ProviderError};
    use regforge_browser::selectors::SelectorStrategy;
    use regforge_browser::surface::{Locator, LocatorKind, SessionCookie, UiError};
    use regforge_browser::BrowserError;
    use regforge_mail::{MailError, MailMessage, MailboxSession};

    const ADDRESS: &str = "fixed@inbox.test";
    const LINK: &str = "https://svc.test/confirm#tok-1";

    struct StubProvider {
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AddressProvider for StubProvider {
        async fn create(&self, label: &str) -> Result<DisposableAddress, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Api("rule quota exceeded".into()));
            }
            Ok(DisposableAddress {
                local_part: label.to_string(),
                address: ADDRESS.to_string(),
                created_at: Utc::now(),
            })
        }
    }

    /// Scripted page: expressions listed in `present` resolve; everything
    /// is interactive; typing accumulates per locator.
    #[derive(Default)]
    struct StubSurface {
        present: HashSet<String>,
        typed: Mutex<String>,
        navigations: Mutex<Vec<String>>,
        cookies: Vec<SessionCookie>,
        close_count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl UiSurface for StubSurface {
        async fn present(&self, locator: &Locator) -> Result<bool, UiError> {
            Ok(self.present.contains(&locator.expr))
        }

        async fn interactive(&self, locator: &Locator) -> Result<bool, UiError> {
            Ok(self.present.contains(&locator.expr))
        }

        async fn click(&self, locator: &Locator, _forced: bool) -> Result<(), UiError> {
            if self.present.contains(&locator.expr) {
                Ok(())
            } else {
                Err(UiError::Stale)
            }
        }

        async fn type_chunk(&self, _locator: &Locator, text: &str) -> Result<(), UiError> {
            self.typed.lock().unwrap().push_str(text);
            Ok(())
        }

        async fn clear(&self, _locator: &Locator) -> Result<(), UiError> {
            self.typed.lock().unwrap().clear();
            Ok(())
        }

        async fn value(&self, _locator: &Locator) -> Result<String, UiError> {
            Ok(self.typed.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl ExecutionContext for StubSurface {
        async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
            self.navigations.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn current_url(&self) -> Result<String, BrowserError> {
            Ok(self
                .navigations
                .lock()
                .unwrap()
                .last()
                .cloned()
                .unwrap_or_default())
        }

        async fn cookies(&self) -> Result<Vec<SessionCookie>, BrowserError> {
            Ok(self.cookies.clone())
        }

        async fn close(&mut self) {
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubProvisioner {
        present: Vec<&'static str>,
        with_token: bool,
        close_count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ContextProvisioner for StubProvisioner {
        async fn open(
            &self,
            _proxy: Option<&str>,
        ) -> Result<Box<dyn ExecutionContext>, BrowserError> {
            let cookies = if self.with_token {
                vec![SessionCookie {
                    name: "sessionKey".into(),
                    value: "tok-abc".into(),
                    domain: ".svc.test".into(),
                    path: "/".into(),
                    expires: None,
                    http_only: true,
                    secure: true,
                }]
            } else {
                Vec::new()
            };

            Ok(Box::new(StubSurface {
                present: self.present.iter().map(|s| s.to_string()).collect(),
                cookies,
                close_count: Arc::clone(&self.close_count),
                ..Default::default()
            }))
        }
    }

    struct StubMailbox;

    struct StubSession;

    #[async_trait]
    impl Mailbox for StubMailbox {
        async fn open(&self) -> Result<Box<dyn MailboxSession>, MailError> {
            Ok(Box::new(StubSession))
        }
    }

    #[async_trait]
    impl MailboxSession for StubSession {
        async fn list_recent(&mut self, _n: usize) -> Result<Vec<MailMessage>, MailError> {
            Ok(vec![MailMessage {
                to: format!("New User <{}>", ADDRESS),
                subject: "please confirm your account".into(),
                html_parts: vec![format!(r#"<a href="{}">confirm</a>"#, LINK)],
            }])
        }

        async fn close(&mut self) {}
    }

    fn test_selectors() -> SelectorTable {
        let css = |name: &str, expr: &str| {
            ElementQuery::new(
                name,
                vec![SelectorStrategy {
                    name: format!("{} css", name),
                    kind: LocatorKind::Css,
                    expr: expr.to_string(),
                    priority: 1,
                    timeout_secs: 0,
                }],
            )
        };
        SelectorTable::from_queries(vec![
            css(ADDRESS_INPUT, "#address"),
            css(CONTINUE_BUTTON, "#continue"),
            css(LANDING_MARKER, "#landing"),
            css(ALTERNATE_FLOW_TOGGLE, "#alt"),
        ])
    }

    fn engine_config(data_dir: PathBuf) -> EngineConfig {
        EngineConfig {
            signup_url: "https://svc.test/signup".into(),
            require_proxy: false,
            find_timeout: Duration::from_millis(50),
            optional_find_timeout: Duration::from_millis(10),
            interact_retries: 2,
            humanize_typing: false,
            think_delay_secs: (0, 0),
            initial_grace: Duration::ZERO,
            poll_attempts: 2,
            poll_interval: Duration::from_millis(1),
            recent_count: 20,
            subject_marker: "confirm your account".into(),
            link_prefix: "https://svc.test/confirm#".into(),
            token_cookie: "sessionKey".into(),
            data_dir,
        }
    }

    struct Fixture {
        engine: RegisterEngine,
        close_count: Arc<AtomicU32>,
        provider_calls: Arc<StubProvider>,
    }

    fn fixture(provider_fails: bool, present: Vec<&'static str>, data_dir: PathBuf) -> Fixture {
        let close_count = Arc::new(AtomicU32::new(0));
        let provider = Arc::new(StubProvider {
            fail: provider_fails,
            calls: AtomicU32::new(0),
        });
        let dir = tempfile::tempdir().unwrap();
        let proxies = Arc::new(ProxyRotation::new(
            dir.path(),
            dir.path().join("usage.json"),
            3,
        ));

        let engine = RegisterEngine::new(
            provider.clone(),
            Arc::new(StubProvisioner {
                present,
                with_token: true,
                close_count: Arc::clone(&close_count),
            }),
            Arc::new(StubMailbox),
            proxies,
            Arc::new(test_selectors()),
            engine_config(data_dir),
        );

        Fixture {
            engine,
            close_count,
            provider_calls: provider,
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_done_and_persists_credential() {
        let out = tempfile::tempdir().unwrap();
        let fx = fixture(
            false,
            vec!["#address", "#continue", "#landing"],
            out.path().to_path_buf(),
        );

        let attempt = fx.engine.run("attempt-1", &CancelFlag::new()).await;

        assert_eq!(attempt.outcome(), Some(&AttemptOutcome::Succeeded));
        assert_eq!(attempt.stage(), Stage::Done);
        assert_eq!(fx.close_count.load(Ordering::SeqCst), 1);

        // No alternate-flow toggle on the page: standard token file.
        let token =
            std::fs::read_to_string(out.path().join(crate::credentials::SESSION_KEY_FILE))
                .unwrap();
        assert_eq!(token, "tok-abc\n");
        assert!(out.path().join(crate::credentials::COOKIES_FILE).exists());
    }

    #[tokio::test]
    async fn alternate_flow_toggle_selects_phone_artifact() {
        let out = tempfile::tempdir().unwrap();
        let fx = fixture(
            false,
            vec!["#address", "#continue", "#landing", "#alt"],
            out.path().to_path_buf(),
        );

        let attempt = fx.engine.run("attempt-2", &CancelFlag::new()).await;

        assert_eq!(attempt.outcome(), Some(&AttemptOutcome::Succeeded));
        assert!(out
            .path()
            .join(crate::credentials::SESSION_KEY_PHONE_FILE)
            .exists());
    }

    #[tokio::test]
    async fn failure_at_form_submit_tears_down_exactly_once() {
        let out = tempfile::tempdir().unwrap();
        // The address input never resolves, so the form stage fails.
        let fx = fixture(false, vec!["#continue", "#landing"], out.path().to_path_buf());

        let attempt = fx.engine.run("attempt-3", &CancelFlag::new()).await;

        match attempt.outcome() {
            Some(AttemptOutcome::Failed { stage, .. }) => {
                assert_eq!(*stage, Stage::FormSubmitted);
                assert_eq!(stage.name(), "FormSubmitted");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fx.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_error_is_terminal_and_unretried() {
        let out = tempfile::tempdir().unwrap();
        let fx = fixture(true, vec![], out.path().to_path_buf());

        let attempt = fx.engine.run("attempt-4", &CancelFlag::new()).await;

        match attempt.outcome() {
            Some(AttemptOutcome::Failed { stage, reason }) => {
                assert_eq!(*stage, Stage::AddressCreated);
                assert!(reason.contains("rule quota exceeded"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fx.provider_calls.calls.load(Ordering::SeqCst), 1);
        // No context was ever opened.
        assert_eq!(fx.close_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pre_set_cancellation_skips_every_stage() {
        let out = tempfile::tempdir().unwrap();
        let fx = fixture(false, vec![], out.path().to_path_buf());

        let cancel = CancelFlag::new();
        cancel.cancel();
        let attempt = fx.engine.run("attempt-5", &cancel).await;

        assert_eq!(attempt.outcome(), Some(&AttemptOutcome::Cancelled));
        assert_eq!(fx.provider_calls.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.close_count.load(Ordering::SeqCst), 0);
    }
}
