use serde::Serialize;
use tracing::{error, info};

use crate::notify::FlashMessage;
use crate::services::{AccessToken, PortalError};
use crate::session::{Session, SessionKind, SessionStore};

pub mod admin_login;
pub mod dashboard;
pub mod tracking_login;

/// Delay between a successful login message and the redirect.
pub const REDIRECT_DELAY_MS: u64 = 2_000;
/// Window during which repeated submits are ignored.
pub const SUBMIT_GUARD_MS: i64 = 2_000;

pub(crate) const MSG_FILL_ALL: &str = "Por favor, preencha todos os campos.";
pub(crate) const MSG_BAD_EMAIL: &str = "Por favor, insira um e-mail válido.";
pub(crate) const MSG_INTERNAL: &str = "Erro interno. Tente novamente em alguns instantes.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Page {
    AdminLogin,
    Dashboard,
    Tracking { codigo: String },
}

impl Page {
    pub fn href(&self) -> String {
        match self {
            Page::AdminLogin => "../../pages/login/admin.html".into(),
            Page::Dashboard => "../dashboard/index.html".into(),
            Page::Tracking { codigo } => format!("../acompanhamento/index.html?codigo={codigo}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub target: Page,
    pub delay_ms: u64,
}

impl Redirect {
    pub fn now(target: Page) -> Self {
        Self {
            target,
            delay_ms: 0,
        }
    }

    pub fn delayed(target: Page) -> Self {
        Self {
            target,
            delay_ms: REDIRECT_DELAY_MS,
        }
    }
}

/// Blocks a second submit for a fixed window after any submit, whatever its result.
#[derive(Clone, Debug, Default)]
pub struct SubmitGuard {
    locked_until: Option<i64>,
}

impl SubmitGuard {
    pub fn try_enter(&mut self, now: i64) -> bool {
        if matches!(self.locked_until, Some(until) if now < until) {
            return false;
        }
        self.locked_until = Some(now + SUBMIT_GUARD_MS);
        true
    }

    pub fn is_locked(&self, now: i64) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }
}

/// View state shared by both login pages.
#[derive(Clone, Debug, Default)]
pub struct LoginPageState {
    pub flash: Option<FlashMessage>,
    pub loading: bool,
    pub guard: SubmitGuard,
}

impl LoginPageState {
    pub fn show_error(&mut self, text: &str, now: i64) {
        self.flash = Some(FlashMessage::error(text, now));
    }

    pub fn show_success(&mut self, text: &str) {
        self.flash = Some(FlashMessage::success(text));
    }

    pub fn hide_messages(&mut self) {
        self.flash = None;
    }

    pub fn visible_flash(&self, now: i64) -> Option<&FlashMessage> {
        self.flash.as_ref().filter(|flash| flash.is_visible(now))
    }

    fn reject(&mut self, text: &str, now: i64) -> LoginOutcome {
        self.show_error(text, now);
        self.loading = false;
        LoginOutcome::Rejected
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Swallowed by the submit guard.
    Ignored,
    /// Validation or authentication failed; the page shows why.
    Rejected,
    Authenticated { session: Session, redirect: Redirect },
}

pub(crate) struct Grant<'a> {
    pub kind: SessionKind,
    pub email: &'a str,
    pub codigo: Option<&'a str>,
    pub access_token: Option<AccessToken>,
    pub success_text: &'a str,
    pub target: Page,
}

/// Persists the session for an authenticated user and schedules the redirect.
pub(crate) fn grant_access(
    sessions: &SessionStore,
    page: &mut LoginPageState,
    grant: Grant<'_>,
) -> LoginOutcome {
    match sessions.start_with_token(grant.kind, grant.email, grant.codigo, grant.access_token) {
        Ok(session) => {
            info!(slot = grant.kind.storage_key(), email = grant.email, "login succeeded");
            page.show_success(grant.success_text);
            LoginOutcome::Authenticated {
                session,
                redirect: Redirect::delayed(grant.target),
            }
        }
        Err(err) => internal_failure(page, &err, sessions.now()),
    }
}

pub(crate) fn internal_failure(
    page: &mut LoginPageState,
    err: &PortalError,
    now: i64,
) -> LoginOutcome {
    error!(error = %err, "login failed");
    page.reject(MSG_INTERNAL, now)
}
