use tracing::{error, warn};

use crate::controller::{
    grant_access, internal_failure, Grant, LoginOutcome, LoginPageState, Page, Redirect,
    MSG_BAD_EMAIL, MSG_FILL_ALL,
};
use crate::services::{AccessToken, IndicacoesService, PortalError};
use crate::session::{SessionCheck, SessionKind, SessionStore};
use crate::validation::is_valid_email;

pub const TEST_ADMIN_EMAIL: &str = "admin@homade.com";
pub const TEST_ADMIN_PASSWORD: &str = "admin123";

const MSG_WRONG_CREDENTIALS: &str = "E-mail ou senha incorretos. Tente novamente.";
const MSG_SUCCESS: &str = "Login realizado com sucesso! Redirecionando...";

#[derive(Clone, Debug, Default)]
pub struct AdminLoginContext {
    pub email: String,
    pub password: String,
    pub password_visible: bool,
    pub page: LoginPageState,
}

impl AdminLoginContext {
    pub fn with_credentials(email: &str, password: &str) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn password_input_type(&self) -> &'static str {
        if self.password_visible {
            "text"
        } else {
            "password"
        }
    }

    pub fn toggle_icon(&self) -> &'static str {
        if self.password_visible {
            "🙈"
        } else {
            "👁️"
        }
    }
}

pub struct AdminLoginController<S: IndicacoesService> {
    service: S,
    sessions: SessionStore,
}

impl<S: IndicacoesService> AdminLoginController<S> {
    pub fn new(service: S, sessions: SessionStore) -> Self {
        Self { service, sessions }
    }

    /// Page load: an unexpired admin session goes straight to the dashboard.
    pub fn on_load(&self, _ctx: &mut AdminLoginContext) -> Option<Redirect> {
        match self.sessions.inspect(SessionKind::Admin) {
            Ok(SessionCheck::Active(_)) => Some(Redirect::now(Page::Dashboard)),
            Ok(SessionCheck::Corrupt) => {
                if let Err(err) = self.sessions.clear(SessionKind::Admin) {
                    warn!(error = %err, "could not clear admin session");
                }
                None
            }
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "could not read admin session");
                None
            }
        }
    }

    pub fn on_input(&self, ctx: &mut AdminLoginContext) {
        ctx.page.hide_messages();
    }

    pub fn toggle_password(&self, ctx: &mut AdminLoginContext) {
        ctx.password_visible = !ctx.password_visible;
    }

    pub fn submit(&self, ctx: &mut AdminLoginContext) -> LoginOutcome {
        let now = self.sessions.now();
        if !ctx.page.guard.try_enter(now) {
            return LoginOutcome::Ignored;
        }

        let email = ctx.email.trim().to_string();
        let password = ctx.password.trim().to_string();
        if email.is_empty() || password.is_empty() {
            ctx.page.show_error(MSG_FILL_ALL, now);
            return LoginOutcome::Rejected;
        }
        if !is_valid_email(&email) {
            ctx.page.show_error(MSG_BAD_EMAIL, now);
            return LoginOutcome::Rejected;
        }

        ctx.page.loading = true;

        if email == TEST_ADMIN_EMAIL && password == TEST_ADMIN_PASSWORD {
            return self.grant(ctx, &email, None);
        }

        match self.service.sign_in_with_password(&email, &password) {
            Ok(user) => self.grant(ctx, &user.email, user.access_token),
            Err(err) if err.is_backend_answer() => {
                if !matches!(err, PortalError::Unavailable) {
                    error!(error = %err, "password authentication rejected");
                }
                ctx.page.show_error(MSG_WRONG_CREDENTIALS, now);
                ctx.page.loading = false;
                LoginOutcome::Rejected
            }
            Err(err) => internal_failure(&mut ctx.page, &err, now),
        }
    }

    fn grant(
        &self,
        ctx: &mut AdminLoginContext,
        email: &str,
        access_token: Option<AccessToken>,
    ) -> LoginOutcome {
        grant_access(
            &self.sessions,
            &mut ctx.page,
            Grant {
                kind: SessionKind::Admin,
                email,
                codigo: None,
                access_token,
                success_text: MSG_SUCCESS,
                target: Page::Dashboard,
            },
        )
    }
}
