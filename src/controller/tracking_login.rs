use tracing::{info, warn};

use crate::controller::{
    grant_access, internal_failure, Grant, LoginOutcome, LoginPageState, Page, Redirect,
    MSG_BAD_EMAIL, MSG_FILL_ALL,
};
use crate::services::IndicacoesService;
use crate::session::{SessionCheck, SessionKind, SessionStore};
use crate::validation::{format_codigo_input, is_valid_codigo, is_valid_email};

pub const TEST_PARTNER_EMAIL: &str = "parceiro@teste.com";
/// Outside the `HMD` range issued to real indications, so it never opens a real record.
pub const TEST_PARTNER_CODIGO: &str = "TST-0000-0000";

const MSG_BAD_CODIGO: &str = "Por favor, insira um código válido no formato HMD-2025-0000.";
const MSG_WRONG_CREDENTIALS: &str =
    "E-mail ou código de indicação incorretos. Verifique os dados e tente novamente.";
const MSG_SUCCESS: &str = "Acesso autorizado! Redirecionando...";

#[derive(Clone, Debug, Default)]
pub struct TrackingLoginContext {
    pub email: String,
    pub codigo: String,
    pub page: LoginPageState,
}

impl TrackingLoginContext {
    pub fn with_credentials(email: &str, codigo: &str) -> Self {
        Self {
            email: email.into(),
            codigo: codigo.into(),
            ..Default::default()
        }
    }
}

pub struct TrackingLoginController<S: IndicacoesService> {
    service: S,
    sessions: SessionStore,
}

impl<S: IndicacoesService> TrackingLoginController<S> {
    pub fn new(service: S, sessions: SessionStore) -> Self {
        Self { service, sessions }
    }

    pub fn on_load(&self, _ctx: &mut TrackingLoginContext) -> Option<Redirect> {
        match self.sessions.inspect(SessionKind::Tracking) {
            Ok(SessionCheck::Active(session)) => Some(Redirect::now(Page::Tracking {
                codigo: session.codigo.unwrap_or_default(),
            })),
            Ok(SessionCheck::Corrupt) => {
                if let Err(err) = self.sessions.clear(SessionKind::Tracking) {
                    warn!(error = %err, "could not clear tracking session");
                }
                None
            }
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "could not read tracking session");
                None
            }
        }
    }

    /// Keystroke in the email field.
    pub fn on_email_input(&self, ctx: &mut TrackingLoginContext, value: &str) {
        ctx.email = value.to_string();
        ctx.page.hide_messages();
    }

    /// Keystroke in the code field; the stored value is reformatted on every change.
    pub fn on_codigo_input(&self, ctx: &mut TrackingLoginContext, value: &str) {
        ctx.codigo = format_codigo_input(value);
        ctx.page.hide_messages();
    }

    pub fn submit(&self, ctx: &mut TrackingLoginContext) -> LoginOutcome {
        let now = self.sessions.now();
        if !ctx.page.guard.try_enter(now) {
            return LoginOutcome::Ignored;
        }

        let email = ctx.email.trim().to_lowercase();
        let codigo = ctx.codigo.trim().to_uppercase();
        if email.is_empty() || codigo.is_empty() {
            ctx.page.show_error(MSG_FILL_ALL, now);
            return LoginOutcome::Rejected;
        }
        if !is_valid_email(&email) {
            ctx.page.show_error(MSG_BAD_EMAIL, now);
            return LoginOutcome::Rejected;
        }
        if !is_valid_codigo(&codigo) {
            ctx.page.show_error(MSG_BAD_CODIGO, now);
            return LoginOutcome::Rejected;
        }

        ctx.page.loading = true;

        if email == TEST_PARTNER_EMAIL && codigo == TEST_PARTNER_CODIGO {
            return self.grant(ctx, &email, &codigo);
        }

        match self.service.find_by_code_and_email(&codigo, &email) {
            Ok(Some(found)) => self.grant(ctx, &email, &found.id),
            Ok(None) => {
                info!(codigo = %codigo, "no indication matches code and email");
                self.deny(ctx, now)
            }
            Err(err) if err.is_backend_answer() => {
                warn!(error = %err, "indication lookup failed");
                self.deny(ctx, now)
            }
            Err(err) => internal_failure(&mut ctx.page, &err, now),
        }
    }

    fn deny(&self, ctx: &mut TrackingLoginContext, now: i64) -> LoginOutcome {
        ctx.page.show_error(MSG_WRONG_CREDENTIALS, now);
        ctx.page.loading = false;
        LoginOutcome::Rejected
    }

    fn grant(&self, ctx: &mut TrackingLoginContext, email: &str, codigo: &str) -> LoginOutcome {
        grant_access(
            &self.sessions,
            &mut ctx.page,
            Grant {
                kind: SessionKind::Tracking,
                email,
                codigo: Some(codigo),
                access_token: None,
                success_text: MSG_SUCCESS,
                target: Page::Tracking {
                    codigo: codigo.to_string(),
                },
            },
        )
    }
}
