use std::sync::Arc;

use homade_indicacoes::controller::admin_login::{
    AdminLoginContext, AdminLoginController, TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD,
};
use homade_indicacoes::controller::tracking_login::{
    TrackingLoginContext, TrackingLoginController,
};
use homade_indicacoes::controller::{LoginOutcome, Page, Redirect};
use homade_indicacoes::services::{InMemoryService, OfflineService};
use homade_indicacoes::session::{
    ManualClock, MemoryStorage, Session, SessionKind, SessionStorage, SessionStore,
};

fn store(clock: &ManualClock) -> (SessionStore, MemoryStorage) {
    let storage = MemoryStorage::new();
    let sessions = SessionStore::new(Arc::new(storage.clone()), Arc::new(clock.clone()));
    (sessions, storage)
}

#[test]
fn admin_test_credential_stores_24h_session_and_redirects_after_2s() {
    let clock = ManualClock::at(1_735_689_600_000);
    let (sessions, storage) = store(&clock);
    let controller = AdminLoginController::new(OfflineService, sessions);

    let mut ctx = AdminLoginContext::with_credentials(TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD);
    let outcome = controller.submit(&mut ctx);

    let LoginOutcome::Authenticated { redirect, .. } = outcome else {
        panic!("test credential must authenticate, got {outcome:?}");
    };
    assert_eq!(
        redirect,
        Redirect {
            target: Page::Dashboard,
            delay_ms: 2000
        }
    );

    let raw = storage.get_item("adminSession").unwrap().unwrap();
    let stored: Session = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.email, TEST_ADMIN_EMAIL);
    assert_eq!(stored.login_time, 1_735_689_600_000);
    assert_eq!(stored.expires, stored.login_time + 86_400_000);
    assert_eq!(
        ctx.page.flash.unwrap().text,
        "Login realizado com sucesso! Redirecionando..."
    );
}

#[test]
fn admin_backend_login_stores_email_returned_by_backend() {
    let clock = ManualClock::at(0);
    let (sessions, _) = store(&clock);
    let controller = AdminLoginController::new(InMemoryService::new_with_sample(), sessions.clone());

    let mut ctx = AdminLoginContext::with_credentials("gestor@homade.com", "gestor-2025");
    assert!(matches!(
        controller.submit(&mut ctx),
        LoginOutcome::Authenticated { .. }
    ));
    let active = sessions.require_active(SessionKind::Admin).unwrap().unwrap();
    assert_eq!(active.email, "gestor@homade.com");
    assert_eq!(active.codigo, None);
    let token = active.access_token.unwrap();
    assert!(token.token.starts_with("memory-token-"));
}

#[test]
fn test_credential_session_carries_no_backend_token() {
    let clock = ManualClock::at(0);
    let (sessions, storage) = store(&clock);
    let controller = AdminLoginController::new(OfflineService, sessions);

    let mut ctx = AdminLoginContext::with_credentials(TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD);
    controller.submit(&mut ctx);
    let raw = storage.get_item("adminSession").unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(value.get("accessToken").is_none());
}

#[test]
fn second_submit_within_two_seconds_is_ignored() {
    let clock = ManualClock::at(0);
    let (sessions, _) = store(&clock);
    let controller = AdminLoginController::new(InMemoryService::new_with_sample(), sessions);

    let mut ctx = AdminLoginContext::with_credentials("gestor@homade.com", "errada");
    assert_eq!(controller.submit(&mut ctx), LoginOutcome::Rejected);
    clock.advance(1_500);
    ctx.password = "gestor-2025".into();
    assert_eq!(controller.submit(&mut ctx), LoginOutcome::Ignored);
    clock.advance(500);
    assert!(matches!(
        controller.submit(&mut ctx),
        LoginOutcome::Authenticated { .. }
    ));
}

#[test]
fn inline_errors_auto_dismiss_and_typing_clears_them() {
    let clock = ManualClock::at(0);
    let (sessions, _) = store(&clock);
    let controller = TrackingLoginController::new(OfflineService, sessions);

    let mut ctx = TrackingLoginContext::with_credentials("", "");
    assert_eq!(controller.submit(&mut ctx), LoginOutcome::Rejected);
    assert!(ctx.page.visible_flash(4_999).is_some());
    assert!(ctx.page.visible_flash(5_000).is_none());

    controller.on_email_input(&mut ctx, "p");
    assert!(ctx.page.flash.is_none());
}

#[test]
fn tracking_login_via_lookup_persists_code_in_session() {
    let clock = ManualClock::at(42);
    let (sessions, storage) = store(&clock);
    let controller = TrackingLoginController::new(InMemoryService::new_with_sample(), sessions);

    let mut ctx = TrackingLoginContext::default();
    controller.on_email_input(&mut ctx, "daniela.rocha@exemplo.com");
    controller.on_codigo_input(&mut ctx, "hmd20250002");
    assert_eq!(ctx.codigo, "HMD-2025-0002");

    let outcome = controller.submit(&mut ctx);
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));

    let raw = storage.get_item("trackingSession").unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["codigo"], "HMD-2025-0002");
    assert_eq!(value["loginTime"], 42);
    assert_eq!(value["expires"], 42 + 86_400_000);
    assert!(storage.get_item("adminSession").unwrap().is_none());
}

#[test]
fn tracking_login_with_backend_unavailable_is_denied() {
    let clock = ManualClock::at(0);
    let (sessions, storage) = store(&clock);
    let controller = TrackingLoginController::new(OfflineService, sessions);

    let mut ctx = TrackingLoginContext::with_credentials("x@y.com", "HMD-2025-0001");
    assert_eq!(controller.submit(&mut ctx), LoginOutcome::Rejected);
    assert!(ctx.page.flash.unwrap().text.starts_with("E-mail ou código"));
    assert!(storage.get_item("trackingSession").unwrap().is_none());
}

#[test]
fn expired_session_does_not_skip_the_login_page() {
    let clock = ManualClock::at(0);
    let (sessions, _) = store(&clock);
    let controller = AdminLoginController::new(OfflineService, sessions);

    let mut ctx = AdminLoginContext::with_credentials(TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD);
    controller.submit(&mut ctx);
    assert_eq!(
        controller.on_load(&mut AdminLoginContext::default()),
        Some(Redirect::now(Page::Dashboard))
    );

    clock.advance(86_400_001);
    assert_eq!(controller.on_load(&mut AdminLoginContext::default()), None);
}
