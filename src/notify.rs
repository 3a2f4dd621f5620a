use serde::Serialize;

/// Inline errors and toasts disappear after five seconds.
pub const AUTO_DISMISS_MS: i64 = 5_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

impl NoticeKind {
    pub fn css_class(self) -> &'static str {
        match self {
            NoticeKind::Success => "notification-success",
            NoticeKind::Error => "notification-error",
            NoticeKind::Info => "notification-info",
        }
    }
}

/// Message shown above a login form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub kind: NoticeKind,
    pub text: String,
    /// Epoch millis after which the message is hidden; `None` stays until replaced.
    pub hide_at: Option<i64>,
}

impl FlashMessage {
    pub fn error(text: impl Into<String>, now: i64) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
            hide_at: Some(now + AUTO_DISMISS_MS),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
            hide_at: None,
        }
    }

    pub fn is_visible(&self, now: i64) -> bool {
        self.hide_at.map_or(true, |at| now < at)
    }
}

/// Toast on the dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NoticeKind,
    pub message: String,
    pub shown_at: i64,
}

impl Notification {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.shown_at + AUTO_DISMISS_MS
    }
}

#[derive(Clone, Debug, Default)]
pub struct NotificationCenter {
    items: Vec<Notification>,
}

impl NotificationCenter {
    pub fn push(&mut self, kind: NoticeKind, message: impl Into<String>, now: i64) {
        self.items.push(Notification {
            kind,
            message: message.into(),
            shown_at: now,
        });
    }

    pub fn success(&mut self, message: impl Into<String>, now: i64) {
        self.push(NoticeKind::Success, message, now);
    }

    pub fn error(&mut self, message: impl Into<String>, now: i64) {
        self.push(NoticeKind::Error, message, now);
    }

    pub fn visible(&self, now: i64) -> impl Iterator<Item = &Notification> {
        self.items.iter().filter(move |n| !n.is_expired(now))
    }

    pub fn prune(&mut self, now: i64) {
        self.items.retain(|n| !n.is_expired(now));
    }

    pub fn last(&self) -> Option<&Notification> {
        self.items.last()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
