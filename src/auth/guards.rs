use super::state::{Session, SessionHandle};
use tokio::sync::watch;

/// Where unauthenticated visitors are sent by default.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still being verified: show a pending indicator, do not redirect.
    Pending,
    Redirect { to: String },
    Render,
}

impl GuardDecision {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Decision for a protected view given the current session.
#[must_use]
pub fn decide(session: &Session, login_path: &str) -> GuardDecision {
    match session {
        Session::Verifying => GuardDecision::Pending,
        Session::Anonymous => GuardDecision::Redirect {
            to: login_path.to_string(),
        },
        Session::Authenticated(_) => GuardDecision::Render,
    }
}

/// Gate for a mounted protected view. Re-evaluates on every session change.
// UX-only gate; the API still authorizes every request.
pub struct RequireAuth {
    rx: watch::Receiver<Session>,
    login_path: String,
}

impl RequireAuth {
    #[must_use]
    pub fn new(session: &SessionHandle) -> Self {
        Self {
            rx: session.receiver(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    #[must_use]
    pub fn decision(&self) -> GuardDecision {
        decide(&self.rx.borrow(), &self.login_path)
    }

    /// Waits for the next session change and returns the new decision.
    /// `None` once the session handle is gone.
    pub async fn changed(&mut self) -> Option<GuardDecision> {
        self.rx.changed().await.ok()?;
        Some(decide(&self.rx.borrow_and_update(), &self.login_path))
    }

    /// Waits until the decision is no longer `Pending`.
    pub async fn settled(&mut self) -> GuardDecision {
        let login_path = self.login_path.clone();
        let settled = self
            .rx
            .wait_for(|session| decide(session, &login_path).is_settled())
            .await;
        match settled {
            Ok(session) => decide(&session, &login_path),
            // Sender gone while verifying: nothing will ever authenticate this view.
            Err(_) => GuardDecision::Redirect { to: login_path },
        }
    }
}
