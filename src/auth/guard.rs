use tracing::debug;

use super::{AdminGuard, AuthResolver, GuardKind, ParticipantGuard};
use crate::backend::{AuthEvent, AuthEventKind, AuthEvents, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Authorized,
    Unauthorized,
}

/// What the protected page shows in each state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    Loading,
    Render,
    Redirect(&'static str),
}

/// Lifecycle of one protected page. Resolves once on mount; admin guards
/// then follow auth events until dropped, which releases the subscription.
pub struct RouteGuard<K: GuardKind> {
    resolver: AuthResolver,
    state: GuardState,
    record: Option<K::Record>,
    subscription: Option<Subscription>,
}

pub type AdminRoute = RouteGuard<AdminGuard>;
pub type ParticipantRoute = RouteGuard<ParticipantGuard>;

impl<K: GuardKind> RouteGuard<K> {
    /// Guard in `Checking`, before any resolution
    pub fn new(resolver: AuthResolver) -> Self {
        Self {
            resolver,
            state: GuardState::Checking,
            record: None,
            subscription: None,
        }
    }

    /// Subscribe (when the kind watches events), then resolve exactly once
    pub async fn mount(resolver: AuthResolver, events: &AuthEvents) -> Self {
        let mut guard = Self::new(resolver);
        // Subscribing first means a sign-out racing the first resolution is not lost
        if K::WATCHES_AUTH_EVENTS {
            guard.subscription = Some(events.subscribe());
        }
        guard.evaluate().await;
        guard
    }

    async fn evaluate(&mut self) {
        self.state = GuardState::Checking;
        let resolution = self.resolver.resolve::<K>().await;

        if resolution.authorized {
            self.state = GuardState::Authorized;
            self.record = resolution.profile;
        } else {
            self.state = GuardState::Unauthorized;
            self.record = None;
        }
        debug!(guard = K::NAME, state = ?self.state, "route guard evaluated");
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn view(&self) -> GuardView {
        match self.state {
            GuardState::Checking => GuardView::Loading,
            GuardState::Authorized => GuardView::Render,
            GuardState::Unauthorized => GuardView::Redirect(K::LOGIN_PATH),
        }
    }

    /// The authorizing record, only while authorized
    pub fn record(&self) -> Option<&K::Record> {
        self.record.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub async fn handle_event(&mut self, event: &AuthEvent) {
        match event.kind {
            AuthEventKind::SignedOut => {
                self.state = GuardState::Unauthorized;
                self.record = None;
                debug!(guard = K::NAME, "signed out, access revoked");
            }
            AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed => self.evaluate().await,
        }
    }

    /// Wait for and apply the next auth event. `false` when this guard does
    /// not watch events or the stream has closed.
    pub async fn watch_next(&mut self) -> bool {
        let (event, missed) = match self.subscription.as_mut() {
            Some(subscription) => {
                let event = subscription.recv().await;
                (event, subscription.take_missed())
            }
            None => return false,
        };

        // Dropped events may have held a sign-out, so the stale state cannot stand
        if missed > 0 {
            debug!(guard = K::NAME, missed, "auth events dropped, re-resolving");
            self.state = GuardState::Unauthorized;
            self.record = None;
            self.evaluate().await;
        }

        match event {
            Some(event) => {
                if missed == 0 || event.kind == AuthEventKind::SignedOut {
                    self.handle_event(&event).await;
                }
                true
            }
            None => false,
        }
    }

    /// Tear down the guard; the subscription is released with it
    pub fn unmount(self) {}
}
