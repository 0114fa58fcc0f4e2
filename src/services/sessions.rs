use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{CartLine, CheckoutForm};
use crate::services::submission_guard::SubmissionGuard;

/// Server-side state of one shopper's checkout: cart, saved form draft and the
/// guard that keeps concurrent submissions out.
#[derive(Debug)]
pub struct CheckoutSession {
    cart: RwLock<Vec<CartLine>>,
    draft: RwLock<Option<CheckoutForm>>,
    guard: Arc<SubmissionGuard>,
    last_touched: RwLock<DateTime<Utc>>,
}

impl Default for CheckoutSession {
    fn default() -> Self {
        Self {
            cart: RwLock::default(),
            draft: RwLock::default(),
            guard: Arc::default(),
            last_touched: RwLock::new(Utc::now()),
        }
    }
}

impl CheckoutSession {
    pub fn cart(&self) -> Vec<CartLine> {
        self.cart.read().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn draft(&self) -> Option<CheckoutForm> {
        self.draft.read().ok().and_then(|d| d.clone())
    }

    pub fn guard(&self) -> &Arc<SubmissionGuard> {
        &self.guard
    }

    pub fn last_touched(&self) -> DateTime<Utc> {
        self.last_touched
            .read()
            .map(|t| *t)
            .unwrap_or_else(|_| Utc::now())
    }

    fn touch(&self, at: DateTime<Utc>) {
        if let Ok(mut touched) = self.last_touched.write() {
            *touched = at;
        }
    }

    fn set_cart(&self, lines: Vec<CartLine>) {
        if let Ok(mut cart) = self.cart.write() {
            *cart = lines;
        }
    }

    fn set_draft(&self, form: Option<CheckoutForm>) {
        if let Ok(mut draft) = self.draft.write() {
            *draft = form;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutSessionStore {
    sessions: Arc<DashMap<Uuid, Arc<CheckoutSession>>>,
}

impl CheckoutSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only writes (cart, draft, submission) create sessions; reads use [`get`](Self::get).
    pub fn get_or_create(&self, session_id: Uuid) -> Arc<CheckoutSession> {
        let session = self
            .sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(CheckoutSession::default()))
            .clone();
        session.touch(Utc::now());
        session
    }

    pub fn get(&self, session_id: Uuid) -> Option<Arc<CheckoutSession>> {
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    pub fn replace_cart(&self, session_id: Uuid, lines: Vec<CartLine>) -> Arc<CheckoutSession> {
        let session = self.get_or_create(session_id);
        session.set_cart(lines);
        session
    }

    pub fn save_draft(&self, session_id: Uuid, form: CheckoutForm) -> Arc<CheckoutSession> {
        let session = self.get_or_create(session_id);
        session.set_draft(Some(form));
        session
    }

    /// Empties the cart and forgets the draft once an order exists.
    pub fn clear_after_order(&self, session_id: Uuid) {
        if let Some(session) = self.get(session_id) {
            session.set_cart(Vec::new());
            session.set_draft(None);
            debug!(%session_id, "checkout session cleared");
        }
    }

    /// Drops sessions untouched since `now - idle_for`. Sessions with a
    /// submission in flight are kept.
    pub fn evict_idle(&self, now: DateTime<Utc>, idle_for: chrono::Duration) -> usize {
        let cutoff = now - idle_for;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.guard().is_held() || session.last_touched() >= cutoff);
        before.saturating_sub(self.sessions.len())
    }

    /// Runs [`evict_idle`](Self::evict_idle) every `interval` until the task is aborted.
    pub fn spawn_eviction(self, interval: Duration, idle_for: chrono::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle(Utc::now(), idle_for);
                if evicted > 0 {
                    info!(evicted, remaining = self.len(), "idle checkout sessions evicted");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
