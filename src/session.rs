//! Authenticated session state.
//!
//! A [`SessionContext`] is populated on login and cleared on logout or
//! expiry. It is reached only through the [`SessionStore`] carried in the
//! application state, never through globals.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::User;
use crate::config::MAX_SESSION_TTL_SECS;
use crate::events::Subscription;
use crate::workflow::QrWorkflow;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Everything the dashboard knows about one logged-in browser.
#[derive(Debug)]
pub struct SessionContext {
    token: String,
    user: User,
    mounted_qr: Option<QrWorkflow>,
    // Bumped on every mount attempt and unmount.
    qr_generation: u64,
}

impl SessionContext {
    pub fn new(token: String, user: User) -> Self {
        Self {
            token,
            user,
            mounted_qr: None,
            qr_generation: 0,
        }
    }

    /// Bearer token for the inventory API.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn set_user(&mut self, user: User) {
        self.user = user;
    }

    /// Start mounting a QR controller.
    ///
    /// Whatever was mounted is dropped. The returned stamp must be handed to
    /// [`finish_qr_mount`](Self::finish_qr_mount) once the bus is loaded.
    pub fn begin_qr_mount(&mut self) -> u64 {
        self.unmount_qr();
        self.qr_generation
    }

    /// Mount a loaded controller if `stamp` is still the latest one.
    ///
    /// Returns `false`, discarding `workflow`, when another mount started or
    /// the session navigated away while the bus was loading.
    pub fn finish_qr_mount(&mut self, stamp: u64, workflow: QrWorkflow) -> bool {
        if stamp != self.qr_generation {
            log::debug!("discarded late load of bus {}", workflow.item_id());
            return false;
        }
        self.mounted_qr = Some(workflow);
        true
    }

    /// The mounted controller, if it belongs to `item_id`.
    pub fn mounted_qr(&mut self, item_id: &str) -> Option<&mut QrWorkflow> {
        self.mounted_qr
            .as_mut()
            .filter(|wf| wf.item_id() == item_id)
    }

    /// Drop the mounted controller and its artifact. Loads still in flight
    /// will not mount.
    pub fn unmount_qr(&mut self) {
        self.qr_generation = self.qr_generation.wrapping_add(1);
        if let Some(wf) = self.mounted_qr.take() {
            log::debug!("unmounted QR workflow for bus {}", wf.item_id());
        }
    }
}

/// Shared handle to one session's context.
pub type SessionHandle = Arc<Mutex<SessionContext>>;

struct Entry {
    expires_at: DateTime<Utc>,
    handle: SessionHandle,
}

/// All live sessions, keyed by the id stored in the session cookie.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    /// Store whose sessions live `ttl_secs`, capped at one year.
    pub fn new(ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs.min(MAX_SESSION_TTL_SECS))
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or_else(|| Duration::days(365));
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a populated session and return its id.
    pub fn login(&self, token: String, user: User) -> String {
        let session_id = Uuid::new_v4().to_string();
        let entry = Entry {
            expires_at: Utc::now()
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            handle: Arc::new(Mutex::new(SessionContext::new(token, user))),
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.clone(), entry);
        session_id
    }

    /// Look up a live session. An expired one is cleared and `None` returned.
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            match sessions.get(session_id) {
                Some(entry) if entry.expires_at > Utc::now() => {
                    return Some(entry.handle.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        log::info!("session expired");
        self.logout(session_id);
        None
    }

    /// Clear a session. Returns whether it existed.
    pub fn logout(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id).is_some()
    }

    /// Clear every expired session; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the stored user in every session of `user.id`.
    pub async fn apply_profile_update(&self, user: &User) -> usize {
        let handles: Vec<SessionHandle> = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.values().map(|e| e.handle.clone()).collect()
        };

        let mut updated = 0;
        for handle in handles {
            let mut ctx = handle.lock().await;
            if ctx.user().id == user.id {
                ctx.set_user(user.clone());
                updated += 1;
            }
        }
        updated
    }

    /// Keep sessions in sync with profile updates until the subject goes away.
    pub fn spawn_profile_sync(self: Arc<Self>, mut updates: Subscription<User>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(user) = updates.next().await {
                let n = self.apply_profile_update(&user).await;
                log::info!("profile of user {} refreshed in {} session(s)", user.id, n);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Subject;

    fn user(id: &str, nombre: &str) -> User {
        User {
            id: id.into(),
            nombre: nombre.into(),
            apellido: "Pérez".into(),
            email: format!("{}@fleet.ve", id),
            imagen: None,
        }
    }

    #[tokio::test]
    async fn login_populates_and_logout_clears() {
        let store = SessionStore::new(3600);
        let id = store.login("tok".into(), user("1", "Ana"));

        let handle = store.get(&id).unwrap();
        assert_eq!(handle.lock().await.token(), "tok");
        assert_eq!(handle.lock().await.user().nombre, "Ana");

        assert!(store.logout(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.logout(&id));
    }

    #[test]
    fn expired_sessions_are_cleared_on_access() {
        let store = SessionStore::new(0);
        let id = store.login("tok".into(), user("1", "Ana"));
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn huge_lifetimes_do_not_expire_immediately() {
        let store = SessionStore::new(u64::MAX);
        let id = store.login("tok".into(), user("1", "Ana"));
        assert!(store.get(&id).is_some());
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn purge_drops_only_expired() {
        let store = SessionStore::new(0);
        store.login("a".into(), user("1", "Ana"));
        store.login("b".into(), user("2", "Luis"));
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 0);
    }

    fn workflow(id: &str) -> QrWorkflow {
        QrWorkflow::new("http://localhost:3000", id)
    }

    #[test]
    fn mounting_replaces_the_previous_workflow() {
        let mut ctx = SessionContext::new("tok".into(), user("1", "Ana"));
        let stamp = ctx.begin_qr_mount();
        assert!(ctx.finish_qr_mount(stamp, workflow("42")));
        assert!(ctx.mounted_qr("42").is_some());

        let stamp = ctx.begin_qr_mount();
        assert!(ctx.mounted_qr("42").is_none());
        assert!(ctx.finish_qr_mount(stamp, workflow("7")));
        assert!(ctx.mounted_qr("7").is_some());

        ctx.unmount_qr();
        assert!(ctx.mounted_qr("7").is_none());
    }

    #[test]
    fn late_loads_do_not_mount() {
        let mut ctx = SessionContext::new("tok".into(), user("1", "Ana"));

        // A second mount starts while the first bus is still loading.
        let slow = ctx.begin_qr_mount();
        let fast = ctx.begin_qr_mount();
        assert!(ctx.finish_qr_mount(fast, workflow("7")));
        assert!(!ctx.finish_qr_mount(slow, workflow("8")));
        assert!(ctx.mounted_qr("7").is_some());
        assert!(ctx.mounted_qr("8").is_none());

        // Navigating away while loading.
        let pending = ctx.begin_qr_mount();
        ctx.unmount_qr();
        assert!(!ctx.finish_qr_mount(pending, workflow("42")));
        assert!(ctx.mounted_qr("42").is_none());
    }

    #[tokio::test]
    async fn profile_updates_reach_every_session_of_the_user() {
        let store = Arc::new(SessionStore::new(3600));
        let a = store.login("a".into(), user("1", "Ana"));
        let b = store.login("b".into(), user("1", "Ana"));
        let other = store.login("c".into(), user("2", "Luis"));

        let subject = Subject::default();
        let task = store.clone().spawn_profile_sync(subject.subscribe());

        assert_eq!(subject.publish(user("1", "Ana María")), 1);
        drop(subject);
        task.await.unwrap();

        for id in [&a, &b] {
            let handle = store.get(id).unwrap();
            assert_eq!(handle.lock().await.user().nombre, "Ana María");
        }
        let handle = store.get(&other).unwrap();
        assert_eq!(handle.lock().await.user().nombre, "Luis");
    }
}
