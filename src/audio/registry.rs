//! Process-wide map from session key (a guild) to its controller.
//!
//! Entries are created on demand by the first command that needs a session
//! and removed by an explicit leave or by [`SessionRegistry::shutdown`] when
//! the process exits. Creation is atomic per key: concurrent callers for the
//! same key wait on one factory run instead of building two sessions.

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use std::{future::Future, hash::Hash, sync::Arc};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    audio::{session::SessionController, sink::AudioSink},
    error::{Result, SessionError},
};

type Slot<S> = Arc<OnceCell<Arc<SessionController<S>>>>;

pub struct SessionRegistry<K, S: AudioSink> {
    sessions: DashMap<K, Slot<S>>,
}

impl<K, S> Default for SessionRegistry<K, S>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    S: AudioSink,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> SessionRegistry<K, S>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    S: AudioSink,
{
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Devuelve la sesión de `key`, creándola con `factory` si no existe.
    ///
    /// A session that terminated on its own (for example after its sink
    /// failed) is replaced. If `factory` fails nothing is stored and the
    /// next caller tries again. If the key is left or the registry shuts down
    /// while `factory` runs, the new session is stopped and
    /// [`SessionError::SessionClosed`] is returned.
    pub async fn get_or_create<F, Fut>(&self, key: K, factory: F) -> Result<Arc<SessionController<S>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionController<S>>>,
    {
        let slot = self.slot(key.clone());
        let session = slot
            .get_or_try_init(|| async {
                debug!("🆕 Creando sesión para {:?}", key);
                factory().await.map(Arc::new)
            })
            .await?
            .clone();

        let still_registered = self
            .sessions
            .get(&key)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), &slot));
        if !still_registered {
            warn!("🚫 La sesión de {:?} se cerró mientras se creaba", key);
            session.stop().await;
            return Err(SessionError::SessionClosed);
        }
        Ok(session)
    }

    pub fn get(&self, key: &K) -> Option<Arc<SessionController<S>>> {
        self.sessions
            .get(key)
            .and_then(|slot| slot.get().cloned())
            .filter(|session| !session.is_closed())
    }

    /// Quita la sesión del registro sin detenerla.
    pub fn remove(&self, key: &K) -> Option<Arc<SessionController<S>>> {
        self.sessions
            .remove(key)
            .and_then(|(_, slot)| slot.get().cloned())
    }

    /// Quita y detiene la sesión. Devuelve `false` si no había ninguna.
    pub async fn leave(&self, key: &K) -> bool {
        match self.remove(key) {
            Some(session) => {
                session.stop().await;
                info!("👋 Sesión {:?} cerrada", key);
                true
            }
            None => false,
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&K, &Arc<SessionController<S>>)) {
        for entry in self.sessions.iter() {
            if let Some(session) = entry.value().get() {
                f(entry.key(), session);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.iter().filter(|entry| entry.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detiene todas las sesiones; se usa al apagar el proceso.
    pub async fn shutdown(&self) {
        let mut sessions = Vec::new();
        self.for_each(|_, session| sessions.push(session.clone()));
        self.sessions.clear();

        let count = sessions.len();
        join_all(sessions.iter().map(|session| session.stop())).await;
        info!("⏹️ {} sesiones detenidas", count);
    }

    fn slot(&self, key: K) -> Slot<S> {
        match self.sessions.entry(key) {
            Entry::Occupied(mut occupied) => {
                let closed = occupied.get().get().is_some_and(|session| session.is_closed());
                if closed {
                    debug!("♻️ Reemplazando sesión terminada de {:?}", occupied.key());
                    occupied.insert(Arc::new(OnceCell::new()));
                }
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => vacant.insert(Arc::new(OnceCell::new())).value().clone(),
        }
    }
}
