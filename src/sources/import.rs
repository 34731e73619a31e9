//! Bulk import of playlists and albums.
//!
//! Queries are resolved one at a time and each track is enqueued as soon as it
//! resolves, so the head of a playlist starts playing while the tail is still
//! being looked up.

use serenity::model::id::UserId;
use tracing::{info, warn};

use super::{CatalogLookup, SourceResolver};
use crate::{
    audio::{session::SessionController, sink::AudioSink, track::TrackInfo},
    error::{Result, SessionError},
};

/// Avance de una importación, emitido después de cada consulta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportProgress {
    pub added: usize,
    pub failed: usize,
    pub total: usize,
}

impl ImportProgress {
    pub fn done(&self) -> usize {
        self.added + self.failed
    }
}

/// Resultado final de una importación
#[derive(Debug, Default)]
pub struct ImportReport {
    pub added: Vec<TrackInfo>,
    pub failed: Vec<(String, SessionError)>,
    pub total: usize,
}

impl ImportReport {
    fn progress(&self) -> ImportProgress {
        ImportProgress {
            added: self.added.len(),
            failed: self.failed.len(),
            total: self.total,
        }
    }
}

/// Resuelve y encola cada consulta en orden.
///
/// A query that fails to resolve is recorded and skipped. A closed session
/// aborts the import with [`SessionError::SessionClosed`]; tracks enqueued
/// before that point are left to the session.
pub async fn import_queries<S, R, F>(
    session: &SessionController<S>,
    resolver: &R,
    queries: Vec<String>,
    requested_by: UserId,
    mut on_progress: F,
) -> Result<ImportReport>
where
    S: AudioSink,
    R: SourceResolver<Source = S::Source>,
    F: FnMut(ImportProgress) + Send,
{
    let mut report = ImportReport {
        total: queries.len(),
        ..Default::default()
    };
    info!("📥 Importando {} canciones en {}", report.total, session.label());

    for query in queries {
        if session.is_closed() {
            warn!("⏹️ Importación cancelada: la sesión {} terminó", session.label());
            return Err(SessionError::SessionClosed);
        }

        match resolver.resolve(&query, requested_by).await {
            Ok(track) => {
                let info = track.info().clone();
                session.enqueue(track)?;
                report.added.push(info);
            }
            Err(SessionError::SessionClosed) => return Err(SessionError::SessionClosed),
            Err(e) => {
                warn!("⚠️ No se pudo importar '{}': {}", query, e);
                report.failed.push((query, e));
            }
        }

        on_progress(report.progress());
    }

    info!(
        "✅ Importación terminada en {}: {} agregadas, {} fallidas",
        session.label(),
        report.added.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Expande la referencia con el catálogo y luego importa sus canciones
pub async fn import_catalog<S, R, C, F>(
    session: &SessionController<S>,
    resolver: &R,
    catalog: &C,
    reference: &str,
    requested_by: UserId,
    on_progress: F,
) -> Result<ImportReport>
where
    S: AudioSink,
    R: SourceResolver<Source = S::Source>,
    C: CatalogLookup + ?Sized,
    F: FnMut(ImportProgress) + Send,
{
    let queries = catalog.expand(reference).await?;
    import_queries(session, resolver, queries, requested_by, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            session::SessionSettings,
            testing::{track, Ledger, ScriptedSink, TestAudio},
            track::Track,
        },
        sources::MockCatalogLookup,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{collections::HashSet, sync::Arc};
    use tokio::sync::Notify;

    const USER: UserId = UserId::new(7);

    struct FakeResolver {
        ledger: Arc<Ledger>,
        failing: HashSet<String>,
        gate: Option<(String, Arc<Notify>)>,
    }

    impl FakeResolver {
        fn new(ledger: &Arc<Ledger>) -> Self {
            Self {
                ledger: ledger.clone(),
                failing: HashSet::new(),
                gate: None,
            }
        }

        fn failing(mut self, query: &str) -> Self {
            self.failing.insert(query.to_string());
            self
        }

        fn gated(mut self, query: &str, gate: Arc<Notify>) -> Self {
            self.gate = Some((query.to_string(), gate));
            self
        }
    }

    #[async_trait]
    impl SourceResolver for FakeResolver {
        type Source = TestAudio;

        async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track<TestAudio>> {
            if let Some((gated, gate)) = &self.gate {
                if gated == query {
                    gate.notified().await;
                }
            }
            if self.failing.contains(query) {
                return Err(SessionError::Resolution(query.to_string()));
            }
            Ok(track(query, requested_by.get(), &self.ledger))
        }
    }

    fn queries(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn session() -> (SessionController<ScriptedSink>, ScriptedSink) {
        let sink = ScriptedSink::new();
        let controller = SessionController::spawn("import-test", sink.clone(), SessionSettings::default());
        (controller, sink)
    }

    #[tokio::test]
    async fn failed_queries_do_not_stop_the_import() {
        let (session, sink) = session();
        let ledger = Ledger::new();
        let resolver = FakeResolver::new(&ledger).failing("b");

        let mut seen = Vec::new();
        let report = import_queries(&session, &resolver, queries(&["a", "b", "c"]), USER, |p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(
            report.added.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        assert_eq!(seen.last().copied(), Some(ImportProgress { added: 2, failed: 1, total: 3 }));
        assert_eq!(seen.iter().map(|p| p.done()).collect::<Vec<_>>(), vec![1, 2, 3]);

        assert_eq!(sink.started().await.as_deref(), Some("a"));
        assert_eq!(session.queue_len(), 1);

        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn head_track_plays_before_the_import_finishes() {
        let (session, sink) = session();
        let ledger = Ledger::new();
        let gate = Arc::new(Notify::new());
        let resolver = FakeResolver::new(&ledger).gated("b", gate.clone());

        let import = import_queries(&session, &resolver, queries(&["a", "b"]), USER, |_| {});
        let observe = async {
            assert_eq!(sink.started().await.as_deref(), Some("a"));
            assert_eq!(session.queue_len(), 0);
            gate.notify_one();
        };

        let (report, ()) = tokio::join!(import, observe);
        assert_eq!(report.unwrap().added.len(), 2);
        assert_eq!(session.queue_len(), 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn closed_session_aborts_the_import() {
        let (session, _sink) = session();
        let ledger = Ledger::new();
        session.stop().await;

        let resolver = FakeResolver::new(&ledger);
        let result = import_queries(&session, &resolver, queries(&["a", "b"]), USER, |_| {}).await;

        assert_eq!(result.unwrap_err(), SessionError::SessionClosed);
        assert_eq!(ledger.opened(), 0);
    }

    #[tokio::test]
    async fn catalog_expansion_feeds_the_import() {
        let (session, sink) = session();
        let ledger = Ledger::new();
        let resolver = FakeResolver::new(&ledger);

        let mut catalog = MockCatalogLookup::new();
        catalog
            .expect_expand()
            .withf(|reference| reference == "spotify:playlist:abc")
            .times(1)
            .returning(|_| Ok(vec!["x y".to_string(), "z w".to_string()]));

        let report = import_catalog(&session, &resolver, &catalog, "spotify:playlist:abc", USER, |_| {})
            .await
            .unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.added[0].requested_by, USER);
        assert_eq!(sink.started().await.as_deref(), Some("x y"));

        session.stop().await;
    }

    #[tokio::test]
    async fn catalog_errors_are_returned() {
        let (session, _sink) = session();
        let ledger = Ledger::new();
        let resolver = FakeResolver::new(&ledger);

        let mut catalog = MockCatalogLookup::new();
        catalog
            .expect_expand()
            .returning(|_| Err(SessionError::Catalog("401".to_string())));

        let result = import_catalog(&session, &resolver, &catalog, "spotify:album:x", USER, |_| {}).await;
        assert_eq!(result.unwrap_err(), SessionError::Catalog("401".to_string()));
        assert_eq!(ledger.opened(), 0);

        session.stop().await;
    }
}
