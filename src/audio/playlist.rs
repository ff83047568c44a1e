use serenity::model::id::UserId;
use tracing::{info, warn};

use super::session::SessionHandle;
use crate::sources::ResolutionRouter;

/// Resultado agregado de una carga masiva
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub total: usize,
    /// Consulta y motivo (mensaje para el usuario) de cada entrada fallida
    pub failures: Vec<(String, String)>,
}

impl BulkReport {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Resuelve y encola cada entrada por separado; un fallo no detiene al resto
pub async fn enqueue_all(
    session: &SessionHandle,
    router: &ResolutionRouter,
    queries: &[String],
    requested_by: UserId,
) -> BulkReport {
    let mut report = BulkReport {
        total: queries.len(),
        ..Default::default()
    };

    for query in queries {
        let outcome = match router.resolve_query(query).await {
            Ok(track) => session
                .add_track(track, requested_by)
                .await
                .map_err(|e| e.user_message()),
            Err(e) => Err(e.user_message()),
        };

        match outcome {
            Ok(_) => report.succeeded += 1,
            Err(reason) => {
                warn!("⚠️ Entrada de playlist omitida '{}': {}", query, reason);
                report.failures.push((query.clone(), reason));
            }
        }
    }

    info!(
        "📋 Playlist cargada: {}/{} canciones",
        report.succeeded, report.total
    );
    report
}
