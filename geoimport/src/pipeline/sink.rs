//! Consommateur à concurrence bornée
//!
//! Chaque item admis est traité dans une tâche tokio. Un sémaphore de
//! `max_concurrency` permis borne le nombre de handlers en vol : tant qu'un
//! permis est libre, `push` rend la main immédiatement (acquittement) ; sinon
//! le producteur attend dans la file FIFO du sémaphore, ce qui suspend la
//! lecture de la source (backpressure).
//!
//! ```text
//! Idle/Saturated --close()--> Draining --(in-flight == 0)--> Closed (finish)
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

use crate::error::ImportError;

/// Callbacks invoqués par le sink
#[async_trait]
pub trait SinkHandler<T>: Send + Sync + 'static {
    /// Traite un item ; une erreur est routée vers `handle_error`
    async fn handle(&self, item: &T) -> anyhow::Result<()>;

    /// Reçoit l'erreur et l'item en échec (pas de retry à ce niveau)
    fn handle_error(&self, error: anyhow::Error, item: T);

    /// Appelé une seule fois, quand tout est drainé
    async fn finish(&self);
}

/// État observable du sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Des permis sont libres : les items sont admis immédiatement
    Idle,
    /// Tous les permis sont pris : le producteur attend
    Saturated,
    /// Producteur terminé, handlers encore en vol
    Draining,
    /// Terminal : `finish` a été appelé
    Closed,
}

pub struct BoundedSink<T, H> {
    handler: Arc<H>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    tasks: JoinSet<()>,
    closing: bool,
    finished: bool,
    admitted: u64,
    completed: u64,
    _items: PhantomData<fn(T)>,
}

impl<T, H> BoundedSink<T, H>
where
    T: Send + Sync + 'static,
    H: SinkHandler<T>,
{
    pub fn new(max_concurrency: usize, handler: Arc<H>) -> Result<Self, ImportError> {
        if max_concurrency == 0 {
            return Err(ImportError::invalid_request(
                "maxConcurrency must be at least 1",
            ));
        }

        Ok(Self {
            handler,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            tasks: JoinSet::new(),
            closing: false,
            finished: false,
            admitted: 0,
            completed: 0,
            _items: PhantomData,
        })
    }

    pub fn state(&self) -> SinkState {
        if self.finished {
            SinkState::Closed
        } else if self.closing {
            SinkState::Draining
        } else if self.permits.available_permits() == 0 {
            SinkState::Saturated
        } else {
            SinkState::Idle
        }
    }

    /// Nombre de handlers en vol
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }

    /// Nombre d'items admis depuis la création
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Nombre de handlers terminés et récoltés
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Soumet un item ; retourne une fois l'item admis.
    ///
    /// À capacité, l'appel attend qu'un handler se termine (ordre d'admission
    /// FIFO). Un item soumis après `close()` est routé vers `handle_error`.
    pub async fn push(&mut self, item: T) {
        if self.closing {
            warn!("Item pushed to a closed sink");
            self.handler
                .handle_error(anyhow!("sink is closed"), item);
            return;
        }

        self.reap();

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.handler.handle_error(anyhow!("sink is closed: {e}"), item);
                return;
            }
        };

        self.admitted += 1;
        let handler = Arc::clone(&self.handler);

        self.tasks.spawn(async move {
            let outcome = AssertUnwindSafe(handler.handle(&item)).catch_unwind().await;
            let result = match outcome {
                Ok(result) => result,
                Err(panic) => Err(anyhow!("handler panicked: {}", panic_message(&panic))),
            };

            if let Err(error) = result {
                handler.handle_error(error, item);
            }
            drop(permit);
        });
    }

    /// Passe en drainage, attend les handlers en vol, puis appelle `finish`.
    ///
    /// Idempotent : les appels suivants ne rappellent jamais `finish`.
    pub async fn close(&mut self) {
        if self.finished {
            debug!("Sink already closed");
            return;
        }

        self.closing = true;
        debug!(in_flight = self.in_flight(), "Draining sink");

        while let Some(joined) = self.tasks.join_next().await {
            self.record_join(joined);
        }

        self.finished = true;
        self.handler.finish().await;
    }

    /// Annule les handlers en vol sans appeler `finish` (erreur fatale amont)
    pub async fn abort(&mut self) {
        self.closing = true;
        self.finished = true;
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            self.record_join(joined);
        }
    }

    /// Récolte les tâches déjà terminées
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.record_join(joined);
        }
    }

    fn record_join(&mut self, joined: Result<(), JoinError>) {
        self.completed += 1;
        if let Err(e) = joined {
            if e.is_cancelled() {
                debug!("Sink task cancelled");
            } else {
                error!(error = %e, "Sink task failed");
            }
        }
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
