use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Temporizador de inactividad de una sesión.
///
/// Only `arm` and `disarm` change it. Each arm gets a new generation, and the
/// message delivered on expiry carries it so a late fire from a superseded
/// timer can be told apart with [`IdleWatchdog::is_current`].
pub struct IdleWatchdog<M: Send + 'static> {
    tx: UnboundedSender<M>,
    on_expire: fn(u64) -> M,
    generation: u64,
    token: Option<CancellationToken>,
}

impl<M: Send + 'static> IdleWatchdog<M> {
    pub fn new(tx: UnboundedSender<M>, on_expire: fn(u64) -> M) -> Self {
        Self {
            tx,
            on_expire,
            generation: 0,
            token: None,
        }
    }

    pub fn arm(&mut self, timeout: Duration) {
        self.disarm();

        let token = CancellationToken::new();
        let generation = self.generation;
        let message = (self.on_expire)(generation);
        let tx = self.tx.clone();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = tx.send(message);
                }
            }
        });

        debug!("⏲️ Watchdog armado ({:?}, gen {})", timeout, generation);
        self.token = Some(token);
    }

    pub fn disarm(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            debug!("⏲️ Watchdog desarmado (gen {})", self.generation);
        }
        self.generation += 1;
    }

    pub fn is_armed(&self) -> bool {
        self.token.is_some()
    }

    /// True si `generation` corresponde al temporizador armado ahora mismo
    pub fn is_current(&self, generation: u64) -> bool {
        self.token.is_some() && generation == self.generation
    }
}

impl<M: Send + 'static> Drop for IdleWatchdog<M> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn watchdog() -> (IdleWatchdog<u64>, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (IdleWatchdog::new(tx, |generation| generation), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let (mut watchdog, mut rx) = watchdog();
        watchdog.arm(Duration::from_secs(10));

        let generation = rx.recv().await.unwrap();
        assert!(watchdog.is_current(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_cancels() {
        let (mut watchdog, mut rx) = watchdog();
        watchdog.arm(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        watchdog.disarm();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert!(rx.try_recv().is_err());
        assert!(!watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let (mut watchdog, mut rx) = watchdog();
        watchdog.arm(Duration::from_secs(10));
        let first = watchdog.generation;
        watchdog.arm(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(rx.try_recv().is_err());

        let generation = rx.recv().await.unwrap();
        assert_ne!(generation, first);
        assert!(watchdog.is_current(generation));
        assert!(!watchdog.is_current(first));
    }
}
