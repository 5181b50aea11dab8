use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    task::AbortHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};

const TICK: Duration = Duration::from_secs(1);

struct ActiveTimer {
    id: u64,
    handle: AbortHandle,
}

type Slot = Arc<Mutex<Option<ActiveTimer>>>;

/// Per-session countdown driving round expiry.
///
/// At most one countdown runs at a time: starting a new one aborts the previous.
/// Once the countdown reaches zero it detaches itself before calling `on_expire`,
/// so the expiry callback may safely start the next countdown.
#[derive(Default)]
pub struct RoundTimer {
    slot: Slot,
    next_id: AtomicU64,
}

impl RoundTimer {
    /// Create an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a countdown of `duration_secs`, replacing any running one.
    ///
    /// `on_tick` receives the seconds remaining once per second (never zero);
    /// `on_expire` runs exactly once when the countdown completes uncancelled.
    pub fn start<T, E>(&self, duration_secs: u32, on_tick: T, on_expire: E)
    where
        T: Fn(u32) -> BoxFuture<'static, ()> + Send + 'static,
        E: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot.clone();

        // Hold the slot while spawning so the task cannot detach before it is registered.
        let mut guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = guard.take() {
            previous.handle.abort();
        }

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for elapsed in 1..=duration_secs {
                ticker.tick().await;
                let remaining = duration_secs - elapsed;
                if remaining > 0 {
                    let tick = on_tick(remaining);
                    tick.await;
                }
            }

            {
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                match guard.as_ref() {
                    Some(active) if active.id == id => {
                        guard.take();
                    }
                    _ => return,
                }
            }

            on_expire().await;
        });

        *guard = Some(ActiveTimer {
            id,
            handle: task.abort_handle(),
        });
    }

    /// Stop the running countdown, if any. Calling it again is harmless.
    pub fn cancel(&self) {
        let mut guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = guard.take() {
            active.handle.abort();
        }
    }

    /// Whether a countdown is currently pending.
    pub fn is_running(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures::FutureExt;
    use tokio::{sync::mpsc, time::sleep};

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Fired {
        Tick(&'static str, u32),
        Expire(&'static str),
    }

    fn start(timer: &RoundTimer, label: &'static str, secs: u32, tx: mpsc::UnboundedSender<Fired>) {
        let tick_tx = tx.clone();
        timer.start(
            secs,
            move |remaining| {
                let _ = tick_tx.send(Fired::Tick(label, remaining));
                async {}.boxed()
            },
            move || {
                let _ = tx.send(Fired::Expire(label));
                async {}.boxed()
            },
        );
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Fired>) -> Vec<Fired> {
        let mut fired = Vec::new();
        while let Ok(event) = rx.try_recv() {
            fired.push(event);
        }
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_second_then_expires_once() {
        let timer = RoundTimer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        start(&timer, "a", 3, tx);
        assert!(timer.is_running());

        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(
            drain(&mut rx),
            vec![Fired::Tick("a", 2), Fired::Tick("a", 1), Fired::Expire("a")]
        );
        assert!(!timer.is_running());

        sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_expiry_and_is_idempotent() {
        let timer = RoundTimer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        start(&timer, "a", 3, tx);

        sleep(Duration::from_millis(1_500)).await;
        timer.cancel();
        timer.cancel();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(drain(&mut rx), vec![Fired::Tick("a", 2)]);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_countdown() {
        let timer = RoundTimer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        start(&timer, "first", 2, tx.clone());
        sleep(Duration::from_millis(1_500)).await;
        start(&timer, "second", 2, tx);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(
            drain(&mut rx),
            vec![
                Fired::Tick("first", 1),
                Fired::Tick("second", 1),
                Fired::Expire("second"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_callback_can_chain_the_next_countdown() {
        let timer = Arc::new(RoundTimer::new());
        let expirations = Arc::new(AtomicUsize::new(0));

        let chained = timer.clone();
        let counter = expirations.clone();
        timer.start(
            1,
            |_| async {}.boxed(),
            move || {
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let inner = counter.clone();
                    chained.start(
                        1,
                        |_| async {}.boxed(),
                        move || {
                            async move {
                                inner.fetch_add(1, Ordering::SeqCst);
                            }
                            .boxed()
                        },
                    );
                }
                .boxed()
            },
        );

        sleep(Duration::from_secs(3)).await;
        assert_eq!(expirations.load(Ordering::SeqCst), 2);
    }
}
