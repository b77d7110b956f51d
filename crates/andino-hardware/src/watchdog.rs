//! Deferred OS shutdown on a persistent power-fail signal.
//!
//! ```text
//! signal ──▶ active ──arm──▶ [ sleep(delay) ] ──still active?──▶ ShutdownAction
//!        └─▶ cleared ──────▶ abort pending timer
//! ```
//!
//! Arming always aborts the previous timer first, so a flapping signal never
//! leaves two timers racing to shut the machine down.

use std::fmt;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{HardwareError, Result, lock};

/// What to do once the shutdown request has persisted.
pub trait ShutdownAction: Send + Sync + fmt::Debug {
    fn shutdown(&self) -> Result<()>;
}

/// Runs a shell command line, e.g. `sudo shutdown -h now`.
#[derive(Debug, Clone)]
pub struct CommandShutdown {
    script: String,
}

impl CommandShutdown {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl ShutdownAction for CommandShutdown {
    fn shutdown(&self) -> Result<()> {
        info!(script = %self.script, "Running shutdown script");
        let status = Command::new("sh").arg("-c").arg(&self.script).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(HardwareError::ShutdownScript { status })
        }
    }
}

/// One-shot timer guarding a shutdown request.
#[derive(Debug)]
pub struct ShutdownWatchdog {
    delay: Duration,
    action: Arc<dyn ShutdownAction>,
    active: Arc<AtomicBool>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ShutdownWatchdog {
    pub fn new(delay: Duration, action: Arc<dyn ShutdownAction>) -> Self {
        Self {
            delay,
            action,
            active: Arc::new(AtomicBool::new(false)),
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Feed the current state of the shutdown signal.
    ///
    /// A rising signal arms the timer on `runtime`; a falling one cancels it.
    /// Repeating the current state is a no-op.
    pub fn update(&self, active: bool, runtime: &Handle) {
        let was_active = self.active.swap(active, Ordering::AcqRel);
        match (was_active, active) {
            (false, true) => self.arm(runtime),
            (true, false) => {
                if self.abort_pending() {
                    info!("Shutdown request cleared before deadline");
                }
            }
            _ => {}
        }
    }

    /// Drop any pending shutdown and forget the signal state.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::Release);
        self.abort_pending();
    }

    /// A timer is counting down.
    pub fn is_armed(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn arm(&self, runtime: &Handle) {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        warn!(delay_ms = self.delay.as_millis() as u64, "Shutdown requested, waiting for confirmation");
        let delay = self.delay;
        let active = Arc::clone(&self.active);
        let action = Arc::clone(&self.action);
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !active.load(Ordering::Acquire) {
                return;
            }
            warn!("Shutdown signal persisted, shutting down");
            match tokio::task::spawn_blocking(move || action.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Shutdown action failed"),
                Err(e) => error!(error = %e, "Shutdown action panicked"),
            }
        }));
    }

    fn abort_pending(&self) -> bool {
        match lock(&self.pending).take() {
            Some(task) => {
                let was_pending = !task.is_finished();
                task.abort();
                was_pending
            }
            None => false,
        }
    }
}

impl Drop for ShutdownWatchdog {
    fn drop(&mut self) {
        self.abort_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct CountingAction {
        calls: AtomicUsize,
    }

    impl ShutdownAction for CountingAction {
        fn shutdown(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn watchdog(delay_ms: u64) -> (ShutdownWatchdog, Arc<CountingAction>) {
        let action = Arc::new(CountingAction::default());
        let dog = ShutdownWatchdog::new(Duration::from_millis(delay_ms), action.clone());
        (dog, action)
    }

    /// Give the blocking pool a moment of real time to run the action.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_signal_fires_once() {
        let (dog, action) = watchdog(500);
        let rt = Handle::current();

        dog.update(true, &rt);
        dog.update(true, &rt);
        assert!(dog.is_armed());

        tokio::time::sleep(Duration::from_millis(600)).await;
        settle().await;
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_signal_cancels() {
        let (dog, action) = watchdog(500);
        let rt = Handle::current();

        dog.update(true, &rt);
        tokio::time::sleep(Duration::from_millis(200)).await;
        dog.update(false, &rt);
        assert!(!dog.is_armed());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(action.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_restarts_the_delay() {
        let (dog, action) = watchdog(500);
        let rt = Handle::current();

        dog.update(true, &rt);
        tokio::time::sleep(Duration::from_millis(300)).await;
        dog.update(false, &rt);
        dog.update(true, &rt);

        // 600ms after the first arm, only 300ms after the second.
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(action.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let (dog, action) = watchdog(100);
        dog.update(true, &Handle::current());
        dog.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(action.calls.load(Ordering::SeqCst), 0);
        assert!(!dog.is_armed());
    }
}
