//! Periodic pulling of daemon state. Each puller is registered explicitly
//! by name rather than discovered by reflection: the set of pullers a
//! deployment runs is a fixed, auditable list rather than "whatever
//! implements a marker trait happened to get linked in".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::DaemonId;

#[derive(Debug, Error)]
pub enum PullError {
    #[error("daemon {0} unreachable: {1}")]
    Unreachable(DaemonId, String),
    #[error("daemon {0} returned an unparsable response: {1}")]
    BadResponse(DaemonId, String),
}

/// One data family a puller fetches for a daemon, e.g. statistics or HA
/// status. Implementors do the actual agent RPC; the scheduler only cares
/// about timing and sequencing.
///
/// `interval` is read fresh on every scheduling decision rather than
/// cached once, so a settings change takes effect at the puller's next
/// tick boundary rather than requiring a restart. An interval of zero or
/// negative disables the puller until settings change again; its
/// `last_executed_at` is preserved while disabled.
pub trait Puller: Send + Sync {
    /// Stable name used for registration, logging, and the `/pullers` API.
    fn name(&self) -> &'static str;

    /// The settings key backing this puller's interval, e.g.
    /// `"kea_stats_puller_interval"`.
    fn interval_setting_name(&self) -> &'static str;

    /// Current configured interval. `None` means disabled.
    fn interval(&self) -> Option<Duration>;

    /// Pull state for a single daemon. Errors are logged and counted but
    /// never stop the scheduler or other daemons' pulls.
    fn pull(&self, daemon_id: DaemonId) -> Result<(), PullError>;
}

struct Registration {
    puller: Box<dyn Puller>,
    last_executed_at: Mutex<Option<Instant>>,
}

/// The fixed set of pullers a deployment runs, keyed by name. Built once
/// at startup; nothing is added to it at runtime. Doubles as the backing
/// store for the `/pullers` API, which is then a plain iteration over
/// this map rather than reflection over a puller object graph.
#[derive(Default)]
pub struct PullerRegistry {
    pullers: HashMap<&'static str, Registration>,
}

/// A snapshot of one puller's scheduling state, as surfaced by `/pullers`.
#[derive(Debug, Clone)]
pub struct PullerStatus {
    pub name: &'static str,
    pub interval_setting_name: &'static str,
    pub interval: Option<Duration>,
    pub last_executed_at: Option<Instant>,
}

impl PullerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, puller: Box<dyn Puller>) -> Self {
        let name = puller.name();
        let registration = Registration {
            puller,
            last_executed_at: Mutex::new(None),
        };
        if self.pullers.insert(name, registration).is_some() {
            warn!(puller = name, "puller registered twice, keeping the last one");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Puller> {
        self.pullers.get(name).map(|r| r.puller.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.pullers.keys().copied().collect()
    }

    pub fn status(&self, name: &str) -> Option<PullerStatus> {
        let reg = self.pullers.get(name)?;
        Some(PullerStatus {
            name: reg.puller.name(),
            interval_setting_name: reg.puller.interval_setting_name(),
            interval: reg.puller.interval(),
            last_executed_at: *reg.last_executed_at.lock().expect("lock poisoned"),
        })
    }

    pub fn statuses(&self) -> Vec<PullerStatus> {
        let mut names: Vec<&'static str> = self.names();
        names.sort_unstable();
        names.into_iter().filter_map(|n| self.status(n)).collect()
    }

    fn mark_executed(&self, name: &str, at: Instant) {
        if let Some(reg) = self.pullers.get(name) {
            *reg.last_executed_at.lock().expect("lock poisoned") = Some(at);
        }
    }
}

/// How often the scheduler re-checks every puller's due-ness. Finer than
/// any real puller interval, coarse enough not to busy-loop.
const POLL_GRANULARITY: Duration = Duration::from_millis(200);

/// Drives every registered puller, against a daemon list supplied fresh
/// each time a puller fires so newly-discovered daemons are picked up
/// without a scheduler restart. One logical task per puller: a puller's
/// own tick never overlaps itself, but distinct pullers interleave freely
/// on the poll loop.
pub struct Scheduler<F>
where
    F: Fn() -> Vec<DaemonId>,
{
    registry: std::sync::Arc<PullerRegistry>,
    daemons: F,
}

impl<F> Scheduler<F>
where
    F: Fn() -> Vec<DaemonId>,
{
    pub fn new(registry: PullerRegistry, daemons: F) -> Self {
        Self {
            registry: std::sync::Arc::new(registry),
            daemons,
        }
    }

    pub fn registry(&self) -> &PullerRegistry {
        &self.registry
    }

    /// A shared handle to the registry, independent of the scheduler's own
    /// lifetime — for surfacing puller status (e.g. the `/pullers` API)
    /// from a thread that isn't running [`Self::run`].
    pub fn registry_handle(&self) -> std::sync::Arc<PullerRegistry> {
        self.registry.clone()
    }

    /// Runs until `stop` fires or a send on it closes the channel.
    pub fn run(&self, stop: &Receiver<()>) {
        let names = self.registry.names();
        if names.is_empty() {
            warn!("scheduler started with no registered pullers");
            return;
        }
        info!(pullers = ?names, "puller scheduler started");

        loop {
            match stop.recv_timeout(POLL_GRANULARITY) {
                Ok(()) => {
                    info!("puller scheduler stopping");
                    return;
                }
                Err(crossbeam::channel::RecvTimeoutError::Disconnected) => {
                    info!("puller scheduler stopping (stop channel dropped)");
                    return;
                }
                Err(crossbeam::channel::RecvTimeoutError::Timeout) => {}
            }
            self.tick(&names);
        }
    }

    fn tick(&self, names: &[&'static str]) {
        let now = Instant::now();
        for name in names {
            let Some(status) = self.registry.status(name) else {
                continue;
            };
            let Some(interval) = status.interval else {
                continue;
            };
            let due = match status.last_executed_at {
                None => true,
                Some(last) => now.saturating_duration_since(last) >= interval,
            };
            if due {
                self.run_once(name, now);
            }
        }
    }

    fn run_once(&self, name: &str, at: Instant) {
        let Some(puller) = self.registry.get(name) else {
            return;
        };
        for daemon_id in (self.daemons)() {
            if let Err(err) = puller.pull(daemon_id) {
                debug!(puller = name, %daemon_id, error = %err, "pull failed");
            }
        }
        self.registry.mark_executed(name, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, RwLock};

    struct CountingPuller {
        name: &'static str,
        interval: Arc<RwLock<Option<Duration>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Puller for CountingPuller {
        fn name(&self) -> &'static str {
            self.name
        }

        fn interval_setting_name(&self) -> &'static str {
            "test_puller_interval"
        }

        fn interval(&self) -> Option<Duration> {
            *self.interval.read().expect("lock poisoned")
        }

        fn pull(&self, _daemon_id: DaemonId) -> Result<(), PullError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn registry_keeps_last_registration_on_name_clash() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let interval = Arc::new(RwLock::new(Some(Duration::from_secs(1))));
        let registry = PullerRegistry::new()
            .register(Box::new(CountingPuller {
                name: "stats",
                interval: interval.clone(),
                calls: calls_a.clone(),
            }))
            .register(Box::new(CountingPuller {
                name: "stats",
                interval: interval.clone(),
                calls: calls_b.clone(),
            }));

        registry.get("stats").unwrap().pull(DaemonId(1)).unwrap();
        assert_eq!(calls_a.load(Ordering::SeqCst), 0);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scheduler_runs_until_stopped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let interval = Arc::new(RwLock::new(Some(Duration::from_millis(1))));
        let registry = PullerRegistry::new().register(Box::new(CountingPuller {
            name: "stats",
            interval: interval.clone(),
            calls: calls.clone(),
        }));
        let scheduler = Scheduler::new(registry, || vec![DaemonId(1), DaemonId(2)]);

        let (stop_tx, stop_rx) = crossbeam::channel::bounded(1);
        let handle = std::thread::spawn(move || scheduler.run(&stop_rx));
        std::thread::sleep(Duration::from_millis(500));
        stop_tx.send(()).unwrap();
        handle.join().unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn disabled_puller_never_fires_and_keeps_last_executed_at() {
        let calls = Arc::new(AtomicUsize::new(0));
        let interval = Arc::new(RwLock::new(Some(Duration::from_millis(1))));
        let registry = PullerRegistry::new().register(Box::new(CountingPuller {
            name: "stats",
            interval: interval.clone(),
            calls: calls.clone(),
        }));
        let scheduler = Scheduler::new(registry, || vec![DaemonId(1)]);
        scheduler.tick(&["stats"]);
        let before = scheduler.registry().status("stats").unwrap().last_executed_at;
        assert!(before.is_some());

        *interval.write().unwrap() = None;
        std::thread::sleep(Duration::from_millis(5));
        scheduler.tick(&["stats"]);
        let after = scheduler.registry().status("stats").unwrap().last_executed_at;
        assert_eq!(before, after);
    }
}
