//! USB hotplug monitoring.
//!
//! A background task polls the mounted volume set, diffs it against the
//! volumes seen on the previous tick and inspects only the newcomers. The
//! first valid package found on a tick is handed to the registered
//! [`UpdateHandler`]; remaining new volumes on that tick are not inspected.
//!
//! The handler runs synchronously on the polling task's blocking worker.
//! Errors it returns and panics it raises are caught and logged here and
//! never stop the loop.

use crate::package::{self, UpdateManifest};
use crate::volumes::{VolumeId, VolumeScanner};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback invoked with a freshly detected package.
pub type UpdateHandler = Arc<dyn Fn(UpdateManifest) -> anyhow::Result<()> + Send + Sync>;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-tick detection logic, independent of scheduling.
pub struct Detector<S> {
    scanner: S,
    known: BTreeSet<VolumeId>,
}

impl<S: VolumeScanner> Detector<S> {
    pub fn new(scanner: S) -> Self {
        Self {
            scanner,
            known: BTreeSet::new(),
        }
    }

    /// Current volume set, or the previous one if enumeration failed.
    fn scan(&mut self) -> BTreeSet<VolumeId> {
        match self.scanner.list_volumes() {
            Ok(volumes) => volumes,
            Err(e) => {
                warn!("Volume enumeration failed, keeping previous set: {:#}", e);
                self.known.clone()
            }
        }
    }

    /// Take the currently mounted volumes as already seen.
    pub fn baseline(&mut self) {
        self.known = self.scan();
        debug!("Baseline volumes: {:?}", self.known);
    }

    /// Run one tick: returns the first valid package on a newly arrived
    /// volume, in mount point order.
    pub fn poll(&mut self) -> Option<UpdateManifest> {
        let current = self.scan();
        let new_volumes: Vec<&VolumeId> = current.difference(&self.known).collect();

        if !new_volumes.is_empty() {
            info!(
                "New volume(s) detected: {}",
                new_volumes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }

        let found = new_volumes
            .into_iter()
            .find_map(|volume| package::inspect(volume.mount_point()));

        self.known = current;
        found
    }

    pub fn known_volumes(&self) -> &BTreeSet<VolumeId> {
        &self.known
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the detector and the lifecycle of its polling task.
pub struct UsbMonitor<S> {
    detector: Arc<Mutex<Detector<S>>>,
    check_interval: Duration,
    stop_timeout: Duration,
    task: Option<RunningTask>,
}

fn lock<S>(detector: &Mutex<Detector<S>>) -> MutexGuard<'_, Detector<S>> {
    // a panicking handler never holds this lock, but stay usable regardless
    detector.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S: VolumeScanner + 'static> UsbMonitor<S> {
    pub fn new(scanner: S) -> Self {
        Self {
            detector: Arc::new(Mutex::new(Detector::new(scanner))),
            check_interval: DEFAULT_CHECK_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            task: None,
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn state(&self) -> MonitorState {
        match &self.task {
            Some(task) if !task.handle.is_finished() => MonitorState::Running,
            _ => MonitorState::Stopped,
        }
    }

    /// Baseline the volume set and spawn the polling task.
    ///
    /// Must be called from within a Tokio runtime. Volumes mounted before
    /// this call are never reported.
    pub fn start(&mut self, handler: UpdateHandler) {
        if self.state() == MonitorState::Running {
            warn!("USB monitor is already running");
            return;
        }

        lock(&self.detector).baseline();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.detector),
            handler,
            self.check_interval,
            cancel.clone(),
        ));

        self.task = Some(RunningTask { cancel, handle });
        info!("USB monitor started (interval {:?})", self.check_interval);
    }

    /// Signal the polling task and wait for it, up to the stop timeout.
    /// No handler invocation starts after this returns.
    pub async fn stop(&mut self) {
        let Some(RunningTask { cancel, handle }) = self.task.take() else {
            return;
        };

        cancel.cancel();
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => error!("USB monitor task failed: {}", e),
            Err(_) => {
                warn!("USB monitor did not stop within {:?}, aborting", self.stop_timeout);
                abort.abort();
            }
        }

        info!("USB monitor stopped");
    }

    /// Volumes seen on the last tick.
    pub fn known_volumes(&self) -> BTreeSet<VolumeId> {
        lock(&self.detector).known_volumes().clone()
    }
}

impl<S> Drop for UsbMonitor<S> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.cancel.cancel();
        }
    }
}

async fn poll_loop<S: VolumeScanner + 'static>(
    detector: Arc<Mutex<Detector<S>>>,
    handler: UpdateHandler,
    check_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(check_interval) => {}
        }

        let detector = Arc::clone(&detector);
        let handler = Arc::clone(&handler);
        let tick_cancel = cancel.clone();

        let tick = tokio::task::spawn_blocking(move || {
            let found = lock(&detector).poll();
            if let Some(manifest) = found {
                if tick_cancel.is_cancelled() {
                    return;
                }
                dispatch(&handler, manifest);
            }
        });

        if let Err(e) = tick.await {
            error!("USB monitor tick failed: {}", e);
        }
    }
    debug!("USB monitor loop exited");
}

fn dispatch(handler: &UpdateHandler, manifest: UpdateManifest) {
    let version = manifest.version;
    info!("Update {} detected at {}, notifying handler", version, manifest.package_path.display());

    match catch_unwind(AssertUnwindSafe(|| handler(manifest))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Update handler failed for {}: {:#}", version, e),
        Err(_) => error!("Update handler panicked for {}", version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_package, PackageSpec};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Scanner over a shared, test-controlled volume set.
    #[derive(Clone, Default)]
    struct FakeVolumes {
        mounted: Arc<Mutex<BTreeSet<VolumeId>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl FakeVolumes {
        fn plug(&self, path: &Path) {
            self.mounted.lock().unwrap().insert(VolumeId::new(path));
        }

        fn unplug(&self, path: &Path) {
            self.mounted.lock().unwrap().remove(&VolumeId::new(path));
        }

        fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }
    }

    impl VolumeScanner for FakeVolumes {
        fn list_volumes(&mut self) -> anyhow::Result<BTreeSet<VolumeId>> {
            if *self.fail.lock().unwrap() {
                anyhow::bail!("mount table unavailable");
            }
            Ok(self.mounted.lock().unwrap().clone())
        }
    }

    fn counting_handler() -> (UpdateHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler: UpdateHandler = Arc::new(move |_manifest: UpdateManifest| -> anyhow::Result<()> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (handler, count)
    }

    async fn wait_for(count: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if count.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("handler was called {} times, expected {}", count.load(Ordering::SeqCst), expected);
    }

    #[test]
    fn test_baseline_volumes_are_not_new() {
        let usb = TempDir::new().unwrap();
        write_package(usb.path(), &PackageSpec::new("1.0.8"));

        let volumes = FakeVolumes::default();
        volumes.plug(usb.path());

        let mut detector = Detector::new(volumes);
        detector.baseline();
        assert!(detector.poll().is_none());
    }

    #[test]
    fn test_new_volume_is_reported_once() {
        let usb = TempDir::new().unwrap();
        write_package(usb.path(), &PackageSpec::new("1.0.8"));

        let volumes = FakeVolumes::default();
        let mut detector = Detector::new(volumes.clone());
        detector.baseline();

        volumes.plug(usb.path());
        let manifest = detector.poll().unwrap();
        assert_eq!(manifest.version.to_string(), "1.0.8");

        // volume stays mounted: no re-notification
        assert!(detector.poll().is_none());
        assert!(detector.poll().is_none());

        // unplug and replug: reported again
        volumes.unplug(usb.path());
        assert!(detector.poll().is_none());
        volumes.plug(usb.path());
        assert!(detector.poll().is_some());
    }

    #[test]
    fn test_only_first_package_per_tick() {
        let usb_a = TempDir::new().unwrap();
        let usb_b = TempDir::new().unwrap();
        write_package(usb_a.path(), &PackageSpec::new("1.0.8"));
        write_package(usb_b.path(), &PackageSpec::new("1.0.9"));

        let volumes = FakeVolumes::default();
        let mut detector = Detector::new(volumes.clone());
        detector.baseline();

        volumes.plug(usb_a.path());
        volumes.plug(usb_b.path());

        let first = detector.poll().unwrap();
        let expected = if usb_a.path() < usb_b.path() { "1.0.8" } else { "1.0.9" };
        assert_eq!(first.version.to_string(), expected);

        // both are known now, the second one is not surfaced later
        assert!(detector.poll().is_none());
        assert_eq!(detector.known_volumes().len(), 2);
    }

    #[test]
    fn test_plain_volumes_are_ignored() {
        let stick = TempDir::new().unwrap();
        let volumes = FakeVolumes::default();
        let mut detector = Detector::new(volumes.clone());
        detector.baseline();

        volumes.plug(stick.path());
        assert!(detector.poll().is_none());
        assert_eq!(detector.known_volumes().len(), 1);
    }

    #[test]
    fn test_enumeration_failure_keeps_previous_set() {
        let stick = TempDir::new().unwrap();
        let volumes = FakeVolumes::default();
        volumes.plug(stick.path());

        let mut detector = Detector::new(volumes.clone());
        detector.baseline();

        volumes.set_failing(true);
        assert!(detector.poll().is_none());
        assert_eq!(detector.known_volumes().len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_notifies_and_stops() {
        let usb = TempDir::new().unwrap();
        write_package(usb.path(), &PackageSpec::new("1.0.8"));

        let volumes = FakeVolumes::default();
        let mut monitor = UsbMonitor::new(volumes.clone()).with_check_interval(Duration::from_millis(10));
        let (handler, count) = counting_handler();

        monitor.start(handler);
        assert_eq!(monitor.state(), MonitorState::Running);

        volumes.plug(usb.path());
        wait_for(&count, 1).await;

        // several more ticks with the volume still present
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        monitor.stop().await;
        assert_eq!(monitor.state(), MonitorState::Stopped);

        volumes.unplug(usb.path());
        tokio::time::sleep(Duration::from_millis(30)).await;
        volumes.plug(usb.path());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_rebaselines() {
        let usb = TempDir::new().unwrap();
        write_package(usb.path(), &PackageSpec::new("1.0.8"));

        let volumes = FakeVolumes::default();
        let mut monitor = UsbMonitor::new(volumes.clone()).with_check_interval(Duration::from_millis(10));
        let (handler, count) = counting_handler();

        monitor.start(Arc::clone(&handler));
        volumes.plug(usb.path());
        wait_for(&count, 1).await;
        monitor.stop().await;

        monitor.start(handler);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_loop() {
        let usb_a = TempDir::new().unwrap();
        let usb_b = TempDir::new().unwrap();
        write_package(usb_a.path(), &PackageSpec::new("1.0.8"));
        write_package(usb_b.path(), &PackageSpec::new("1.0.9"));

        let volumes = FakeVolumes::default();
        let mut monitor = UsbMonitor::new(volumes.clone()).with_check_interval(Duration::from_millis(10));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        monitor.start(Arc::new(move |_manifest: UpdateManifest| -> anyhow::Result<()> {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                panic!("UI bug");
            }
            anyhow::bail!("still broken")
        }));

        volumes.plug(usb_a.path());
        wait_for(&calls, 1).await;
        volumes.plug(usb_b.path());
        wait_for(&calls, 2).await;

        assert_eq!(monitor.state(), MonitorState::Running);
        monitor.stop().await;
    }
}
