//! Update session manager
//!
//! One [`UpdateSession`] per update attempt, at most one active per device.
//! A spawned driver task moves each session through
//! `downloading → verifying → installing → completed`:
//!
//! 1. Stream the payload from [`ObjectTransfer`], driving progress from the
//!    bytes received against the package's published size
//! 2. Verify the SHA-256 of the full payload against the catalog checksum;
//!    on mismatch the payload is dropped and the session fails
//! 3. Hand the verified payload to the [`Installer`]
//! 4. Commit the target version into the [`DeviceRegistry`]; the session is
//!    marked `completed` inside the registry's critical section for the
//!    device, so the committed version and the terminal state move together
//!
//! Cancellation is cooperative. [`UpdateSessionManager::cancel`] flips the
//! state and wakes the driver, which stops at its next checkpoint and drops
//! the transfer stream. Once `installing` is reached a session can no
//! longer be cancelled.
//!
//! Snapshots are published through a `tokio::sync::watch` channel per
//! session, so status reads never wait on a running driver.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use earth_core::validate::check_device_id;
use earth_core::{
    CatalogService, Device, EarthError, EarthResult, IdentityGenerator, Installer,
    IntegrityChecker, ObjectTransfer, OsVersion, RunningChecksum, SessionFailure, SessionKind,
    SessionState, UpdateCheck, UpdatePackage, UpdateSession,
};
use earth_registry::{DeviceLocks, DeviceRegistry};
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::catalog::{available_updates, find_package};
use crate::config::UpdateConfig;

/// Upper bound on the buffer reserved up front for a payload
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

const ACTIVE_STATES: [SessionState; 3] = [
    SessionState::Downloading,
    SessionState::Verifying,
    SessionState::Installing,
];

/// Creates, advances and terminates update sessions
#[derive(Clone)]
pub struct UpdateSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: DeviceRegistry,
    catalog: Arc<dyn CatalogService>,
    transfer: Arc<dyn ObjectTransfer>,
    installer: Arc<dyn Installer>,
    config: UpdateConfig,
    /// Serializes session creation and device removal per device
    locks: DeviceLocks,
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    /// Session ids per device, oldest first
    by_device: RwLock<HashMap<String, Vec<String>>>,
}

struct SessionSlot {
    tx: watch::Sender<UpdateSession>,
    cancel: Notify,
}

impl SessionSlot {
    fn snapshot(&self) -> UpdateSession {
        self.tx.borrow().clone()
    }

    /// Apply `f` if the session is currently in one of `from`.
    /// Returns false (and leaves the session alone) otherwise.
    fn transition(&self, from: &[SessionState], f: impl FnOnce(&mut UpdateSession)) -> bool {
        self.tx.send_if_modified(|session| {
            if !from.contains(&session.state) {
                return false;
            }
            f(session);
            session.updated_at = Utc::now();
            true
        })
    }
}

impl UpdateSessionManager {
    pub fn new(
        registry: DeviceRegistry,
        catalog: Arc<dyn CatalogService>,
        transfer: Arc<dyn ObjectTransfer>,
        installer: Arc<dyn Installer>,
        config: UpdateConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                catalog,
                transfer,
                installer,
                config,
                locks: DeviceLocks::new(),
                sessions: RwLock::new(HashMap::new()),
                by_device: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    /// Packages newer than the device's committed version
    pub async fn check_updates(&self, device_id: &str) -> EarthResult<UpdateCheck> {
        let device = self.inner.registry.get(device_id).await?;
        let packages = self.inner.catalog.list_packages().await?;

        let latest_version = packages.iter().map(|p| &p.version).max().cloned();
        let newer = available_updates(&packages, &device.os_version);
        debug!(
            device_id = %device_id,
            current = %device.os_version,
            available = newer.len(),
            "Update check"
        );

        Ok(UpdateCheck {
            device_id: device.device_id,
            current_version: device.os_version,
            latest_version,
            is_update_available: !newer.is_empty(),
            packages: newer,
        })
    }

    /// Open a session updating the device to `target_version`.
    ///
    /// Fails with `InvalidVersion` unless the target parses and is strictly
    /// newer than the committed version, `Conflict` if the device already
    /// has an active session, `NotFound` for an unknown device or a version
    /// the catalog does not publish.
    pub async fn start_update(
        &self,
        device_id: &str,
        target_version: &str,
    ) -> EarthResult<UpdateSession> {
        self.open_session(device_id, target_version, SessionKind::Update)
            .await
    }

    /// Open a session moving the device back to a previously committed
    /// version. The rollback package goes through the same download,
    /// verify and install pipeline as a forward update.
    ///
    /// The target must appear in the device's version history and be lower
    /// than the committed version, otherwise `InvalidVersion`.
    pub async fn rollback(&self, device_id: &str, target_version: &str) -> EarthResult<UpdateSession> {
        self.open_session(device_id, target_version, SessionKind::Rollback)
            .await
    }

    async fn open_session(
        &self,
        device_id: &str,
        target_version: &str,
        kind: SessionKind,
    ) -> EarthResult<UpdateSession> {
        check_device_id(device_id)?;
        let target = OsVersion::parse(target_version)?;

        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.registry.get(device_id).await?;
        check_target(&device, &target, kind)?;

        if let Some(active) = self.inner.active_session(device_id) {
            return Err(EarthError::Conflict(format!(
                "Device {} already has an active update session: {}",
                device_id, active.session_id
            )));
        }

        let packages = self.inner.catalog.list_packages().await?;
        let package = find_package(&packages, &target)
            .cloned()
            .ok_or_else(|| EarthError::NotFound(format!("Update package not found: {}", target)))?;

        let now = Utc::now();
        let session = UpdateSession {
            session_id: IdentityGenerator::new_session_id(),
            device_id: device_id.to_string(),
            kind,
            from_version: device.os_version.clone(),
            target_version: target.clone(),
            state: SessionState::Downloading,
            progress: 0.0,
            bytes_received: 0,
            bytes_total: package.size,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let slot = self.inner.insert(session.clone());

        let span = info_span!(
            "update_session",
            session_id = %session.session_id,
            device_id = %device_id,
        );
        let driver = SessionDriver {
            inner: self.inner.clone(),
            slot,
            package,
        };
        tokio::spawn(driver.run().instrument(span));

        info!(
            session_id = %session.session_id,
            device_id = %device_id,
            kind = ?kind,
            from = %session.from_version,
            to = %target,
            "Update session created"
        );
        Ok(session)
    }

    /// Current snapshot of a session
    pub fn status(&self, session_id: &str) -> EarthResult<UpdateSession> {
        Ok(self.inner.slot(session_id)?.snapshot())
    }

    /// Receiver of every published snapshot of a session
    pub fn subscribe(&self, session_id: &str) -> EarthResult<watch::Receiver<UpdateSession>> {
        Ok(self.inner.slot(session_id)?.tx.subscribe())
    }

    /// Resolve once the session reaches a terminal state
    pub async fn wait(&self, session_id: &str) -> EarthResult<UpdateSession> {
        let mut rx = self.subscribe(session_id)?;
        let session = rx
            .wait_for(|s| s.state.is_terminal())
            .await
            .map_err(|_| {
                EarthError::Internal(format!("Session {} dropped before finishing", session_id))
            })?
            .clone();
        Ok(session)
    }

    /// Cancel a session that is still downloading or verifying.
    ///
    /// Installing and terminal sessions are refused with `Conflict`. The
    /// device record is never touched.
    pub fn cancel(&self, session_id: &str) -> EarthResult<UpdateSession> {
        let slot = self.inner.slot(session_id)?;
        let cancelled = slot.transition(&[SessionState::Downloading, SessionState::Verifying], |s| {
            s.state = SessionState::Cancelled;
        });

        let session = slot.snapshot();
        if !cancelled {
            return Err(EarthError::Conflict(format!(
                "Session {} cannot be cancelled while {}",
                session_id, session.state
            )));
        }
        slot.cancel.notify_one();

        info!(
            session_id = %session_id,
            device_id = %session.device_id,
            progress = session.progress,
            "Update session cancelled"
        );
        self.inner.prune(&session.device_id);
        Ok(session)
    }

    /// Sessions of a device (active and retained history), oldest first
    pub async fn sessions(&self, device_id: &str) -> EarthResult<Vec<UpdateSession>> {
        self.inner.registry.get(device_id).await?;
        let by_device = self.inner.by_device.read();
        let sessions = self.inner.sessions.read();
        Ok(by_device
            .get(device_id)
            .into_iter()
            .flatten()
            .filter_map(|id| sessions.get(id).map(|slot| slot.snapshot()))
            .collect())
    }

    pub fn active_session(&self, device_id: &str) -> Option<UpdateSession> {
        self.inner.active_session(device_id)
    }

    /// Start an update to the newest available version on every device
    /// that has `auto_update` enabled and no active session.
    ///
    /// Per-device failures are logged and skipped.
    pub async fn auto_update_sweep(&self) -> EarthResult<Vec<UpdateSession>> {
        let mut started = Vec::new();
        for device in self.inner.registry.list().await? {
            if !device.auto_update {
                continue;
            }
            let check = match self.check_updates(&device.device_id).await {
                Ok(check) => check,
                Err(e) => {
                    warn!(device_id = %device.device_id, error = %e, "Update check failed");
                    continue;
                }
            };
            let Some(newest) = check.packages.last() else {
                continue;
            };

            let target = newest.version.to_string();
            match self.start_update(&device.device_id, &target).await {
                Ok(session) => started.push(session),
                Err(EarthError::Conflict(_)) => {
                    debug!(device_id = %device.device_id, "Update already in progress")
                }
                Err(e) => {
                    warn!(device_id = %device.device_id, target = %target, error = %e, "Automatic update not started")
                }
            }
        }
        Ok(started)
    }

    /// Remove a device and its session history. Refused with `Conflict`
    /// while the device has an active session.
    pub async fn remove_device(&self, device_id: &str) -> EarthResult<Device> {
        check_device_id(device_id)?;
        let _guard = self.inner.locks.acquire(device_id).await;

        if let Some(active) = self.inner.active_session(device_id) {
            return Err(EarthError::Conflict(format!(
                "Device {} has an active update session: {}",
                device_id, active.session_id
            )));
        }
        let device = self.inner.registry.remove(device_id).await?;

        {
            let mut by_device = self.inner.by_device.write();
            let mut sessions = self.inner.sessions.write();
            for id in by_device.remove(device_id).unwrap_or_default() {
                sessions.remove(&id);
            }
        }
        Ok(device)
    }
}

fn check_target(device: &Device, target: &OsVersion, kind: SessionKind) -> EarthResult<()> {
    match kind {
        SessionKind::Update if *target <= device.os_version => Err(EarthError::InvalidVersion(
            format!(
                "Target {} is not newer than current version {}",
                target, device.os_version
            ),
        )),
        SessionKind::Rollback if *target >= device.os_version => {
            Err(EarthError::InvalidVersion(format!(
                "Rollback target {} is not older than current version {}",
                target, device.os_version
            )))
        }
        SessionKind::Rollback if !device.has_run(target) => Err(EarthError::InvalidVersion(
            format!("Device never ran version {}", target),
        )),
        _ => Ok(()),
    }
}

impl Inner {
    fn slot(&self, session_id: &str) -> EarthResult<Arc<SessionSlot>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| EarthError::NotFound(format!("Session not found: {}", session_id)))
    }

    fn insert(&self, session: UpdateSession) -> Arc<SessionSlot> {
        let session_id = session.session_id.clone();
        let device_id = session.device_id.clone();
        let (tx, _) = watch::channel(session);
        let slot = Arc::new(SessionSlot {
            tx,
            cancel: Notify::new(),
        });

        let mut by_device = self.by_device.write();
        let mut sessions = self.sessions.write();
        sessions.insert(session_id.clone(), slot.clone());
        by_device.entry(device_id).or_default().push(session_id);
        slot
    }

    fn active_session(&self, device_id: &str) -> Option<UpdateSession> {
        let by_device = self.by_device.read();
        let sessions = self.sessions.read();
        by_device
            .get(device_id)?
            .iter()
            .filter_map(|id| sessions.get(id))
            .map(|slot| slot.snapshot())
            .find(UpdateSession::is_active)
    }

    /// Drop the oldest terminal sessions beyond the retention limit
    fn prune(&self, device_id: &str) {
        // The session that just finished stays queryable
        let retain = self.config.retain_terminal_sessions.max(1);
        let mut by_device = self.by_device.write();
        let Some(ids) = by_device.get_mut(device_id) else {
            return;
        };
        let mut sessions = self.sessions.write();

        let terminal: Vec<&String> = ids
            .iter()
            .filter(|id| sessions.get(*id).map_or(true, |s| !s.snapshot().is_active()))
            .collect();
        if terminal.len() <= retain {
            return;
        }
        let excess: HashSet<String> = terminal[..terminal.len() - retain]
            .iter()
            .map(|id| id.to_string())
            .collect();

        ids.retain(|id| !excess.contains(id));
        for id in &excess {
            sessions.remove(id);
        }
        debug!(device_id = %device_id, pruned = excess.len(), "Session history pruned");
    }
}

/// Why a driver stopped before completing
enum Halt {
    /// The session was cancelled; nothing more to record
    Cancelled,
    Failed(EarthError),
}

impl From<EarthError> for Halt {
    fn from(err: EarthError) -> Self {
        Halt::Failed(err)
    }
}

struct SessionDriver {
    inner: Arc<Inner>,
    slot: Arc<SessionSlot>,
    package: UpdatePackage,
}

impl SessionDriver {
    async fn run(self) {
        let session = self.slot.snapshot();
        match self.pipeline(&session).await {
            Ok(device) => info!(version = %device.os_version, "Update session completed"),
            Err(Halt::Cancelled) => info!("Update session halted after cancellation"),
            Err(Halt::Failed(err)) => {
                let failed = self.slot.transition(&ACTIVE_STATES, |s| {
                    s.state = SessionState::Failed;
                    s.error = Some(SessionFailure::from(&err));
                });
                if failed {
                    warn!(kind = %err.kind(), error = %err, "Update session failed");
                }
            }
        }
        self.inner.prune(&session.device_id);
    }

    async fn pipeline(&self, session: &UpdateSession) -> Result<Device, Halt> {
        let (payload, digest) = self.download().await?;
        self.install_verified(session, payload, digest).await
    }

    /// Check a downloaded payload, install it and commit the target version.
    /// Expects the session in `verifying`.
    async fn install_verified(
        &self,
        session: &UpdateSession,
        payload: Bytes,
        digest: String,
    ) -> Result<Device, Halt> {
        if !IntegrityChecker::matches(&digest, &self.package.checksum) {
            debug!(bytes = payload.len(), "Discarding payload that failed verification");
            return Err(Halt::Failed(EarthError::ChecksumMismatch {
                expected: self.package.checksum.to_ascii_lowercase(),
                actual: digest,
            }));
        }

        let install_start = self.inner.config.install_progress_start;
        if !self.slot.transition(&[SessionState::Verifying], |s| {
            s.state = SessionState::Installing;
            s.progress = install_start;
        }) {
            return Err(Halt::Cancelled);
        }
        debug!(bytes = payload.len(), "Payload verified, installing");

        self.inner
            .installer
            .install(&session.device_id, &self.package, payload)
            .await
            .map_err(EarthError::from)?;

        let slot = self.slot.clone();
        let device = self
            .inner
            .registry
            .commit_version(&session.device_id, &session.target_version, move |_| {
                slot.transition(&[SessionState::Installing], |s| {
                    s.state = SessionState::Completed;
                    s.progress = 100.0;
                });
            })
            .await?;
        Ok(device)
    }

    /// Stream the payload, returning it with its SHA-256.
    /// Leaves the session in `verifying`.
    async fn download(&self) -> Result<(Bytes, String), Halt> {
        let url = &self.package.download_url;
        let mut stream = tokio::select! {
            biased;
            _ = self.slot.cancel.notified() => return Err(Halt::Cancelled),
            fetched = self.inner.transfer.fetch(url) => fetched.map_err(EarthError::from)?,
        };

        let total = self.package.size;
        let mut payload = BytesMut::with_capacity(total.min(MAX_PREALLOCATION) as usize);
        let mut digest = RunningChecksum::new();
        let mut logged_decile = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.slot.cancel.notified() => return Err(Halt::Cancelled),
                next = stream.next() => next,
            };
            let chunk = match next {
                None => break,
                Some(chunk) => chunk.map_err(EarthError::from)?,
            };

            digest.update(&chunk);
            payload.extend_from_slice(&chunk);
            let received = digest.len();
            if total > 0 && received > total {
                return Err(Halt::Failed(EarthError::Transfer(format!(
                    "Payload exceeds published size of {} bytes",
                    total
                ))));
            }

            let progress = percent(received, total);
            if !self.slot.transition(&[SessionState::Downloading], |s| {
                s.bytes_received = received;
                s.progress = s.progress.max(progress);
            }) {
                return Err(Halt::Cancelled);
            }

            let decile = (progress / 10.0) as u32;
            if decile > logged_decile {
                logged_decile = decile;
                debug!(received, total, progress, "Download progress");
            }
        }

        if !self.slot.transition(&[SessionState::Downloading], |s| {
            s.state = SessionState::Verifying;
            s.progress = 100.0;
        }) {
            return Err(Halt::Cancelled);
        }
        Ok((payload.freeze(), digest.finish()))
    }
}

fn percent(received: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (received as f64 / total as f64 * 100.0).min(100.0)
}
