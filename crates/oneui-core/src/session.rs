// ── Key session ──
//
// Runtime for one user's access keys: fetches relations and telemetry,
// keeps presence current, projects rows, and runs every write (single
// key changes, drag drops, server-side reorders) under the per-relation
// guards and the per-user reorder lock.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::PanelBackend;
use crate::command::{Command, CommandResult};
use crate::config::SessionConfig;
use crate::drag::{DragReorderController, DragState};
use crate::error::CoreError;
use crate::model::{
    AccessKeyRow, InboundId, PreviewDetail, RelationId, ReorderOutcome, ReorderPreview, UserId,
    UserInboundRelation,
};
use crate::presence_channel::{self, ChannelStatus, PresenceChannel, PresenceSource};
use crate::priority::{PriorityAssignment, validate_priority};
use crate::projection::ViewSpec;
use crate::reorder::{
    BulkReorderCoordinator, PatternReorderWorkflow, PendingReorder, QualityReorderWorkflow,
    ReorderKind, ReorderLock,
};
use crate::store::{
    DataSource, DataStore, Freshness, MutationGuards, MutationState,
};
use crate::stream::RowStream;

// ── KeySession ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Tracks at most one user at
/// a time; [`switch_user()`](Self::switch_user) drops everything belonging
/// to the previous user, including results still in flight.
pub struct KeySession<B> {
    inner: Arc<SessionInner<B>>,
}

impl<B> Clone for KeySession<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<B> {
    backend: Arc<B>,
    config: SessionConfig,
    store: Arc<DataStore>,
    /// Bumped on every start/stop. Fetch results tagged with an older
    /// generation are discarded.
    generation: AtomicU64,
    view: Mutex<ViewSpec>,
    drag: std::sync::Mutex<DragReorderController>,
    guards: MutationGuards,
    locks: ReorderLock,
    presence: Arc<PresenceChannel>,
    pattern: PatternReorderWorkflow<B>,
    quality: QualityReorderWorkflow<B>,
    pending: Mutex<Option<PendingReorder>>,
    cancel: CancellationToken,
    /// Child token for the current user, replaced on every start.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: PanelBackend> KeySession<B> {
    /// Create a session. Does not fetch anything until
    /// [`start()`](Self::start).
    pub fn new(backend: Arc<B>, config: SessionConfig) -> Self {
        Self::with_locks(backend, config, ReorderLock::new())
    }

    /// Create a session sharing reorder exclusion with other sessions or
    /// bulk coordinators.
    pub fn with_locks(backend: Arc<B>, config: SessionConfig, locks: ReorderLock) -> Self {
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(SessionInner {
                pattern: PatternReorderWorkflow::new(Arc::clone(&backend), locks.clone()),
                quality: QualityReorderWorkflow::new(Arc::clone(&backend), locks.clone()),
                backend,
                config,
                store: Arc::new(DataStore::new()),
                generation: AtomicU64::new(0),
                view: Mutex::new(ViewSpec::default()),
                drag: std::sync::Mutex::new(DragReorderController::new()),
                guards: MutationGuards::new(),
                locks,
                presence: Arc::new(PresenceChannel::new()),
                pending: Mutex::new(None),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn guards(&self) -> &MutationGuards {
        &self.inner.guards
    }

    pub fn reorder_lock(&self) -> &ReorderLock {
        &self.inner.locks
    }

    /// Bulk coordinator sharing this session's reorder lock.
    pub fn bulk(&self) -> BulkReorderCoordinator<B> {
        BulkReorderCoordinator::new(Arc::clone(&self.inner.backend), self.inner.locks.clone())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start tracking `user`.
    ///
    /// Fetches the user and its telemetry, then spawns the poll task (if
    /// the poll interval has a period) and the presence task. The initial
    /// fetch error is returned; after a transient failure the background
    /// tasks keep running and the session recovers on its own.
    pub async fn start(&self, user: UserId) -> Result<(), CoreError> {
        self.stop_tasks().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.store.reset(Some(user.clone()));
        self.inner.presence.reset();
        self.clear_interaction().await;

        let cancel = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = cancel.clone();
        info!(user = %user, poll = %self.inner.config.poll_interval, "key session started");

        if let Err(e) = self.refresh().await {
            if !e.is_transient() {
                self.inner.store.reset(None);
                return Err(e);
            }
            warn!(error = %e, "initial fetch failed, polling will retry");
            self.spawn_tasks(user, cancel).await;
            return Err(e);
        }

        if !self.spawn_tasks(user, cancel).await {
            if let Err(e) = self.refresh_presence().await {
                warn!(error = %e, "presence fetch failed");
            }
        }
        Ok(())
    }

    /// Stop tracking the current user and start tracking `user`.
    pub async fn switch_user(&self, user: UserId) -> Result<(), CoreError> {
        self.start(user).await
    }

    /// Cancel background tasks and forget the current user.
    pub async fn stop(&self) {
        self.stop_tasks().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.store.reset(None);
        self.inner.presence.reset();
        self.clear_interaction().await;
        debug!("key session stopped");
    }

    /// Start, run `f`, stop. No background tasks are spawned; presence is
    /// fetched once.
    ///
    /// `f` may fail with any error a [`CoreError`] converts into; the
    /// session is stopped either way.
    pub async fn oneshot<F, Fut, T, E>(
        backend: Arc<B>,
        config: SessionConfig,
        user: UserId,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(KeySession<B>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        let session = Self::new(backend, config.one_shot());
        session.start(user).await?;
        let result = f(session.clone()).await;
        session.stop().await;
        result
    }

    async fn stop_tasks(&self) {
        self.inner.cancel_child.lock().await.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    async fn clear_interaction(&self) {
        *self.inner.pending.lock().await = None;
        self.drag().finish();
    }

    /// Spawn background tasks. Returns whether a presence task is running.
    async fn spawn_tasks(&self, user: UserId, cancel: CancellationToken) -> bool {
        let config = &self.inner.config;
        let mut handles = self.inner.task_handles.lock().await;

        let period = config.poll_interval.period();
        if let Some(period) = period {
            handles.push(tokio::spawn(poll_task(self.clone(), period, cancel.clone())));
        }

        let presence = config.presence.live || period.is_some();
        if presence {
            handles.push(tokio::spawn(presence_channel::run(
                Arc::clone(&self.inner.backend),
                user,
                config.presence.clone(),
                Arc::clone(&self.inner.store),
                Arc::clone(&self.inner.presence),
                cancel,
            )));
        }
        presence
    }

    fn active_user(&self) -> Result<UserId, CoreError> {
        self.inner.store.current_user().ok_or(CoreError::NoActiveUser)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    /// Never held across an await.
    fn drag(&self) -> std::sync::MutexGuard<'_, DragReorderController> {
        self.inner.drag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Refetch the user's relations and (unless polling is off) its
    /// device telemetry.
    ///
    /// Returns `Ok(false)` when the session moved on to another user while
    /// the requests were in flight; their results are discarded. A failed
    /// telemetry fetch only marks telemetry stale.
    pub async fn refresh(&self) -> Result<bool, CoreError> {
        let user = self.active_user()?;
        let generation = self.inner.generation.load(Ordering::SeqCst);

        let detail = self.inner.backend.fetch_user(&user).await;
        if !self.is_current(generation) {
            debug!(user = %user, "discarding user fetch for inactive session");
            return Ok(false);
        }
        match detail {
            Ok(detail) => {
                self.inner.store.apply_user(detail);
            }
            Err(e) => {
                self.inner.store.mark_failed(DataSource::Relations, &e);
                return Err(e);
            }
        }

        if self.inner.config.poll_interval.telemetry_enabled() {
            let samples = self
                .inner
                .backend
                .fetch_devices(&user, self.inner.config.telemetry_window_minutes)
                .await;
            if !self.is_current(generation) {
                debug!(user = %user, "discarding telemetry for inactive session");
                return Ok(false);
            }
            match samples {
                Ok(samples) => {
                    self.inner.store.apply_telemetry(&user, samples);
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "telemetry fetch failed");
                    self.inner.store.mark_failed(DataSource::Telemetry, &e);
                }
            }
        }
        Ok(true)
    }

    /// One-off presence fetch, for sessions without a presence task.
    pub async fn refresh_presence(&self) -> Result<(), CoreError> {
        let user = self.active_user()?;
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let include_offline = self.inner.config.presence.include_offline;

        let result = self
            .inner
            .backend
            .fetch_presence(std::slice::from_ref(&user), include_offline)
            .await;
        if !self.is_current(generation) {
            return Ok(());
        }
        match result {
            Ok(snapshots) => {
                self.inner.store.apply_presence(&snapshots);
                Ok(())
            }
            Err(e) => {
                self.inner.store.mark_failed(DataSource::Presence, &e);
                Err(e)
            }
        }
    }

    async fn refetch_after_write(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "refetch after write failed");
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn current_user(&self) -> Option<UserId> {
        self.inner.store.current_user()
    }

    /// Projected rows in fetched order.
    pub fn rows(&self) -> Arc<Vec<AccessKeyRow>> {
        self.inner.store.rows()
    }

    /// Rows filtered and sorted by the current view.
    pub async fn view_rows(&self) -> Vec<AccessKeyRow> {
        let view = *self.inner.view.lock().await;
        view.apply(&self.inner.store.rows())
    }

    pub fn subscribe_rows(&self) -> RowStream {
        self.inner.store.subscribe_rows()
    }

    pub async fn view(&self) -> ViewSpec {
        *self.inner.view.lock().await
    }

    /// Change filter or sort. Any drag in progress is abandoned.
    pub async fn set_view(&self, view: ViewSpec) {
        *self.inner.view.lock().await = view;
        self.drag().cancel();
    }

    pub fn freshness(&self) -> Freshness {
        self.inner.store.freshness()
    }

    pub fn presence_status(&self) -> ChannelStatus {
        self.inner.presence.status()
    }

    pub fn subscribe_presence_status(&self) -> watch::Receiver<ChannelStatus> {
        self.inner.presence.subscribe_status()
    }

    pub fn presence_source(&self) -> PresenceSource {
        self.inner.presence.source()
    }

    pub fn drag_state(&self) -> DragState {
        self.drag().state()
    }

    /// The reorder currently running for the active user, if any.
    pub fn reorder_in_flight(&self) -> Option<ReorderKind> {
        self.inner
            .store
            .current_user()
            .and_then(|user| self.inner.locks.active(&user))
    }

    pub fn relation_state(&self, id: RelationId) -> MutationState {
        self.inner.guards.state(id)
    }

    /// Keys of the active user matching a configured pattern policy.
    pub fn pattern_matches(&self, pattern: &str) -> Result<Vec<RelationId>, CoreError> {
        let policy = self
            .inner
            .config
            .pattern(pattern)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "pattern".into(),
                identifier: pattern.into(),
            })?;
        let Some(user) = self.inner.store.user() else {
            return Ok(Vec::new());
        };
        Ok(user
            .relations
            .iter()
            .filter(|r| policy.matches_relation(r))
            .map(|r| r.id)
            .collect())
    }

    // ── Drag reorder ─────────────────────────────────────────────────

    /// Pick up a key. Refused while any reorder runs for the user or the
    /// view is not the full list in ascending priority order.
    pub async fn drag_begin(&self, source: RelationId) -> Result<(), CoreError> {
        let user = self.active_user()?;
        if self.inner.locks.is_locked(&user) {
            return Err(CoreError::ReorderInFlight {
                user_id: user.to_string(),
            });
        }
        if self.inner.store.relation(source).is_none() {
            return Err(CoreError::UnknownKey {
                identifier: source.to_string(),
            });
        }
        let view = *self.inner.view.lock().await;
        self.drag().begin(source, &view)
    }

    pub fn drag_hover(&self, target: Option<RelationId>) {
        self.drag().hover(target);
    }

    pub fn drag_cancel(&self) {
        self.drag().cancel();
    }

    /// Drop the dragged key onto `target` and submit the resulting batch.
    ///
    /// The drag state is back to idle when this returns, whatever the
    /// outcome, and also when the returned future is dropped mid-request.
    pub async fn drag_drop(&self, target: RelationId) -> Result<Vec<PriorityAssignment>, CoreError> {
        let user = self.active_user()?;
        let view = *self.inner.view.lock().await;
        let rows = view.apply(&self.inner.store.rows());
        let plan = self.drag().drop_on(
            target,
            &rows,
            &view,
            self.inner.config.priority_base,
        )?;
        let applying = DragFinish {
            drag: &self.inner.drag,
        };
        let result = self
            .submit_batch(&user, &plan.order, &plan.assignments)
            .await;
        drop(applying);
        result?;

        info!(user = %user, keys = plan.assignments.len(), "drag reorder applied");
        self.refetch_after_write().await;
        Ok(plan.assignments)
    }

    /// Drag `source` onto `target` in one call.
    pub async fn move_key(
        &self,
        source: RelationId,
        target: RelationId,
    ) -> Result<Vec<PriorityAssignment>, CoreError> {
        self.drag_begin(source).await?;
        self.drag_drop(target).await
    }

    async fn submit_batch(
        &self,
        user: &UserId,
        relations: &[RelationId],
        assignments: &[PriorityAssignment],
    ) -> Result<(), CoreError> {
        let _reorder = self.inner.locks.try_acquire(user, ReorderKind::Drag)?;
        let _leases = self
            .inner
            .guards
            .try_lease_all(relations, MutationState::Applying)?;
        self.inner
            .backend
            .reorder_relations(user, assignments)
            .await
    }

    // ── Command execution ────────────────────────────────────────────

    /// Execute a single-user write, then refetch.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let user = self.active_user()?;
        debug!(user = %user, command = cmd.name(), "executing command");

        match cmd {
            Command::ToggleRelation {
                inbound_id,
                enabled,
            } => {
                let relation = self.resolve(inbound_id)?;
                {
                    let _lease = self
                        .inner
                        .guards
                        .try_lease(relation.id, MutationState::Mutating)?;
                    self.inner
                        .backend
                        .set_relation_enabled(&user, inbound_id, enabled)
                        .await?;
                }
                info!(user = %user, inbound = %inbound_id, enabled, "key toggled");
                self.refetched(relation.id).await
            }
            Command::SetPriority {
                inbound_id,
                priority,
            } => {
                let priority = validate_priority(priority)?;
                let relation = self.resolve(inbound_id)?;
                {
                    let _lease = self
                        .inner
                        .guards
                        .try_lease(relation.id, MutationState::Mutating)?;
                    self.inner
                        .backend
                        .set_relation_priority(&user, inbound_id, priority)
                        .await?;
                }
                info!(user = %user, inbound = %inbound_id, priority, "priority set");
                self.refetched(relation.id).await
            }
            Command::BatchReorder { assignments } => {
                let relations = self.validate_batch(&assignments)?;
                self.submit_batch(&user, &relations, &assignments).await?;
                info!(user = %user, keys = assignments.len(), "batch reorder applied");
                self.refetch_after_write().await;
                Ok(CommandResult::Ok)
            }
            Command::RevokeDevice { fingerprint } => {
                let fingerprint = fingerprint.trim();
                if fingerprint.is_empty() {
                    return Err(CoreError::ValidationFailed {
                        message: "device fingerprint must not be empty".into(),
                    });
                }
                self.inner.backend.revoke_device(&user, fingerprint).await?;
                info!(user = %user, fingerprint, "device revoked");
                self.refetch_after_write().await;
                Ok(CommandResult::Ok)
            }
        }
    }

    pub async fn toggle(&self, inbound_id: InboundId, enabled: bool) -> Result<CommandResult, CoreError> {
        self.execute(Command::ToggleRelation {
            inbound_id,
            enabled,
        })
        .await
    }

    pub async fn set_priority(
        &self,
        inbound_id: InboundId,
        priority: i32,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::SetPriority {
            inbound_id,
            priority,
        })
        .await
    }

    pub async fn revoke_device(&self, fingerprint: &str) -> Result<CommandResult, CoreError> {
        self.execute(Command::RevokeDevice {
            fingerprint: fingerprint.into(),
        })
        .await
    }

    fn resolve(&self, inbound: InboundId) -> Result<UserInboundRelation, CoreError> {
        self.inner
            .store
            .relation_by_inbound(inbound)
            .ok_or_else(|| CoreError::UnknownKey {
                identifier: inbound.to_string(),
            })
    }

    async fn refetched(&self, id: RelationId) -> Result<CommandResult, CoreError> {
        self.refetch_after_write().await;
        Ok(self
            .inner
            .store
            .relation(id)
            .map_or(CommandResult::Ok, CommandResult::Relation))
    }

    /// Every key known, every priority in range, no inbound or priority
    /// repeated.
    fn validate_batch(&self, assignments: &[PriorityAssignment]) -> Result<Vec<RelationId>, CoreError> {
        if assignments.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "batch reorder needs at least one key".into(),
            });
        }
        let mut inbounds = HashSet::new();
        let mut priorities = HashSet::new();
        let mut relations = Vec::with_capacity(assignments.len());
        for a in assignments {
            validate_priority(a.priority)?;
            if !inbounds.insert(a.inbound_id) {
                return Err(CoreError::ValidationFailed {
                    message: format!("inbound {} appears twice in the batch", a.inbound_id),
                });
            }
            if !priorities.insert(a.priority) {
                return Err(CoreError::ValidationFailed {
                    message: format!("priority {} assigned twice in the batch", a.priority),
                });
            }
            relations.push(self.resolve(a.inbound_id)?.id);
        }
        Ok(relations)
    }

    // ── Server-side reorders ─────────────────────────────────────────

    /// Dry-run a pattern reorder and hold the preview for confirmation.
    pub async fn preview_pattern(&self, pattern: &str) -> Result<ReorderPreview, CoreError> {
        let user = self.active_user()?;
        self.ensure_not_dragging(&user)?;
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let pending = self.inner.pattern.preview(&user, pattern).await?;
        Ok(self.hold(pending, generation).await)
    }

    /// Dry-run a quality reorder and hold the preview for confirmation.
    /// `None` uses the configured window.
    pub async fn preview_quality(&self, window_minutes: Option<u32>) -> Result<ReorderPreview, CoreError> {
        let user = self.active_user()?;
        self.ensure_not_dragging(&user)?;
        let window = window_minutes.unwrap_or(self.inner.config.quality_window_minutes);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let pending = self.inner.quality.preview(&user, window).await?;
        Ok(self.hold(pending, generation).await)
    }

    /// The preview awaiting confirmation, if any.
    pub async fn active_preview(&self) -> Option<ReorderPreview> {
        self.inner
            .pending
            .lock()
            .await
            .as_ref()
            .map(|p| p.preview().clone())
    }

    /// Drop the held preview. Returns whether there was one.
    pub async fn cancel_reorder(&self) -> bool {
        self.inner.pending.lock().await.take().is_some()
    }

    /// Apply the held preview. The panel recomputes the order.
    ///
    /// The preview stays held until the apply succeeds: it is still visible
    /// while the request runs, and a failed or abandoned confirm leaves it
    /// in place for a retry or cancel.
    pub async fn confirm_reorder(&self) -> Result<ReorderOutcome, CoreError> {
        let user = self.active_user()?;
        self.ensure_not_dragging(&user)?;
        let pending = self
            .inner
            .pending
            .lock()
            .await
            .clone()
            .ok_or(CoreError::NoPendingPreview)?;
        if *pending.user_id() != user {
            return Err(CoreError::NoPendingPreview);
        }

        let outcome = match pending.preview().detail {
            PreviewDetail::Pattern { .. } => self.inner.pattern.apply(&pending).await,
            PreviewDetail::Quality { .. } => self.inner.quality.apply(&pending).await,
        }?;

        {
            let mut slot = self.inner.pending.lock().await;
            if slot.as_ref() == Some(&pending) {
                *slot = None;
            }
        }
        self.refetch_after_write().await;
        Ok(outcome)
    }

    fn ensure_not_dragging(&self, user: &UserId) -> Result<(), CoreError> {
        if self.drag().is_applying() {
            return Err(CoreError::ReorderInFlight {
                user_id: user.to_string(),
            });
        }
        Ok(())
    }

    async fn hold(&self, pending: PendingReorder, generation: u64) -> ReorderPreview {
        let preview = pending.preview().clone();
        if self.is_current(generation) {
            *self.inner.pending.lock().await = Some(pending);
        } else {
            debug!(user = %preview.user_id, "discarding preview for inactive session");
        }
        preview
    }
}

/// Returns the drag controller to idle when dropped, so an abandoned
/// drop future cannot leave the session stuck in `Applying`.
struct DragFinish<'a> {
    drag: &'a std::sync::Mutex<DragReorderController>,
}

impl Drop for DragFinish<'_> {
    fn drop(&mut self) {
        self.drag
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish();
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodically refetch relations and telemetry.
async fn poll_task<B: PanelBackend>(
    session: KeySession<B>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = session.refresh().await {
                    warn!(error = %e, "periodic refresh failed");
                }
            }
        }
    }
}
