//! The attempt registry and its timed-window resolver.
//!
//! Each arena moves through `NONE -> ACTIVE -> {BLOCKED, RESOLVED, CANCELLED}
//! -> NONE`. Every transition out of ACTIVE happens under the arena's map
//! entry lock and is keyed on the attempt id, so a block racing the
//! resolution timer is decided exactly once: the loser finds the slot gone
//! or holding a different attempt and does nothing.
//!
//! # Timing
//!
//! Windows are measured on the monotonic [`tokio::time::Instant`] clock.
//! The timer task sleeps until the deadline and then resolves the attempt
//! it was armed for. The deadline is also checked by every call that
//! changes the arena: a `block`, `cancel`, or `start` that finds an elapsed
//! attempt resolves it on the spot. `query` only reads. It reports an
//! elapsed attempt as absent and leaves the resolution to the timer or the
//! next mutating call, so a late timer never leaves a stale attempt
//! observable and a read never runs the handler.
//!
//! An expired attempt leaves a tombstone in its arena until the next
//! `start`, which is how `block` can report `AlreadyExpired` whether or not
//! the timer got there first.
//!
//! # Opening
//!
//! `start` claims the arena with an `Opening` marker and releases the map
//! entry before debiting the cost, so the ledger commit (and its journal
//! write) never runs under a map shard lock. Only the claiming `start`
//! replaces the marker. Every other call treats it as an empty arena,
//! except a second `start`, which is rejected with `AlreadyActive`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use feud_ledger::Ledger;
use feud_types::{ArenaId, Attempt, AttemptId, AttemptStatus, SubjectId};

use crate::error::AttemptError;
use crate::handler::ResolutionHandler;

/// Ledger reason for the cost debited at start.
pub const COST_REASON: &str = "attempt cost";

/// Ledger reason for a cost credited back.
pub const REFUND_REASON: &str = "attempt cost refund";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Registry-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Distinct defenders needed to block an attempt. Values below 1 count as 1.
    pub defenders_required: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            defenders_required: 1,
        }
    }
}

impl RegistryConfig {
    const fn quorum(self) -> u32 {
        if self.defenders_required == 0 {
            1
        } else {
            self.defenders_required
        }
    }

    fn quorum_reached(self, defenders: usize) -> bool {
        u32::try_from(defenders).map_or(true, |count| count >= self.quorum())
    }
}

/// Parameters of a new attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// The arena to occupy.
    pub arena: ArenaId,
    /// Who launches the attempt and pays its cost.
    pub initiator: SubjectId,
    /// Who the attempt is aimed at.
    pub target: SubjectId,
    /// Points debited from the initiator. Must be positive.
    pub cost: i64,
    /// Counter window in milliseconds. Must be positive.
    pub window_ms: u64,
}

/// The result of a successful [`AttemptRegistry::block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The defender was recorded but the quorum is not yet met. The attempt
    /// is still active and its timer still armed.
    Pending {
        /// Snapshot after the defender was added.
        attempt: Attempt,
    },
    /// The quorum was met. The attempt is blocked and the arena is free.
    Blocked {
        /// Snapshot with status `Blocked`.
        attempt: Attempt,
        /// Every defender, in blocking order.
        defenders: Vec<SubjectId>,
    },
}

impl BlockOutcome {
    /// The attempt snapshot carried by either variant.
    pub const fn attempt(&self) -> &Attempt {
        match self {
            Self::Pending { attempt } | Self::Blocked { attempt, .. } => attempt,
        }
    }

    /// Whether this block completed the quorum.
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Aborts the resolution timer when the live attempt is dropped.
#[derive(Debug)]
struct TimerGuard(AbortHandle);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
struct LiveAttempt {
    attempt: Attempt,
    deadline: Instant,
    _timer: TimerGuard,
}

/// A debited attempt waiting to be placed in its arena.
#[derive(Debug)]
struct Prepared {
    attempt: Attempt,
    deadline: Instant,
    runtime: Handle,
}

#[derive(Debug)]
enum Slot {
    /// A `start` has claimed the arena and is debiting the cost.
    Opening,
    Live(Box<LiveAttempt>),
    /// The arena's last attempt ran out its window.
    Expired(AttemptId),
}

/// Swap a live attempt for its tombstone, returning the live attempt.
fn retire(slot: &mut Slot) -> Option<Box<LiveAttempt>> {
    let Slot::Live(live) = slot else {
        return None;
    };
    let tombstone = Slot::Expired(live.attempt.id);
    match std::mem::replace(slot, tombstone) {
        Slot::Live(live) => Some(live),
        Slot::Opening | Slot::Expired(_) => None,
    }
}

/// Retire the slot's attempt if its window has closed.
fn retire_if_elapsed(slot: &mut Slot, now: Instant) -> Option<Box<LiveAttempt>> {
    let elapsed = matches!(slot, Slot::Live(live) if now >= live.deadline);
    if elapsed {
        retire(slot)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Inner {
    arenas: DashMap<ArenaId, Slot>,
    ledger: Arc<Ledger>,
    handler: Arc<dyn ResolutionHandler>,
    config: RegistryConfig,
}

/// Tracks at most one active attempt per arena.
///
/// Cheap to clone; clones share the same arenas.
#[derive(Clone)]
pub struct AttemptRegistry {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for AttemptRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttemptRegistry")
            .field("arenas", &self.inner.arenas.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl AttemptRegistry {
    /// Create a registry that debits costs from `ledger` and reports
    /// expirations to `handler`.
    pub fn new(
        ledger: Arc<Ledger>,
        handler: Arc<dyn ResolutionHandler>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                arenas: DashMap::new(),
                ledger,
                handler,
                config,
            }),
        }
    }

    /// The registry's settings.
    pub fn config(&self) -> RegistryConfig {
        self.inner.config
    }

    /// Open an attempt in an empty arena.
    ///
    /// Debits the cost from the initiator and arms the resolution timer.
    /// If the debit fails nothing is created. If the timer cannot be armed
    /// the debit is credited back before the error is returned.
    pub fn start(&self, request: StartRequest) -> Result<Attempt, AttemptError> {
        if request.cost <= 0 {
            return Err(AttemptError::InvalidAmount { cost: request.cost });
        }
        if request.window_ms == 0 {
            return Err(AttemptError::InvalidWindow);
        }
        if request.initiator == request.target {
            return Err(AttemptError::SelfTarget {
                subject: request.initiator,
            });
        }

        self.claim(&request.arena)?;
        match self.inner.prepare(&request) {
            Ok(prepared) => Ok(self.inner.activate(prepared)),
            Err(err) => {
                self.inner
                    .arenas
                    .remove_if(&request.arena, |_, slot| matches!(slot, Slot::Opening));
                Err(err)
            }
        }
    }

    /// Mark an empty arena as opening, resolving an elapsed attempt first.
    fn claim(&self, arena: &ArenaId) -> Result<(), AttemptError> {
        loop {
            let now = Instant::now();
            match self.inner.arenas.entry(arena.clone()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(Slot::Opening);
                    return Ok(());
                }
                Entry::Occupied(mut occupied) => {
                    if let Some(expired) = retire_if_elapsed(occupied.get_mut(), now) {
                        drop(occupied);
                        self.inner.finish_expired(expired);
                        continue;
                    }
                    if matches!(occupied.get(), Slot::Expired(_)) {
                        occupied.insert(Slot::Opening);
                        return Ok(());
                    }
                    return Err(AttemptError::AlreadyActive {
                        arena: arena.clone(),
                    });
                }
            }
        }
    }

    /// Record `defender` against the arena's active attempt.
    ///
    /// Once the quorum is met the attempt is blocked, its timer cancelled,
    /// and the arena freed. The initiator is never refunded.
    pub fn block(
        &self,
        arena: &ArenaId,
        defender: &SubjectId,
    ) -> Result<BlockOutcome, AttemptError> {
        let now = Instant::now();
        let Entry::Occupied(mut occupied) = self.inner.arenas.entry(arena.clone()) else {
            return Err(AttemptError::NoActiveAttempt {
                arena: arena.clone(),
            });
        };

        if let Some(expired) = retire_if_elapsed(occupied.get_mut(), now) {
            drop(occupied);
            self.inner.finish_expired(expired);
            return Err(AttemptError::AlreadyExpired {
                arena: arena.clone(),
            });
        }

        let live = match occupied.get_mut() {
            Slot::Live(live) => live,
            Slot::Opening => {
                return Err(AttemptError::NoActiveAttempt {
                    arena: arena.clone(),
                });
            }
            Slot::Expired(resolved) => {
                debug!(arena = %arena, attempt_id = %resolved, "Block arrived after resolution");
                return Err(AttemptError::AlreadyExpired {
                    arena: arena.clone(),
                });
            }
        };
        let attempt = &mut live.attempt;
        if attempt.initiator == *defender {
            return Err(AttemptError::InitiatorCannotDefend {
                subject: defender.clone(),
            });
        }
        if attempt.is_defender(defender) {
            return Err(AttemptError::AlreadyBlocked {
                arena: arena.clone(),
                defender: defender.clone(),
            });
        }
        attempt.defenders.push(defender.clone());

        if !self.inner.config.quorum_reached(attempt.defenders.len()) {
            debug!(
                arena = %arena,
                defender = %defender,
                defenders = attempt.defenders.len(),
                required = self.inner.config.quorum(),
                "Defender recorded, quorum pending"
            );
            return Ok(BlockOutcome::Pending {
                attempt: attempt.clone(),
            });
        }

        let Slot::Live(live) = occupied.remove() else {
            return Err(AttemptError::NoActiveAttempt {
                arena: arena.clone(),
            });
        };
        let LiveAttempt { mut attempt, .. } = *live;
        attempt.status = AttemptStatus::Blocked;

        info!(
            arena = %arena,
            attempt_id = %attempt.id,
            initiator = %attempt.initiator,
            defenders = attempt.defenders.len(),
            "Attempt blocked"
        );
        Ok(BlockOutcome::Blocked {
            defenders: attempt.defenders.clone(),
            attempt,
        })
    }

    /// Withdraw the arena's active attempt without applying any consequence.
    ///
    /// The cost is not refunded here; that is the caller's decision.
    pub fn cancel(&self, arena: &ArenaId) -> Result<Attempt, AttemptError> {
        let now = Instant::now();
        let Entry::Occupied(mut occupied) = self.inner.arenas.entry(arena.clone()) else {
            return Err(AttemptError::NoActiveAttempt {
                arena: arena.clone(),
            });
        };

        if let Some(expired) = retire_if_elapsed(occupied.get_mut(), now) {
            drop(occupied);
            self.inner.finish_expired(expired);
            return Err(AttemptError::AlreadyExpired {
                arena: arena.clone(),
            });
        }
        match occupied.get() {
            Slot::Live(_) => {}
            Slot::Opening => {
                return Err(AttemptError::NoActiveAttempt {
                    arena: arena.clone(),
                });
            }
            Slot::Expired(_) => {
                return Err(AttemptError::AlreadyExpired {
                    arena: arena.clone(),
                });
            }
        }

        let Slot::Live(live) = occupied.remove() else {
            return Err(AttemptError::NoActiveAttempt {
                arena: arena.clone(),
            });
        };
        let LiveAttempt { mut attempt, .. } = *live;
        attempt.status = AttemptStatus::Cancelled;

        info!(arena = %arena, attempt_id = %attempt.id, "Attempt cancelled");
        Ok(attempt)
    }

    /// Snapshot of the arena's active attempt, if any.
    ///
    /// Read-only: an attempt whose window has closed is reported as absent
    /// but is left for its timer (or the next `block`, `cancel`, or
    /// `start`) to resolve.
    pub fn query(&self, arena: &ArenaId) -> Option<Attempt> {
        let now = Instant::now();
        let slot = self.inner.arenas.get(arena)?;
        match slot.value() {
            Slot::Live(live) if now < live.deadline => Some(live.attempt.clone()),
            Slot::Live(_) | Slot::Opening | Slot::Expired(_) => None,
        }
    }

    /// Number of arenas holding an active attempt.
    pub fn active_count(&self) -> usize {
        self.inner
            .arenas
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Live(_)))
            .count()
    }

    /// Arenas holding an active attempt, sorted.
    pub fn active_arenas(&self) -> Vec<ArenaId> {
        let mut arenas: Vec<ArenaId> = self
            .inner
            .arenas
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Live(_)))
            .map(|slot| slot.key().clone())
            .collect();
        arenas.sort();
        arenas
    }

    /// Resolve every attempt whose window has closed but whose timer has
    /// not yet run. Returns how many were resolved.
    pub fn resolve_elapsed(&self) -> usize {
        let now = Instant::now();
        let elapsed: Vec<(ArenaId, AttemptId)> = self
            .inner
            .arenas
            .iter()
            .filter_map(|slot| match slot.value() {
                Slot::Live(live) if now >= live.deadline => {
                    Some((slot.key().clone(), live.attempt.id))
                }
                _ => None,
            })
            .collect();

        elapsed
            .iter()
            .filter(|(arena, id)| self.inner.resolve_expired(arena, *id))
            .count()
    }
}

impl Inner {
    /// Debit the cost and build the attempt.
    ///
    /// Called with no map entry held; the arena carries an `Opening` marker.
    fn prepare(&self, request: &StartRequest) -> Result<Prepared, AttemptError> {
        let deadline = Instant::now()
            .checked_add(Duration::from_millis(request.window_ms))
            .ok_or(AttemptError::InvalidWindow)?;

        self.ledger.redeem(
            &request.initiator,
            request.cost,
            Some(&request.target),
            COST_REASON,
        )?;

        let attempt = Attempt {
            id: AttemptId::new(),
            arena: request.arena.clone(),
            initiator: request.initiator.clone(),
            target: request.target.clone(),
            cost: request.cost,
            started_at: Utc::now(),
            window_ms: request.window_ms,
            defenders: Vec::new(),
            defenders_required: self.config.quorum(),
            status: AttemptStatus::Active,
        };

        let Ok(runtime) = Handle::try_current() else {
            self.refund(&attempt);
            return Err(AttemptError::RuntimeUnavailable);
        };

        Ok(Prepared {
            attempt,
            deadline,
            runtime,
        })
    }

    /// Arm the timer and swap the arena's `Opening` marker for the attempt.
    ///
    /// The timer is spawned while the entry is held, so it cannot look for
    /// the attempt before it is in place.
    fn activate(self: &Arc<Self>, prepared: Prepared) -> Attempt {
        let Prepared {
            attempt,
            deadline,
            runtime,
        } = prepared;

        let snapshot = attempt.clone();
        {
            let mut slot = self
                .arenas
                .entry(attempt.arena.clone())
                .or_insert(Slot::Opening);

            let registry: Weak<Self> = Arc::downgrade(self);
            let arena = attempt.arena.clone();
            let attempt_id = attempt.id;
            let task = runtime.spawn(async move {
                tokio::time::sleep_until(deadline).await;
                if let Some(inner) = registry.upgrade() {
                    inner.resolve_expired(&arena, attempt_id);
                }
            });

            *slot = Slot::Live(Box::new(LiveAttempt {
                attempt,
                deadline,
                _timer: TimerGuard(task.abort_handle()),
            }));
        }

        info!(
            arena = %snapshot.arena,
            attempt_id = %snapshot.id,
            initiator = %snapshot.initiator,
            target_id = %snapshot.target,
            cost = snapshot.cost,
            window_ms = snapshot.window_ms,
            "Attempt started"
        );
        snapshot
    }

    /// Resolve attempt `id` in `arena` if it is still the live attempt there.
    fn resolve_expired(&self, arena: &ArenaId, id: AttemptId) -> bool {
        let expired = {
            let Some(mut slot) = self.arenas.get_mut(arena) else {
                return false;
            };
            let current = matches!(&*slot, Slot::Live(live) if live.attempt.id == id);
            if current {
                retire(&mut slot)
            } else {
                None
            }
        };

        match expired {
            Some(live) => {
                self.finish_expired(live);
                true
            }
            None => {
                debug!(arena = %arena, attempt_id = %id, "Stale resolution ignored");
                false
            }
        }
    }

    /// Mark a retired attempt resolved and run the handler. No lock is held.
    fn finish_expired(&self, live: Box<LiveAttempt>) -> Attempt {
        let LiveAttempt { mut attempt, .. } = *live;
        attempt.status = AttemptStatus::Resolved;

        info!(
            arena = %attempt.arena,
            attempt_id = %attempt.id,
            initiator = %attempt.initiator,
            target_id = %attempt.target,
            "Attempt resolved after window"
        );

        match catch_unwind(AssertUnwindSafe(|| self.handler.on_expired(&attempt))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(
                    arena = %attempt.arena,
                    attempt_id = %attempt.id,
                    error = %err,
                    "Resolution handler failed"
                );
            }
            Err(_) => {
                error!(
                    arena = %attempt.arena,
                    attempt_id = %attempt.id,
                    "Resolution handler panicked"
                );
            }
        }
        attempt
    }

    fn refund(&self, attempt: &Attempt) {
        if let Err(err) = self.ledger.record(
            &attempt.initiator,
            attempt.cost,
            Some(&attempt.target),
            REFUND_REASON,
        ) {
            error!(
                initiator = %attempt.initiator,
                cost = attempt.cost,
                error = %err,
                "Failed to refund attempt cost"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::OnceLock;

    use parking_lot::Mutex;

    use feud_ledger::{Journal, JournalError, LedgerError};
    use feud_types::Transaction;

    use super::*;
    use crate::handler::{HandlerError, NoOpHandler};

    #[derive(Debug, Default)]
    struct RecordingHandler {
        expired: Mutex<Vec<Attempt>>,
    }

    impl RecordingHandler {
        fn count(&self) -> usize {
            self.expired.lock().len()
        }
    }

    impl ResolutionHandler for RecordingHandler {
        fn on_expired(&self, attempt: &Attempt) -> Result<(), HandlerError> {
            self.expired.lock().push(attempt.clone());
            Ok(())
        }
    }

    struct FailingHandler;

    impl ResolutionHandler for FailingHandler {
        fn on_expired(&self, _attempt: &Attempt) -> Result<(), HandlerError> {
            Err("consequence rejected".into())
        }
    }

    struct PanickingHandler;

    impl ResolutionHandler for PanickingHandler {
        fn on_expired(&self, _attempt: &Attempt) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    /// Looks at arena `A` from inside every ledger commit.
    #[derive(Debug, Default)]
    struct WatchingJournal {
        registry: OnceLock<AttemptRegistry>,
        seen: Mutex<Vec<(bool, bool)>>,
    }

    impl Journal for WatchingJournal {
        fn append(&self, _entries: &[Transaction]) -> Result<(), JournalError> {
            if let Some(registry) = self.registry.get() {
                let visible = registry.query(&arena("A")).is_some();
                let mut rival = request("A", 1, 100);
                rival.initiator = SubjectId::new("r");
                let rejected = matches!(
                    registry.start(rival),
                    Err(AttemptError::AlreadyActive { .. })
                );
                self.seen.lock().push((visible, rejected));
            }
            Ok(())
        }
    }

    fn s() -> SubjectId {
        SubjectId::new("s")
    }

    fn arena(name: &str) -> ArenaId {
        ArenaId::new(name)
    }

    fn request(arena_name: &str, cost: i64, window_ms: u64) -> StartRequest {
        StartRequest {
            arena: arena(arena_name),
            initiator: s(),
            target: SubjectId::new("t"),
            cost,
            window_ms,
        }
    }

    fn registry_with(
        handler: Arc<dyn ResolutionHandler>,
        config: RegistryConfig,
    ) -> (Arc<Ledger>, AttemptRegistry) {
        let ledger = Arc::new(Ledger::new());
        ledger.record(&s(), 1000, None, "seed").unwrap();
        let registry = AttemptRegistry::new(Arc::clone(&ledger), handler, config);
        (ledger, registry)
    }

    fn recording() -> (Arc<RecordingHandler>, Arc<Ledger>, AttemptRegistry) {
        let handler = Arc::new(RecordingHandler::default());
        let (ledger, registry) = registry_with(handler.clone(), RegistryConfig::default());
        (handler, ledger, registry)
    }

    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_debits_cost_and_occupies_arena() {
        let (_, ledger, registry) = recording();
        let attempt = registry.start(request("A", 100, 60_000)).unwrap();

        assert_eq!(attempt.status, AttemptStatus::Active);
        assert_eq!(attempt.defenders_required, 1);
        assert_eq!(ledger.balance(&s()), 900);
        assert_eq!(registry.query(&arena("A")), Some(attempt));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.active_arenas(), vec![arena("A")]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_in_same_arena_is_rejected() {
        let (_, ledger, registry) = recording();
        registry.start(request("A", 100, 60_000)).unwrap();

        let err = registry.start(request("A", 100, 60_000)).unwrap_err();
        assert!(matches!(err, AttemptError::AlreadyActive { .. }));
        assert_eq!(ledger.balance(&s()), 900);

        // Other arenas are unaffected.
        registry.start(request("B", 100, 60_000)).unwrap();
        assert_eq!(registry.active_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn block_inside_window_wins_over_timer() {
        let (handler, ledger, registry) = recording();
        registry.start(request("A", 100, 100)).unwrap();

        advance_ms(50).await;
        let outcome = registry.block(&arena("A"), &SubjectId::new("d")).unwrap();
        let BlockOutcome::Blocked { attempt, defenders } = outcome else {
            panic!("expected blocked outcome");
        };
        assert_eq!(attempt.status, AttemptStatus::Blocked);
        assert_eq!(defenders, vec![SubjectId::new("d")]);

        advance_ms(51).await;
        assert_eq!(handler.count(), 0);
        assert!(registry.query(&arena("A")).is_none());
        assert_eq!(ledger.balance(&s()), 900);
    }

    #[tokio::test(start_paused = true)]
    async fn block_after_window_is_expired_and_resolves_once() {
        let (handler, _, registry) = recording();
        registry.start(request("A", 100, 100)).unwrap();

        tokio::time::advance(Duration::from_millis(101)).await;
        let err = registry.block(&arena("A"), &SubjectId::new("d")).unwrap_err();
        assert!(matches!(err, AttemptError::AlreadyExpired { .. }));

        tokio::task::yield_now().await;
        assert_eq!(handler.count(), 1);

        let again = registry.block(&arena("A"), &SubjectId::new("d")).unwrap_err();
        assert!(matches!(again, AttemptError::AlreadyExpired { .. }));
        assert_eq!(handler.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_resolves_unblocked_attempt() {
        let (handler, _, registry) = recording();
        let started = registry.start(request("A", 100, 100)).unwrap();

        advance_ms(101).await;
        let resolved = handler.expired.lock().clone();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.first().map(|a| a.id), Some(started.id));
        assert_eq!(resolved.first().map(|a| a.status), Some(AttemptStatus::Resolved));
        assert!(registry.query(&arena("A")).is_none());
        assert_eq!(registry.active_count(), 0);

        // The arena can be reused.
        registry.start(request("A", 100, 100)).unwrap();
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_resolution_never_touches_newer_attempt() {
        let (handler, _, registry) = recording();
        let first = registry.start(request("A", 100, 100)).unwrap();

        advance_ms(10).await;
        registry.cancel(&arena("A")).unwrap();
        let second = registry.start(request("A", 100, 100)).unwrap();

        assert!(!registry.inner.resolve_expired(&arena("A"), first.id));
        assert_eq!(registry.query(&arena("A")).map(|a| a.id), Some(second.id));

        // Past the first attempt's deadline, before the second's.
        advance_ms(95).await;
        assert_eq!(handler.count(), 0);
        assert_eq!(registry.query(&arena("A")).map(|a| a.id), Some(second.id));

        advance_ms(10).await;
        assert_eq!(handler.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quorum_requires_distinct_defenders() {
        let handler = Arc::new(RecordingHandler::default());
        let (_, registry) = registry_with(
            handler.clone(),
            RegistryConfig {
                defenders_required: 2,
            },
        );
        registry.start(request("A", 100, 1000)).unwrap();
        let d1 = SubjectId::new("d1");
        let d2 = SubjectId::new("d2");

        let first = registry.block(&arena("A"), &d1).unwrap();
        assert!(!first.is_blocked());
        assert_eq!(first.attempt().status, AttemptStatus::Active);
        assert_eq!(registry.active_count(), 1);

        let repeat = registry.block(&arena("A"), &d1).unwrap_err();
        assert!(matches!(repeat, AttemptError::AlreadyBlocked { .. }));

        let second = registry.block(&arena("A"), &d2).unwrap();
        let BlockOutcome::Blocked { defenders, .. } = second else {
            panic!("expected blocked outcome");
        };
        assert_eq!(defenders, vec![d1, d2]);
        assert_eq!(registry.active_count(), 0);

        advance_ms(1001).await;
        assert_eq!(handler.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn initiator_cannot_defend() {
        let (_, _, registry) = recording();
        registry.start(request("A", 100, 1000)).unwrap();
        let err = registry.block(&arena("A"), &s()).unwrap_err();
        assert!(matches!(err, AttemptError::InitiatorCannotDefend { .. }));
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn block_on_empty_arena_is_not_found() {
        let (_, _, registry) = recording();
        let err = registry.block(&arena("A"), &SubjectId::new("d")).unwrap_err();
        assert!(matches!(err, AttemptError::NoActiveAttempt { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_without_consequence() {
        let (handler, ledger, registry) = recording();
        registry.start(request("A", 100, 100)).unwrap();

        let cancelled = registry.cancel(&arena("A")).unwrap();
        assert_eq!(cancelled.status, AttemptStatus::Cancelled);
        assert!(registry.query(&arena("A")).is_none());

        advance_ms(200).await;
        assert_eq!(handler.count(), 0);
        assert_eq!(ledger.balance(&s()), 900);
        assert!(matches!(
            registry.cancel(&arena("A")),
            Err(AttemptError::NoActiveAttempt { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn handler_error_still_clears_arena() {
        let (_, registry) = registry_with(Arc::new(FailingHandler), RegistryConfig::default());
        registry.start(request("A", 100, 100)).unwrap();

        advance_ms(101).await;
        assert_eq!(registry.active_count(), 0);
        assert!(registry.start(request("A", 100, 100)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_panic_still_clears_arena() {
        let (_, registry) = registry_with(Arc::new(PanickingHandler), RegistryConfig::default());
        registry.start(request("A", 100, 100)).unwrap();

        advance_ms(101).await;
        assert!(registry.query(&arena("A")).is_none());
        assert!(registry.start(request("A", 100, 100)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_funds_leaves_no_partial_state() {
        let (_, ledger, registry) = recording();
        let err = registry.start(request("A", 1001, 100)).unwrap_err();

        assert!(matches!(
            err,
            AttemptError::Ledger {
                source: LedgerError::InsufficientFunds { .. }
            }
        ));
        assert_eq!(err.category(), feud_types::ErrorCategory::InsufficientResource);
        assert_eq!(ledger.balance(&s()), 1000);
        assert!(registry.query(&arena("A")).is_none());
        assert_eq!(registry.active_count(), 0);

        // The arena is not left claimed.
        registry.start(request("A", 100, 100)).unwrap();
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_requests_rejected() {
        let (_, ledger, registry) = recording();
        assert!(matches!(
            registry.start(request("A", 0, 100)),
            Err(AttemptError::InvalidAmount { cost: 0 })
        ));
        assert!(matches!(
            registry.start(request("A", 10, 0)),
            Err(AttemptError::InvalidWindow)
        ));
        let mut own = request("A", 10, 100);
        own.target = s();
        assert!(matches!(
            registry.start(own),
            Err(AttemptError::SelfTarget { .. })
        ));
        assert_eq!(ledger.balance(&s()), 1000);
    }

    #[test]
    fn start_without_runtime_refunds_cost() {
        let (ledger, registry) = registry_with(Arc::new(NoOpHandler), RegistryConfig::default());
        let err = registry.start(request("A", 100, 100)).unwrap_err();

        assert!(matches!(err, AttemptError::RuntimeUnavailable));
        assert_eq!(ledger.balance(&s()), 1000);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(
            ledger.history(&s(), 1).first().map(|e| e.reason.as_str()),
            Some(REFUND_REASON)
        );
    }

    #[tokio::test]
    async fn query_after_deadline_leaves_resolution_to_timer() {
        let (handler, _, registry) = recording();
        registry.start(request("A", 100, 1)).unwrap();

        // Block the only runtime thread so the timer cannot run.
        std::thread::sleep(Duration::from_millis(20));
        assert!(registry.query(&arena("A")).is_none());
        assert!(registry.query(&arena("A")).is_none());
        assert_eq!(handler.count(), 0);
        assert_eq!(registry.active_count(), 1);

        advance_ms(10).await;
        assert_eq!(handler.count(), 1);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cost_is_debited_without_holding_the_arena() {
        let journal = Arc::new(WatchingJournal::default());
        let ledger = Arc::new(Ledger::with_journal(journal.clone()));
        ledger.record(&s(), 1000, None, "seed").unwrap();
        let registry = AttemptRegistry::new(
            Arc::clone(&ledger),
            Arc::new(NoOpHandler),
            RegistryConfig::default(),
        );
        journal.registry.set(registry.clone()).unwrap();

        let attempt = registry.start(request("A", 100, 100)).unwrap();

        // During the debit the arena reads as empty but cannot be taken.
        assert_eq!(journal.seen.lock().clone(), vec![(false, true)]);
        assert_eq!(registry.query(&arena("A")).map(|a| a.id), Some(attempt.id));
        assert!(matches!(
            registry.block(&arena("A"), &SubjectId::new("d")),
            Ok(BlockOutcome::Blocked { .. })
        ));
        assert_eq!(ledger.balance(&s()), 900);
        assert_eq!(ledger.balance(&SubjectId::new("r")), 0);
    }
}
