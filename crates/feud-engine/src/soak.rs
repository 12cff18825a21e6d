//! The soak run: many participants playing at random against one economy.
//!
//! Each participant is a tokio task with its own seeded [`StdRng`], so a
//! run is reproducible up to scheduling. Rejected operations (not enough
//! points, an arena already taken, an expired window) are the normal case
//! and are only counted. Once the participants stop, the harness waits out
//! the longest window and audits the economy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{error, info, warn};

use feud_core::config::SoakConfig;
use feud_core::{Economy, EconomyError, Raid};
use feud_ledger::{AuditResult, read_json_lines};
use feud_types::{ArenaId, AttackKind, ErrorCategory, ItemKind, SubjectId};

use crate::error::EngineError;
use crate::tally::TallyHandler;

/// Extra wait after the longest window before auditing.
const SETTLE_MS: u64 = 100;

/// Largest raid, transfer, or grant a participant makes.
const MAX_STAKE: i64 = 25;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a soak run did and what the audit found.
#[derive(Debug, Default)]
pub struct SoakReport {
    /// Operations issued across all participants.
    pub operations: u64,
    /// Operations the economy rejected with a domain error.
    pub rejected: u64,
    /// Operations that failed with an internal error.
    pub internal_errors: u64,
    /// Attempts started.
    pub started: u64,
    /// Attempts blocked.
    pub blocked: u64,
    /// Attempts resolved as successful.
    pub resolved: u64,
    /// Points forfeited to successful attempts.
    pub forfeited: i64,
    /// Ledger entries at the end of the run.
    pub entries: usize,
    /// Audit violations. Empty on a clean run.
    pub violations: Vec<String>,
}

impl SoakReport {
    /// Whether the audit found nothing wrong.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Default)]
struct Counters {
    operations: AtomicU64,
    rejected: AtomicU64,
    internal_errors: AtomicU64,
    started: AtomicU64,
    blocked: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared, read-only view of the soak world handed to every participant.
#[derive(Debug)]
struct World {
    economy: Arc<Economy>,
    participants: Vec<SubjectId>,
    arenas: Vec<ArenaId>,
    window_ms: u64,
    counters: Counters,
}

impl World {
    fn pick_participant(&self, rng: &mut StdRng) -> Option<&SubjectId> {
        self.participants
            .get(rng.random_range(0..self.participants.len()))
    }

    fn pick_arena(&self, rng: &mut StdRng) -> Option<&ArenaId> {
        self.arenas.get(rng.random_range(0..self.arenas.len()))
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Seed the participants, play for the configured duration, then audit.
pub async fn run(
    economy: Arc<Economy>,
    tally: Arc<TallyHandler>,
    config: &SoakConfig,
) -> Result<SoakReport, EngineError> {
    if config.participants == 0 || config.arenas == 0 {
        return Err(EngineError::Soak {
            message: String::from("soak needs at least one participant and one arena"),
        });
    }

    let participants: Vec<SubjectId> = (0..config.participants)
        .map(|i| SubjectId::new(format!("participant-{i}")))
        .collect();
    let arenas: Vec<ArenaId> = (0..config.arenas)
        .map(|i| ArenaId::new(format!("arena-{i}")))
        .collect();

    seed(&economy, &participants, config)?;
    info!(
        participants = participants.len(),
        arenas = arenas.len(),
        duration_ms = config.duration_ms,
        seed = config.seed,
        "Soak participants seeded"
    );

    let world = Arc::new(World {
        economy,
        participants,
        arenas,
        window_ms: config.window_ms,
        counters: Counters::default(),
    });

    let duration = Duration::from_millis(config.duration_ms);
    let mut tasks = Vec::with_capacity(world.participants.len());
    for (index, me) in (0_u64..).zip(world.participants.iter()) {
        let rng = StdRng::seed_from_u64(config.seed.wrapping_add(index));
        tasks.push(tokio::spawn(play(
            Arc::clone(&world),
            me.clone(),
            rng,
            duration,
        )));
    }
    for task in tasks {
        task.await.map_err(|e| EngineError::Soak {
            message: format!("participant task failed: {e}"),
        })?;
    }
    info!("Soak participants finished, waiting out open windows");

    tokio::time::sleep(Duration::from_millis(config.window_ms.saturating_add(SETTLE_MS))).await;
    let late = world.economy.attempts().resolve_elapsed();
    let swept = world.economy.attacks().sweep_expired();
    if late > 0 {
        warn!(late, "Attempts resolved by the final sweep instead of their timers");
    }
    info!(swept, "Expired attack records swept");

    let counters = &world.counters;
    let mut report = SoakReport {
        operations: counters.operations.load(Ordering::Relaxed),
        rejected: counters.rejected.load(Ordering::Relaxed),
        internal_errors: counters.internal_errors.load(Ordering::Relaxed),
        started: counters.started.load(Ordering::Relaxed),
        blocked: counters.blocked.load(Ordering::Relaxed),
        resolved: tally.resolved(),
        forfeited: tally.forfeited(),
        entries: world.economy.ledger().len(),
        violations: Vec::new(),
    };
    report.violations = audit(&world.economy, &report);
    Ok(report)
}

fn seed(
    economy: &Economy,
    participants: &[SubjectId],
    config: &SoakConfig,
) -> Result<(), EngineError> {
    for subject in participants {
        if config.starting_balance > 0 {
            economy.grant(subject, config.starting_balance, "starting balance")?;
        }
        if config.starting_items > 0 {
            for item in [ItemKind::Bomb, ItemKind::Shield] {
                economy
                    .inventory()
                    .award(subject, item, config.starting_items)
                    .map_err(EconomyError::from)?;
            }
        }
    }
    Ok(())
}

async fn play(world: Arc<World>, me: SubjectId, mut rng: StdRng, duration: Duration) {
    let began = Instant::now();
    while began.elapsed() < duration {
        let outcome = step(&world, &me, &mut rng);
        Counters::bump(&world.counters.operations);

        if let Err(err) = outcome {
            if err.category() == ErrorCategory::Internal {
                error!(participant = %me, error = %err, "Internal error during soak");
                Counters::bump(&world.counters.internal_errors);
            } else {
                Counters::bump(&world.counters.rejected);
            }
        }

        let pause = rng.random_range(0..=3);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
}

/// One random operation on behalf of `me`.
fn step(world: &World, me: &SubjectId, rng: &mut StdRng) -> Result<(), EconomyError> {
    let economy = &world.economy;
    let (Some(other), Some(arena)) = (world.pick_participant(rng), world.pick_arena(rng)) else {
        return Ok(());
    };
    let stake = rng.random_range(1..=MAX_STAKE);

    match rng.random_range(0..6u8) {
        0 => {
            let cost = economy.config().attempts.cost;
            economy.start_attempt_with(arena, me, other, cost, world.window_ms)?;
            Counters::bump(&world.counters.started);
        }
        1 => {
            if economy.block_attempt(arena, me)?.outcome.is_blocked() {
                Counters::bump(&world.counters.blocked);
            }
        }
        2 => {
            let kind = if rng.random_bool(0.5) {
                AttackKind::Robbery
            } else {
                AttackKind::Bombing
            };
            economy.raid(Raid {
                attacker: me.clone(),
                target: other.clone(),
                kind,
                amount: stake,
                reason: String::from("soak raid"),
            })?;
        }
        3 => {
            economy.shield(me)?;
        }
        4 => {
            economy.ledger().transfer(me, other, stake, "soak transfer")?;
        }
        _ => {
            economy.grant(me, stake, "soak grant")?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

fn audit(economy: &Economy, report: &SoakReport) -> Vec<String> {
    let mut violations = Vec::new();
    let ledger = economy.ledger();

    if let AuditResult::Anomaly(anomaly) = ledger.audit() {
        violations.push(anomaly.message);
    }

    let balances = ledger
        .subjects()
        .iter()
        .try_fold(0_i128, |acc, s| acc.checked_add(i128::from(ledger.balance(s))));
    let entries = ledger.all_entries();
    let logged = entries
        .iter()
        .try_fold(0_i128, |acc, t| acc.checked_add(i128::from(t.amount)));
    match (balances, logged) {
        (Some(b), Some(l)) if b == l => {}
        (b, l) => violations.push(format!(
            "sum of balances {b:?} does not match sum of transactions {l:?}"
        )),
    }

    let active = economy.attempts().active_count();
    if active > 0 {
        violations.push(format!("{active} attempt(s) still active after every window closed"));
    }

    let settled = report.blocked.checked_add(report.resolved);
    if settled != Some(report.started) {
        violations.push(format!(
            "{} attempt(s) started but {} blocked and {} resolved",
            report.started, report.blocked, report.resolved
        ));
    }

    if report.internal_errors > 0 {
        violations.push(format!(
            "{} operation(s) failed with an internal error",
            report.internal_errors
        ));
    }

    if let Some(path) = &economy.config().journal.path {
        match read_json_lines(path) {
            Ok(journaled) if journaled.len() == entries.len() => {}
            Ok(journaled) => violations.push(format!(
                "journal holds {} entries, ledger holds {}",
                journaled.len(),
                entries.len()
            )),
            Err(err) => violations.push(format!("journal could not be re-read: {err}")),
        }
    }

    violations
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use feud_core::EconomyConfig;

    fn small_config() -> EconomyConfig {
        let mut config = EconomyConfig::default();
        config.attacks.counter_window_ms = 20;
        config.attempts.cost = 10;
        config.soak = SoakConfig {
            participants: 6,
            arenas: 2,
            duration_ms: 200,
            seed: 7,
            starting_balance: 200,
            starting_items: 2,
            window_ms: 20,
        };
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn short_soak_passes_audit() {
        let config = small_config();
        let soak = config.soak.clone();
        let tally = Arc::new(TallyHandler::new());
        let economy = Arc::new(Economy::in_memory(config, tally.clone()));

        let report = run(economy, tally, &soak).await.unwrap();
        assert!(report.is_clean(), "violations: {:?}", report.violations);
        assert!(report.operations > 0);
        assert_eq!(report.internal_errors, 0);
        assert_eq!(
            report.blocked.checked_add(report.resolved),
            Some(report.started)
        );
    }

    #[tokio::test]
    async fn empty_soak_is_rejected() {
        let mut config = small_config();
        config.soak.participants = 0;
        let soak = config.soak.clone();
        let tally = Arc::new(TallyHandler::new());
        let economy = Arc::new(Economy::in_memory(config, tally.clone()));

        assert!(matches!(
            run(economy, tally, &soak).await,
            Err(EngineError::Soak { .. })
        ));
    }

    #[test]
    fn audit_flags_unsettled_attempts() {
        let tally = Arc::new(TallyHandler::new());
        let economy = Economy::in_memory(small_config(), tally);
        let report = SoakReport {
            started: 3,
            blocked: 1,
            resolved: 1,
            ..SoakReport::default()
        };

        let violations = audit(&economy, &report);
        assert_eq!(violations.len(), 1);
        assert!(violations.iter().any(|v| v.contains("3 attempt(s) started")));
    }
}
