//! Timetable search: greedy construction followed by simulated annealing.
//!
//! The engine owns its working [`Schedule`] and hands the best one back by
//! value. Every candidate is scored through an [`Evaluator`], so tests can
//! inject slow or faulty evaluators.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constraints::{Evaluator, HardConstraint, Score, SoftScore, Violation, COST_EPSILON};
use crate::domain::{Placement, Problem, Schedule, SessionKind, TimeSlot};
use crate::error::{EngineError, SearchFailure};

/// Iterations between progress reports.
const DEFAULT_PROGRESS_INTERVAL: u64 = 64;

/// Annealing start temperature, in energy units.
const DEFAULT_INITIAL_TEMPERATURE: f64 = 10.0;

const DEFAULT_SWAP_PROBABILITY: f64 = 0.3;

/// Chance of picking a session from a current violation while infeasible.
const TARGETED_PICK_PROBABILITY: f64 = 0.5;

const MIN_TEMPERATURE: f64 = 1e-6;

/// Knobs for one engine run.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub time_budget: Duration,
    pub step_limit: Option<u64>,
    pub unimproved_step_limit: Option<u64>,
    pub seed: u64,
    pub progress_interval: u64,
    pub initial_temperature: f64,
    pub swap_probability: f64,
}

impl SearchOptions {
    /// Options taken from the problem's budget, termination and seed.
    ///
    /// Without a seed the run draws one at random.
    pub fn from_problem(problem: &Problem) -> Self {
        Self {
            time_budget: problem.time_budget,
            step_limit: problem.termination.step_limit,
            unimproved_step_limit: problem.termination.unimproved_step_limit,
            seed: problem.seed.unwrap_or_else(rand::random),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            initial_temperature: DEFAULT_INITIAL_TEMPERATURE,
            swap_probability: DEFAULT_SWAP_PROBABILITY,
        }
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_step_limit(mut self, steps: u64) -> Self {
        self.step_limit = Some(steps);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Why the improvement loop stopped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    BudgetExhausted,
    Converged,
    StepLimit,
    Unimproved,
    Cancelled,
}

/// Periodic progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Elapsed fraction of the budget, capped at 99.
    pub percent: u8,
    pub iteration: u64,
    pub best: Score,
    pub elapsed: Duration,
}

/// A new best schedule found during improvement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestUpdate {
    pub iteration: u64,
    pub elapsed: Duration,
    pub score: Score,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    pub iterations: u64,
    pub accepted_moves: u64,
    pub improvements: u64,
    /// Rejected moves, by the hard constraint they would have broken.
    pub blocked_moves: BTreeMap<HardConstraint, u64>,
    pub construction_time: Duration,
    pub elapsed: Duration,
}

/// Result of a completed search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub schedule: Schedule,
    pub violations: Vec<Violation>,
    pub soft: SoftScore,
    pub score: Score,
    pub feasible: bool,
    pub stop_reason: StopReason,
    pub stats: SearchStats,
    pub trajectory: Vec<BestUpdate>,
}

#[derive(Debug, Clone, Copy)]
enum Move {
    Relocate { session: usize, to: Placement },
    Swap { a: usize, b: usize },
}

type Undo = [(usize, Option<Placement>); 2];

impl Move {
    fn apply(self, schedule: &mut Schedule) -> Undo {
        match self {
            Move::Relocate { session, to } => {
                let undo = [(session, schedule.get(session)), (session, schedule.get(session))];
                schedule.set(session, Some(to));
                undo
            }
            Move::Swap { a, b } => {
                let (pa, pb) = (schedule.get(a), schedule.get(b));
                let undo = [(a, pa), (b, pb)];
                if let (Some(pa), Some(pb)) = (pa, pb) {
                    schedule.set(a, Some(Placement { room: pa.room, start: pb.start }));
                    schedule.set(b, Some(Placement { room: pb.room, start: pa.start }));
                }
                undo
            }
        }
    }

    fn revert(undo: Undo, schedule: &mut Schedule) {
        for (session, placement) in undo.into_iter().rev() {
            schedule.set(session, placement);
        }
    }
}

/// A scored schedule state.
struct Scored {
    violations: Vec<Violation>,
    soft: SoftScore,
    score: Score,
}

/// Simulated-annealing timetable engine.
///
/// # Examples
///
/// ```
/// use timely_scheduler::constraints::ConstraintEvaluator;
/// use timely_scheduler::demo_data::{generate, DemoData};
/// use timely_scheduler::domain::Problem;
/// use timely_scheduler::search::{Engine, SearchOptions};
/// use tokio_util::sync::CancellationToken;
///
/// let problem = Problem::from_config(&generate(DemoData::Small)).unwrap();
/// let options = SearchOptions::from_problem(&problem).with_step_limit(200);
/// let mut engine = Engine::new(&problem, &ConstraintEvaluator, options);
///
/// let outcome = engine.run(&CancellationToken::new(), &mut |_| {}).unwrap();
/// assert!(outcome.feasible);
/// ```
pub struct Engine<'a> {
    problem: &'a Problem,
    evaluator: &'a dyn Evaluator,
    options: SearchOptions,
    rng: StdRng,
    stats: SearchStats,
    /// Start of the run; the time budget counts from here.
    origin: Option<Instant>,
}

impl<'a> Engine<'a> {
    pub fn new(problem: &'a Problem, evaluator: &'a dyn Evaluator, options: SearchOptions) -> Self {
        let rng = StdRng::seed_from_u64(options.seed);
        Self {
            problem,
            evaluator,
            options,
            rng,
            stats: SearchStats::default(),
            origin: None,
        }
    }

    /// Construction followed by improvement, sharing one time budget.
    pub fn run(
        &mut self,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<SearchOutcome, SearchFailure> {
        self.origin = Some(Instant::now());
        let initial = self.construct(cancel)?;
        self.improve(initial, cancel, progress)
    }

    /// Greedy seeding, most-constrained session first.
    ///
    /// Each session takes the legal placement with the best local heuristic,
    /// or the one with the fewest conflicts when none is legal. Sessions left
    /// when `cancel` fires or the budget runs out stay unscheduled.
    pub fn construct(&mut self, cancel: &CancellationToken) -> Result<Schedule, SearchFailure> {
        let started = Instant::now();
        let origin = self.clock();
        let budget = self.options.time_budget;
        let expired = || cancel.is_cancelled() || origin.elapsed() >= budget;
        let problem = self.problem;
        let n = problem.sessions.len();
        let mut schedule = Schedule::unassigned(n);

        let empty = Schedule::unassigned(n);
        let mut order = Vec::with_capacity(n);
        for i in 0..n {
            if expired() {
                break;
            }
            let mut legal = 0usize;
            for room in self.candidate_rooms(i) {
                for start in problem.start_slots(problem.sessions[i].duration()) {
                    let conflicts = problem
                        .placement_conflicts(i, room, start, &empty)
                        .map_err(|e| malformed(e.to_string(), None))?;
                    if conflicts.is_empty() && self.rule_conflicts(i, start, &empty) == 0 {
                        legal += 1;
                    }
                }
            }
            order.push((legal, std::cmp::Reverse(problem.sessions[i].duration()), i));
        }
        order.sort_unstable();

        for &(_, _, i) in &order {
            if expired() {
                break;
            }
            let planned = &problem.sessions[i];
            let mut best: Option<(PlacementKey, Placement)> = None;
            for room in self.candidate_rooms(i) {
                for start in problem.start_slots(planned.duration()) {
                    let conflicts = problem
                        .placement_conflicts(i, room, start, &schedule)
                        .map_err(|e| malformed(e.to_string(), Some(schedule.clone())))?;
                    let count = conflicts.len() + self.rule_conflicts(i, start, &schedule);
                    let key = self.placement_key(i, room, start, count, &schedule);
                    if best.as_ref().map_or(true, |(b, _)| key < *b) {
                        best = Some((key, Placement { room, start }));
                    }
                }
            }
            if let Some((_, placement)) = best {
                schedule.set(i, Some(placement));
            }
        }

        self.stats.construction_time = started.elapsed();
        debug!(
            placed = schedule.placed_count(),
            sessions = n,
            elapsed_ms = self.stats.construction_time.as_millis() as u64,
            "Construction finished"
        );
        Ok(schedule)
    }

    /// Anneals from `initial` until budget, limits, convergence or cancellation.
    pub fn improve(
        &mut self,
        initial: Schedule,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<SearchOutcome, SearchFailure> {
        let started = self.clock();
        let budget = self.options.time_budget;
        let n = self.problem.sessions.len();

        let mut current = initial;
        let mut current_state = self.score(&current, None)?;
        let mut best = current.clone();
        let mut best_score = current_state.score;
        let mut trajectory = vec![BestUpdate {
            iteration: 0,
            elapsed: Duration::ZERO,
            score: best_score,
        }];

        let mut unimproved = 0u64;
        let mut last_percent = 0u8;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            let elapsed = started.elapsed();
            if elapsed >= budget {
                break StopReason::BudgetExhausted;
            }
            if best_score.is_feasible() && best_score.soft <= COST_EPSILON {
                break StopReason::Converged;
            }
            if self.options.step_limit.is_some_and(|limit| self.stats.iterations >= limit) {
                break StopReason::StepLimit;
            }
            if self
                .options
                .unimproved_step_limit
                .is_some_and(|limit| unimproved >= limit)
            {
                break StopReason::Unimproved;
            }
            if n == 0 {
                break StopReason::Converged;
            }

            self.stats.iterations += 1;
            let iteration = self.stats.iterations;

            let mv = self.propose(&current, &current_state.violations);
            let undo = mv.apply(&mut current);
            let candidate = self.score(&current, Some(&best))?;

            let accept = if best_score.is_feasible() && !candidate.score.is_feasible() {
                false
            } else if candidate.score.is_better_than(&current_state.score) {
                true
            } else {
                let delta = candidate.score.energy() - current_state.score.energy();
                let temperature = self.temperature(elapsed);
                delta <= 0.0 || self.rng.gen::<f64>() < (-delta / temperature).exp()
            };

            if accept {
                self.stats.accepted_moves += 1;
                current_state = candidate;
                if current_state.score.is_better_than(&best_score) {
                    best = current.clone();
                    best_score = current_state.score;
                    self.stats.improvements += 1;
                    unimproved = 0;
                    trajectory.push(BestUpdate {
                        iteration,
                        elapsed: started.elapsed(),
                        score: best_score,
                    });
                } else {
                    unimproved += 1;
                }
            } else {
                if candidate.score.hard > current_state.score.hard {
                    self.record_blocked(&current_state.violations, &candidate.violations);
                }
                Move::revert(undo, &mut current);
                unimproved += 1;
            }

            if iteration % self.options.progress_interval.max(1) == 0 {
                let elapsed = started.elapsed();
                let percent = percent_of(elapsed, budget).max(last_percent);
                last_percent = percent;
                progress(Progress {
                    percent,
                    iteration,
                    best: best_score,
                    elapsed,
                });
            }
        };

        self.stats.elapsed = started.elapsed();
        let final_state = self.score(&best, None)?;
        debug!(
            iterations = self.stats.iterations,
            accepted = self.stats.accepted_moves,
            score = %final_state.score,
            reason = ?stop_reason,
            "Improvement finished"
        );

        Ok(SearchOutcome {
            feasible: final_state.score.is_feasible(),
            score: final_state.score,
            schedule: best,
            violations: final_state.violations,
            soft: final_state.soft,
            stop_reason,
            stats: self.stats.clone(),
            trajectory,
        })
    }

    /// Start of the budget: the run's start, or now for a standalone phase.
    fn clock(&mut self) -> Instant {
        *self.origin.get_or_insert_with(Instant::now)
    }

    /// Breaks of rules outside `placement_conflicts`: practical continuity
    /// and daily credit caps.
    fn rule_conflicts(&self, session: usize, start: TimeSlot, schedule: &Schedule) -> usize {
        let problem = self.problem;
        let planned = &problem.sessions[session];
        let enabled = &problem.constraints;
        let mut count = 0;

        if enabled.is_enabled(HardConstraint::PracticalContinuity)
            && planned.session.kind == SessionKind::Practical
            && planned.duration() > 1
        {
            let last = start.period.saturating_add(planned.duration() - 1);
            count += problem.breaks_after.range(start.period..last).count().min(1);
        }

        let credits_on_day = |attends: &dyn Fn(usize) -> bool| -> u32 {
            schedule
                .placed()
                .filter(|(i, p)| *i != session && p.start.day == start.day && attends(*i))
                .map(|(i, _)| problem.sessions[i].session.credit_weight)
                .sum::<u32>()
                + planned.session.credit_weight
        };
        if enabled.is_enabled(HardConstraint::CohortCreditOverflow) {
            for &c in &planned.cohorts {
                if let Some(max) = problem.cohorts[c].max_credits_per_day {
                    if credits_on_day(&|i| problem.sessions[i].cohorts.contains(&c)) > max {
                        count += 1;
                    }
                }
            }
        }
        if enabled.is_enabled(HardConstraint::FacultyCreditOverflow) {
            if let Some(max) = problem.faculty[planned.faculty].max_credits_per_day {
                if credits_on_day(&|i| problem.sessions[i].faculty == planned.faculty) > max {
                    count += 1;
                }
            }
        }
        count
    }

    fn candidate_rooms(&self, session: usize) -> Vec<usize> {
        let compatible = &self.problem.sessions[session].compatible_rooms;
        if compatible.is_empty() {
            (0..self.problem.rooms.len()).collect()
        } else {
            compatible.clone()
        }
    }

    /// Lower is better: conflicts, inexact type, capacity slack, cohort day load, day, period.
    fn placement_key(
        &self,
        session: usize,
        room: usize,
        start: TimeSlot,
        conflicts: usize,
        schedule: &Schedule,
    ) -> PlacementKey {
        let planned = &self.problem.sessions[session];
        let room_ref = &self.problem.rooms[room];
        let mismatch = room_ref.room_type != planned.session.required_room_type;
        let slack = room_ref.capacity.saturating_sub(planned.attendance);
        let day_load: u32 = schedule
            .placed()
            .filter(|(other, p)| {
                p.start.day == start.day && self.problem.sessions[*other].shares_cohort(planned)
            })
            .map(|(other, _)| u32::from(self.problem.sessions[other].duration()))
            .sum();
        (conflicts, mismatch, slack, day_load, start.day, start.period, room)
    }

    fn propose(&mut self, schedule: &Schedule, violations: &[Violation]) -> Move {
        let n = self.problem.sessions.len();
        let session = match violations.choose(&mut self.rng) {
            Some(v) if self.rng.gen_bool(TARGETED_PICK_PROBABILITY) => v
                .sessions
                .choose(&mut self.rng)
                .copied()
                .unwrap_or_else(|| self.rng.gen_range(0..n)),
            _ => self.rng.gen_range(0..n),
        };

        if n > 1
            && schedule.get(session).is_some()
            && self.rng.gen_bool(self.options.swap_probability)
        {
            let other = self.rng.gen_range(0..n - 1);
            let other = if other >= session { other + 1 } else { other };
            if schedule.get(other).is_some() {
                return Move::Swap { a: session, b: other };
            }
        }

        let rooms = self.candidate_rooms(session);
        let room = rooms.choose(&mut self.rng).copied().unwrap_or(0);
        let duration = self.problem.sessions[session].duration();
        let day = self.rng.gen_range(0..self.problem.day_count().max(1));
        let last_start = self.problem.periods_per_day.saturating_sub(duration);
        let period = self.rng.gen_range(0..=last_start);
        Move::Relocate {
            session,
            to: Placement::new(room, day, period),
        }
    }

    fn temperature(&self, elapsed: Duration) -> f64 {
        let mut fraction = elapsed.as_secs_f64() / self.options.time_budget.as_secs_f64().max(1e-9);
        if let Some(limit) = self.options.step_limit {
            fraction = fraction.max(self.stats.iterations as f64 / limit.max(1) as f64);
        }
        (self.options.initial_temperature * (1.0 - fraction.min(1.0))).max(MIN_TEMPERATURE)
    }

    fn score(
        &self,
        schedule: &Schedule,
        fallback: Option<&Schedule>,
    ) -> Result<Scored, SearchFailure> {
        let last = || Some(fallback.unwrap_or(schedule).clone());
        let (rooms, days) = (self.problem.rooms.len(), self.problem.day_count());
        if let Some((i, p)) = schedule
            .placed()
            .find(|(_, p)| p.room >= rooms || p.start.day >= days)
        {
            return Err(malformed(
                format!(
                    "session {} placed at room {} day {} outside {} rooms and {} days",
                    i, p.room, p.start.day, rooms, days
                ),
                last(),
            ));
        }
        let (violations, soft) = self.evaluator.score(self.problem, schedule);
        if !soft.total.is_finite() || soft.total < 0.0 {
            return Err(SearchFailure {
                error: EngineError::InvalidCost(soft.total),
                last_schedule: last(),
            });
        }
        let n = self.problem.sessions.len();
        if let Some(v) = violations.iter().find(|v| v.sessions.iter().any(|&s| s >= n)) {
            return Err(malformed(
                format!("{} violation references session outside 0..{}", v.constraint.label(), n),
                last(),
            ));
        }
        let score = Score::new(&violations, &soft);
        Ok(Scored {
            violations,
            soft,
            score,
        })
    }

    fn record_blocked(&mut self, current: &[Violation], candidate: &[Violation]) {
        let before = count_by_constraint(current);
        for (constraint, count) in count_by_constraint(candidate) {
            if count > before.get(&constraint).copied().unwrap_or(0) {
                *self.stats.blocked_moves.entry(constraint).or_default() += 1;
            }
        }
    }
}

type PlacementKey = (usize, bool, u32, u32, u8, u8, usize);

/// Runs construction and improvement for `problem`.
pub fn run(
    problem: &Problem,
    evaluator: &dyn Evaluator,
    options: SearchOptions,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<SearchOutcome, SearchFailure> {
    Engine::new(problem, evaluator, options).run(cancel, progress)
}

fn count_by_constraint(violations: &[Violation]) -> BTreeMap<HardConstraint, usize> {
    let mut counts = BTreeMap::new();
    for v in violations {
        *counts.entry(v.constraint).or_default() += 1;
    }
    counts
}

fn percent_of(elapsed: Duration, budget: Duration) -> u8 {
    let fraction = elapsed.as_secs_f64() / budget.as_secs_f64().max(1e-9);
    (fraction * 100.0).clamp(0.0, 99.0) as u8
}

fn malformed(message: String, last_schedule: Option<Schedule>) -> SearchFailure {
    SearchFailure {
        error: EngineError::MalformedCandidate(message),
        last_schedule,
    }
}
