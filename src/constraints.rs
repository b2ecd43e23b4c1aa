//! Constraint definitions for university timetabling.
//!
//! # Constraints
//!
//! Hard (a schedule is feasible iff none fire):
//! - **Unscheduled**: every session needs a placement
//! - **Double booking**: room, faculty and cohort can be in one place at a time
//! - **Unavailability**: room/cohort blackouts, faculty availability
//! - **Room fit**: capacity, type compatibility, required equipment
//! - **Teaching day**: sessions end by the last period
//! - **Credit overflow**: per-day credit caps for cohorts and faculty
//! - **Practical continuity**: multi-period practicals do not straddle a break
//!
//! Soft (weighted, lower is better):
//! - **Cohort idle gaps**: idle periods inside a cohort's day
//! - **Faculty workload variance**: spread of weekly teaching periods
//! - **Room type mismatch**: compatible but non-exact room
//! - **Elective clash**: overlapping electives of different groups

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use utoipa::ToSchema;

use crate::domain::{Placement, Problem, Schedule, SessionKind, TimeSlot};

/// Energy of one hard violation relative to soft cost during annealing.
pub const HARD_WEIGHT: f64 = 25.0;

/// Soft costs closer than this compare equal.
pub const COST_EPSILON: f64 = 1e-9;

/// Hard constraint tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum HardConstraint {
    Unscheduled,
    RoomDoubleBooking,
    FacultyDoubleBooking,
    CohortDoubleBooking,
    RoomUnavailable,
    FacultyUnavailable,
    CohortUnavailable,
    RoomCapacity,
    RoomTypeIncompatible,
    MissingEquipment,
    OutsideTeachingDay,
    CohortCreditOverflow,
    FacultyCreditOverflow,
    PracticalContinuity,
}

impl HardConstraint {
    pub const ALL: [HardConstraint; 14] = [
        HardConstraint::Unscheduled,
        HardConstraint::RoomDoubleBooking,
        HardConstraint::FacultyDoubleBooking,
        HardConstraint::CohortDoubleBooking,
        HardConstraint::RoomUnavailable,
        HardConstraint::FacultyUnavailable,
        HardConstraint::CohortUnavailable,
        HardConstraint::RoomCapacity,
        HardConstraint::RoomTypeIncompatible,
        HardConstraint::MissingEquipment,
        HardConstraint::OutsideTeachingDay,
        HardConstraint::CohortCreditOverflow,
        HardConstraint::FacultyCreditOverflow,
        HardConstraint::PracticalContinuity,
    ];

    /// Returns the kebab-case tag used on the wire.
    ///
    /// ```
    /// use timely_scheduler::constraints::HardConstraint;
    ///
    /// assert_eq!(HardConstraint::RoomDoubleBooking.label(), "room-double-booking");
    /// ```
    pub fn label(self) -> &'static str {
        match self {
            HardConstraint::Unscheduled => "unscheduled",
            HardConstraint::RoomDoubleBooking => "room-double-booking",
            HardConstraint::FacultyDoubleBooking => "faculty-double-booking",
            HardConstraint::CohortDoubleBooking => "cohort-double-booking",
            HardConstraint::RoomUnavailable => "room-unavailable",
            HardConstraint::FacultyUnavailable => "faculty-unavailable",
            HardConstraint::CohortUnavailable => "cohort-unavailable",
            HardConstraint::RoomCapacity => "room-capacity",
            HardConstraint::RoomTypeIncompatible => "room-type-incompatible",
            HardConstraint::MissingEquipment => "missing-equipment",
            HardConstraint::OutsideTeachingDay => "outside-teaching-day",
            HardConstraint::CohortCreditOverflow => "cohort-credit-overflow",
            HardConstraint::FacultyCreditOverflow => "faculty-credit-overflow",
            HardConstraint::PracticalContinuity => "practical-continuity",
        }
    }
}

/// Soft constraint tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum SoftConstraint {
    CohortIdleGaps,
    FacultyWorkloadVariance,
    RoomTypeMismatch,
    ElectiveClash,
}

impl SoftConstraint {
    pub const ALL: [SoftConstraint; 4] = [
        SoftConstraint::CohortIdleGaps,
        SoftConstraint::FacultyWorkloadVariance,
        SoftConstraint::RoomTypeMismatch,
        SoftConstraint::ElectiveClash,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SoftConstraint::CohortIdleGaps => "cohort-idle-gaps",
            SoftConstraint::FacultyWorkloadVariance => "faculty-workload-variance",
            SoftConstraint::RoomTypeMismatch => "room-type-mismatch",
            SoftConstraint::ElectiveClash => "elective-clash",
        }
    }

    pub fn default_weight(self) -> f64 {
        match self {
            SoftConstraint::CohortIdleGaps => 1.0,
            SoftConstraint::FacultyWorkloadVariance => 0.5,
            SoftConstraint::RoomTypeMismatch => 1.0,
            SoftConstraint::ElectiveClash => 2.0,
        }
    }
}

/// Enabled hard constraints and soft weights.
///
/// Missing fields fall back to the defaults: every hard constraint on and
/// every soft constraint at its default weight.
///
/// ```
/// use timely_scheduler::constraints::{ConstraintSet, HardConstraint, SoftConstraint};
///
/// let json = r#"{"soft": {"cohort-idle-gaps": 3.0}}"#;
/// let set: ConstraintSet = serde_json::from_str(json).unwrap();
/// assert!(set.is_enabled(HardConstraint::PracticalContinuity));
/// assert_eq!(set.weight(SoftConstraint::CohortIdleGaps), 3.0);
/// assert_eq!(set.weight(SoftConstraint::ElectiveClash), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ConstraintSet {
    #[schema(value_type = Vec<HardConstraint>)]
    pub hard: BTreeSet<HardConstraint>,
    #[schema(value_type = Object)]
    pub soft: BTreeMap<SoftConstraint, f64>,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            hard: HardConstraint::ALL.into_iter().collect(),
            soft: SoftConstraint::ALL
                .into_iter()
                .map(|c| (c, c.default_weight()))
                .collect(),
        }
    }
}

impl ConstraintSet {
    pub fn is_enabled(&self, constraint: HardConstraint) -> bool {
        self.hard.contains(&constraint)
    }

    /// Weight of a soft constraint; absent means disabled.
    pub fn weight(&self, constraint: SoftConstraint) -> f64 {
        self.soft.get(&constraint).copied().unwrap_or(0.0)
    }

    pub fn with_weight(mut self, constraint: SoftConstraint, weight: f64) -> Self {
        self.soft.insert(constraint, weight);
        self
    }

    pub fn without(mut self, constraint: HardConstraint) -> Self {
        self.hard.remove(&constraint);
        self
    }
}

/// One hard-constraint breach.
///
/// Indices refer to the [`Problem`] vectors. `amount`/`limit` carry the
/// measured value and the bound for quantitative rules (capacity, credits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub constraint: HardConstraint,
    pub sessions: Vec<usize>,
    pub room: Option<usize>,
    pub faculty: Option<usize>,
    pub cohort: Option<usize>,
    pub slot: Option<TimeSlot>,
    pub day: Option<u8>,
    pub amount: u32,
    pub limit: Option<u32>,
}

impl Violation {
    fn new(constraint: HardConstraint, sessions: Vec<usize>) -> Self {
        Self {
            constraint,
            sessions,
            room: None,
            faculty: None,
            cohort: None,
            slot: None,
            day: None,
            amount: 0,
            limit: None,
        }
    }

    fn room(mut self, room: usize) -> Self {
        self.room = Some(room);
        self
    }

    fn faculty(mut self, faculty: usize) -> Self {
        self.faculty = Some(faculty);
        self
    }

    fn cohort(mut self, cohort: usize) -> Self {
        self.cohort = Some(cohort);
        self
    }

    fn at(mut self, slot: TimeSlot) -> Self {
        self.day = Some(slot.day);
        self.slot = Some(slot);
        self
    }

    fn on_day(mut self, day: u8) -> Self {
        self.day = Some(day);
        self
    }

    fn measured(mut self, amount: u32, limit: u32) -> Self {
        self.amount = amount;
        self.limit = Some(limit);
        self
    }
}

/// The thing a soft cost is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Entity {
    Cohort(usize),
    Faculty(usize),
    Session(usize),
}

/// Soft cost charged to one entity by one constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftContribution {
    pub constraint: SoftConstraint,
    pub entity: Entity,
    pub cost: f64,
}

/// Weighted soft cost of a schedule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SoftScore {
    pub total: f64,
    pub breakdown: BTreeMap<SoftConstraint, f64>,
    pub contributions: Vec<SoftContribution>,
    /// Largest summed cost charged to a single entity.
    pub max_entity_cost: f64,
}

/// Lexicographic schedule quality: hard count, then soft total, then fairness.
///
/// ```
/// use timely_scheduler::constraints::Score;
///
/// let feasible = Score { hard: 0, soft: 12.0, fairness: 4.0 };
/// let infeasible = Score { hard: 1, soft: 0.0, fairness: 0.0 };
/// assert!(feasible.is_better_than(&infeasible));
/// assert_eq!(feasible.to_string(), "0hard/12.000soft");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Score {
    pub hard: usize,
    pub soft: f64,
    pub fairness: f64,
}

impl Score {
    pub fn new(violations: &[Violation], soft: &SoftScore) -> Self {
        Self {
            hard: violations.len(),
            soft: soft.total,
            fairness: soft.max_entity_cost,
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.hard == 0
    }

    pub fn compare(&self, other: &Score) -> Ordering {
        self.hard
            .cmp(&other.hard)
            .then_with(|| cmp_cost(self.soft, other.soft))
            .then_with(|| cmp_cost(self.fairness, other.fairness))
    }

    pub fn is_better_than(&self, other: &Score) -> bool {
        self.compare(other) == Ordering::Less
    }

    /// Scalar used by the annealing acceptance test.
    pub fn energy(&self) -> f64 {
        self.hard as f64 * HARD_WEIGHT + self.soft
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}hard/{:.3}soft", self.hard, self.soft)
    }
}

fn cmp_cost(a: f64, b: f64) -> Ordering {
    if (a - b).abs() <= COST_EPSILON {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Scores schedules. Implementations must be deterministic.
pub trait Evaluator: Send + Sync {
    /// Enumerates every enabled hard-constraint breach.
    fn evaluate_hard(&self, problem: &Problem, schedule: &Schedule) -> Vec<Violation>;

    /// Computes weighted soft cost using `weights`.
    fn evaluate_soft(&self, problem: &Problem, schedule: &Schedule, weights: &ConstraintSet)
        -> SoftScore;

    fn score(&self, problem: &Problem, schedule: &Schedule) -> (Vec<Violation>, SoftScore) {
        let violations = self.evaluate_hard(problem, schedule);
        let soft = self.evaluate_soft(problem, schedule, &problem.constraints);
        (violations, soft)
    }
}

/// Full re-evaluation of every constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEvaluator;

impl Evaluator for ConstraintEvaluator {
    fn evaluate_hard(&self, problem: &Problem, schedule: &Schedule) -> Vec<Violation> {
        let enabled = &problem.constraints;
        let mut out = Vec::new();

        // Per-session placement rules
        for (i, planned) in problem.sessions.iter().enumerate() {
            let Some(p) = schedule.get(i) else {
                if enabled.is_enabled(HardConstraint::Unscheduled) {
                    out.push(Violation::new(HardConstraint::Unscheduled, vec![i]));
                }
                continue;
            };
            let Some(room) = problem.rooms.get(p.room) else {
                continue;
            };
            let session = &planned.session;

            if enabled.is_enabled(HardConstraint::RoomTypeIncompatible)
                && !room.room_type.accepts(session.required_room_type)
            {
                out.push(
                    Violation::new(HardConstraint::RoomTypeIncompatible, vec![i]).room(p.room),
                );
            }
            if enabled.is_enabled(HardConstraint::MissingEquipment)
                && !session.required_equipment.is_subset(&room.equipment_tags)
            {
                let missing = session.required_equipment.difference(&room.equipment_tags).count();
                let mut v = Violation::new(HardConstraint::MissingEquipment, vec![i]).room(p.room);
                v.amount = missing as u32;
                out.push(v);
            }
            if enabled.is_enabled(HardConstraint::RoomCapacity)
                && planned.attendance > room.capacity
            {
                out.push(
                    Violation::new(HardConstraint::RoomCapacity, vec![i])
                        .room(p.room)
                        .measured(planned.attendance, room.capacity),
                );
            }
            let end = u16::from(p.start.period) + u16::from(planned.duration());
            if enabled.is_enabled(HardConstraint::OutsideTeachingDay)
                && (end > u16::from(problem.periods_per_day) || p.start.day >= problem.day_count())
            {
                out.push(Violation::new(HardConstraint::OutsideTeachingDay, vec![i]).at(p.start));
            }

            let occupied: Vec<TimeSlot> = occupied_slots(problem, &p, planned.duration()).collect();
            if enabled.is_enabled(HardConstraint::RoomUnavailable) {
                if let Some(slot) = occupied.iter().find(|s| room.blackouts.contains(*s)) {
                    out.push(
                        Violation::new(HardConstraint::RoomUnavailable, vec![i])
                            .room(p.room)
                            .at(*slot),
                    );
                }
            }
            if enabled.is_enabled(HardConstraint::FacultyUnavailable) {
                let faculty = &problem.faculty[planned.faculty];
                if let Some(slot) = occupied.iter().find(|s| !faculty.is_available(**s)) {
                    out.push(
                        Violation::new(HardConstraint::FacultyUnavailable, vec![i])
                            .faculty(planned.faculty)
                            .at(*slot),
                    );
                }
            }
            if enabled.is_enabled(HardConstraint::CohortUnavailable) {
                for &c in &planned.cohorts {
                    let cohort = &problem.cohorts[c];
                    if let Some(slot) = occupied.iter().find(|s| cohort.blackouts.contains(*s)) {
                        out.push(
                            Violation::new(HardConstraint::CohortUnavailable, vec![i])
                                .cohort(c)
                                .at(*slot),
                        );
                    }
                }
            }
            if enabled.is_enabled(HardConstraint::PracticalContinuity)
                && session.kind == SessionKind::Practical
                && planned.duration() > 1
            {
                let last = p.start.period.saturating_add(planned.duration() - 1);
                if let Some(&brk) = problem.breaks_after.range(p.start.period..last).next() {
                    out.push(
                        Violation::new(HardConstraint::PracticalContinuity, vec![i])
                            .room(p.room)
                            .at(TimeSlot::new(p.start.day, brk)),
                    );
                }
            }
        }

        // Pairwise overlaps, bucketed by day
        for sessions in sessions_by_day(schedule).values() {
            for (a_pos, &(a, pa)) in sessions.iter().enumerate() {
                for &(b, pb) in &sessions[a_pos + 1..] {
                    let (sa, sb) = (&problem.sessions[a], &problem.sessions[b]);
                    if !pa.overlaps(sa.duration(), &pb, sb.duration()) || problem.co_located(a, b) {
                        continue;
                    }
                    let slot = TimeSlot::new(pa.start.day, pa.start.period.max(pb.start.period));
                    if enabled.is_enabled(HardConstraint::RoomDoubleBooking) && pa.room == pb.room {
                        out.push(
                            Violation::new(HardConstraint::RoomDoubleBooking, vec![a, b])
                                .room(pa.room)
                                .at(slot),
                        );
                    }
                    if enabled.is_enabled(HardConstraint::FacultyDoubleBooking)
                        && sa.faculty == sb.faculty
                    {
                        out.push(
                            Violation::new(HardConstraint::FacultyDoubleBooking, vec![a, b])
                                .faculty(sa.faculty)
                                .at(slot),
                        );
                    }
                    if enabled.is_enabled(HardConstraint::CohortDoubleBooking)
                        && !problem.cohort_overlap_allowed(a, b)
                    {
                        for &c in sa.cohorts.iter().filter(|c| sb.cohorts.contains(c)) {
                            out.push(
                                Violation::new(HardConstraint::CohortDoubleBooking, vec![a, b])
                                    .cohort(c)
                                    .at(slot),
                            );
                        }
                    }
                }
            }
        }

        // Daily credit caps
        if enabled.is_enabled(HardConstraint::CohortCreditOverflow) {
            for (c, cohort) in problem.cohorts.iter().enumerate() {
                let Some(max) = cohort.max_credits_per_day else {
                    continue;
                };
                let daily = daily_credits(problem, schedule, |i| {
                    problem.sessions[i].cohorts.contains(&c)
                });
                for (day, (credits, sessions)) in daily {
                    if credits > max {
                        out.push(
                            Violation::new(HardConstraint::CohortCreditOverflow, sessions)
                                .cohort(c)
                                .on_day(day)
                                .measured(credits, max),
                        );
                    }
                }
            }
        }
        if enabled.is_enabled(HardConstraint::FacultyCreditOverflow) {
            for (f, faculty) in problem.faculty.iter().enumerate() {
                let Some(max) = faculty.max_credits_per_day else {
                    continue;
                };
                let daily = daily_credits(problem, schedule, |i| problem.sessions[i].faculty == f);
                for (day, (credits, sessions)) in daily {
                    if credits > max {
                        out.push(
                            Violation::new(HardConstraint::FacultyCreditOverflow, sessions)
                                .faculty(f)
                                .on_day(day)
                                .measured(credits, max),
                        );
                    }
                }
            }
        }

        out
    }

    fn evaluate_soft(
        &self,
        problem: &Problem,
        schedule: &Schedule,
        weights: &ConstraintSet,
    ) -> SoftScore {
        let mut contributions = Vec::new();

        // Idle periods between a cohort's first and last session of each day
        let w = weights.weight(SoftConstraint::CohortIdleGaps);
        if w > 0.0 {
            for c in 0..problem.cohorts.len() {
                let mut busy: BTreeMap<u8, BTreeSet<u8>> = BTreeMap::new();
                for (i, p) in schedule.placed() {
                    let planned = &problem.sessions[i];
                    if planned.cohorts.contains(&c) {
                        let periods = busy.entry(p.start.day).or_default();
                        periods.extend(
                            p.periods(planned.duration())
                                .filter(|&x| x < problem.periods_per_day),
                        );
                    }
                }
                let idle: usize = busy
                    .values()
                    .filter_map(|periods| {
                        let first = *periods.first()?;
                        let last = *periods.last()?;
                        Some(usize::from(last - first) + 1 - periods.len())
                    })
                    .sum();
                if idle > 0 {
                    contributions.push(SoftContribution {
                        constraint: SoftConstraint::CohortIdleGaps,
                        entity: Entity::Cohort(c),
                        cost: w * idle as f64,
                    });
                }
            }
        }

        // Variance of weekly teaching periods across teaching faculty
        let w = weights.weight(SoftConstraint::FacultyWorkloadVariance);
        if w > 0.0 {
            let teaching: BTreeSet<usize> = problem.sessions.iter().map(|s| s.faculty).collect();
            if !teaching.is_empty() {
                let mut load: BTreeMap<usize, f64> = teaching.iter().map(|&f| (f, 0.0)).collect();
                for (i, _) in schedule.placed() {
                    let planned = &problem.sessions[i];
                    if let Some(l) = load.get_mut(&planned.faculty) {
                        *l += f64::from(planned.duration());
                    }
                }
                let n = load.len() as f64;
                let mean = load.values().sum::<f64>() / n;
                for (&f, &l) in &load {
                    let cost = w * (l - mean) * (l - mean) / n;
                    if cost > 0.0 {
                        contributions.push(SoftContribution {
                            constraint: SoftConstraint::FacultyWorkloadVariance,
                            entity: Entity::Faculty(f),
                            cost,
                        });
                    }
                }
            }
        }

        // Compatible but non-exact room type
        let w = weights.weight(SoftConstraint::RoomTypeMismatch);
        if w > 0.0 {
            for (i, p) in schedule.placed() {
                let required = problem.sessions[i].session.required_room_type;
                if let Some(room) = problem.rooms.get(p.room) {
                    if room.room_type != required && room.room_type.accepts(required) {
                        contributions.push(SoftContribution {
                            constraint: SoftConstraint::RoomTypeMismatch,
                            entity: Entity::Session(i),
                            cost: w,
                        });
                    }
                }
            }
        }

        // Overlapping electives of different groups sharing a cohort
        let w = weights.weight(SoftConstraint::ElectiveClash);
        if w > 0.0 {
            let mut clashes: BTreeMap<usize, usize> = BTreeMap::new();
            for sessions in sessions_by_day(schedule).values() {
                for (a_pos, &(a, pa)) in sessions.iter().enumerate() {
                    for &(b, pb) in &sessions[a_pos + 1..] {
                        let (sa, sb) = (&problem.sessions[a], &problem.sessions[b]);
                        if problem.elective_clash(a, b)
                            && pa.overlaps(sa.duration(), &pb, sb.duration())
                        {
                            for &c in sa.cohorts.iter().filter(|c| sb.cohorts.contains(c)) {
                                *clashes.entry(c).or_default() += 1;
                            }
                        }
                    }
                }
            }
            for (c, count) in clashes {
                contributions.push(SoftContribution {
                    constraint: SoftConstraint::ElectiveClash,
                    entity: Entity::Cohort(c),
                    cost: w * count as f64,
                });
            }
        }

        let mut breakdown: BTreeMap<SoftConstraint, f64> = SoftConstraint::ALL
            .into_iter()
            .filter(|c| weights.weight(*c) > 0.0)
            .map(|c| (c, 0.0))
            .collect();
        let mut per_entity: BTreeMap<Entity, f64> = BTreeMap::new();
        for contribution in &contributions {
            *breakdown.entry(contribution.constraint).or_default() += contribution.cost;
            *per_entity.entry(contribution.entity).or_default() += contribution.cost;
        }
        let total = breakdown.values().sum();
        let max_entity_cost = per_entity.values().copied().fold(0.0, f64::max);

        SoftScore {
            total,
            breakdown,
            contributions,
            max_entity_cost,
        }
    }
}

fn occupied_slots<'a>(
    problem: &'a Problem,
    placement: &'a Placement,
    duration: u8,
) -> impl Iterator<Item = TimeSlot> + 'a {
    placement
        .periods(duration)
        .filter(move |&period| period < problem.periods_per_day)
        .map(move |period| TimeSlot::new(placement.start.day, period))
}

fn sessions_by_day(schedule: &Schedule) -> BTreeMap<u8, Vec<(usize, Placement)>> {
    let mut days: BTreeMap<u8, Vec<(usize, Placement)>> = BTreeMap::new();
    for (i, p) in schedule.placed() {
        days.entry(p.start.day).or_default().push((i, p));
    }
    days
}

/// Credits and session indices per day for sessions matching `attends`.
fn daily_credits(
    problem: &Problem,
    schedule: &Schedule,
    attends: impl Fn(usize) -> bool,
) -> BTreeMap<u8, (u32, Vec<usize>)> {
    let mut days: BTreeMap<u8, (u32, Vec<usize>)> = BTreeMap::new();
    for (i, p) in schedule.placed() {
        if attends(i) {
            let entry = days.entry(p.start.day).or_default();
            entry.0 += problem.sessions[i].session.credit_weight;
            entry.1.push(i);
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::{elective_config, small_config, small_problem};
    use crate::domain::{Placement, Problem};

    fn tags(violations: &[Violation]) -> Vec<HardConstraint> {
        violations.iter().map(|v| v.constraint).collect()
    }

    fn feasible_schedule() -> Schedule {
        let mut schedule = Schedule::unassigned(3);
        schedule.set(0, Some(Placement::new(0, 0, 2)));
        schedule.set(1, Some(Placement::new(0, 0, 0)));
        schedule.set(2, Some(Placement::new(2, 1, 2)));
        schedule
    }

    /// Feasible schedule plus both electives side by side on Wednesday morning.
    fn elective_schedule() -> Schedule {
        let mut schedule = Schedule::unassigned(5);
        for (i, p) in feasible_schedule().placed() {
            schedule.set(i, Some(p));
        }
        schedule.set(3, Some(Placement::new(0, 2, 0)));
        schedule.set(4, Some(Placement::new(1, 2, 0)));
        schedule
    }

    #[test]
    fn test_feasible_schedule_has_no_violations() {
        let problem = small_problem();
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &feasible_schedule());
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_unscheduled_sessions_reported_in_order() {
        let problem = small_problem();
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &Schedule::unassigned(3));
        assert_eq!(tags(&violations), vec![HardConstraint::Unscheduled; 3]);
        assert_eq!(violations[2].sessions, vec![2]);
    }

    #[test]
    fn test_double_booking_reports_each_resource() {
        let problem = small_problem();
        let mut schedule = feasible_schedule();
        // CS101 lecture on top of MA101 in the same room.
        schedule.set(0, Some(Placement::new(0, 0, 0)));
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &schedule);
        assert_eq!(
            tags(&violations),
            vec![HardConstraint::RoomDoubleBooking, HardConstraint::CohortDoubleBooking]
        );
        assert_eq!(violations[0].sessions, vec![0, 1]);
        assert_eq!(violations[1].cohort, Some(0));
    }

    #[test]
    fn test_disabled_constraint_is_skipped() {
        let mut config = small_config();
        config.constraints = ConstraintSet::default().without(HardConstraint::Unscheduled);
        let problem = Problem::from_config(&config).unwrap();
        assert!(ConstraintEvaluator
            .evaluate_hard(&problem, &Schedule::unassigned(3))
            .is_empty());
    }

    #[test]
    fn test_practical_straddling_break() {
        let problem = small_problem();
        let mut schedule = feasible_schedule();
        // Break after period 1; the practical covers periods 1 and 2.
        schedule.set(2, Some(Placement::new(2, 1, 1)));
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &schedule);
        assert_eq!(tags(&violations), vec![HardConstraint::PracticalContinuity]);
    }

    #[test]
    fn test_capacity_and_availability() {
        let mut config = small_config();
        config.cohorts[0].size = 80;
        let problem = Problem::from_config(&config).unwrap();
        let mut schedule = feasible_schedule();
        schedule.set(1, Some(Placement::new(0, 2, 0)));
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &schedule);
        let capacity: Vec<_> = violations
            .iter()
            .filter(|v| v.constraint == HardConstraint::RoomCapacity)
            .collect();
        assert_eq!(capacity.len(), 3);
        assert_eq!(capacity[0].amount, 80);
        assert_eq!(capacity[0].limit, Some(60));
        assert!(tags(&violations).contains(&HardConstraint::FacultyUnavailable));
    }

    #[test]
    fn test_credit_overflow_per_day() {
        let mut config = small_config();
        config.cohorts[0].max_credits_per_day = Some(2);
        let problem = Problem::from_config(&config).unwrap();
        let mut schedule = feasible_schedule();
        schedule.set(2, Some(Placement::new(2, 0, 2)));
        schedule.set(0, Some(Placement::new(1, 1, 0)));
        assert!(ConstraintEvaluator.evaluate_hard(&problem, &schedule).is_empty());

        schedule.set(0, Some(Placement::new(0, 0, 1)));
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &schedule);
        assert_eq!(tags(&violations), vec![HardConstraint::CohortCreditOverflow]);
        assert_eq!(violations[0].amount, 3);
        assert_eq!(violations[0].day, Some(0));
    }

    #[test]
    fn test_faculty_credit_overflow_per_day() {
        let mut config = small_config();
        config.faculty[0].max_credits_per_day = Some(1);
        let problem = Problem::from_config(&config).unwrap();
        let mut schedule = feasible_schedule();
        assert!(ConstraintEvaluator.evaluate_hard(&problem, &schedule).is_empty());

        // Dr. Rao's lecture joins the Tuesday practical.
        schedule.set(0, Some(Placement::new(0, 1, 0)));
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &schedule);
        assert_eq!(tags(&violations), vec![HardConstraint::FacultyCreditOverflow]);
        assert_eq!(violations[0].faculty, Some(0));
        assert_eq!(violations[0].day, Some(1));
        assert_eq!(violations[0].amount, 2);
        assert_eq!(violations[0].limit, Some(1));
    }

    #[test]
    fn test_missing_equipment_reported() {
        let mut config = small_config();
        config.rooms[2].equipment_tags.clear();
        let problem = Problem::from_config(&config).unwrap();
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &feasible_schedule());
        assert_eq!(tags(&violations), vec![HardConstraint::MissingEquipment]);
        assert_eq!(violations[0].sessions, vec![2]);
        assert_eq!(violations[0].room, Some(2));
        assert_eq!(violations[0].amount, 1);
    }

    #[test]
    fn test_cohort_blackout_reported() {
        let mut config = small_config();
        config.cohorts[0].blackouts.insert(TimeSlot::new(1, 3));
        let problem = Problem::from_config(&config).unwrap();
        // The practical's second period lands on the blackout.
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &feasible_schedule());
        assert_eq!(tags(&violations), vec![HardConstraint::CohortUnavailable]);
        assert_eq!(violations[0].cohort, Some(0));
        assert_eq!(violations[0].slot, Some(TimeSlot::new(1, 3)));
    }

    #[test]
    fn test_electives_may_share_cohort_slot() {
        for groups in [("OE-A", "OE-B"), ("OE-A", "OE-A")] {
            let problem = Problem::from_config(&elective_config(groups.0, groups.1)).unwrap();
            let violations = ConstraintEvaluator.evaluate_hard(&problem, &elective_schedule());
            assert!(violations.is_empty(), "{:?}", violations);
        }

        // A core lecture in the same slot still double books the cohort.
        let problem = Problem::from_config(&elective_config("OE-A", "OE-B")).unwrap();
        let mut schedule = elective_schedule();
        schedule.set(0, Some(Placement::new(2, 2, 0)));
        let violations = ConstraintEvaluator.evaluate_hard(&problem, &schedule);
        assert!(tags(&violations).contains(&HardConstraint::CohortDoubleBooking));
    }

    #[test]
    fn test_elective_clash_cost() {
        let problem = Problem::from_config(&elective_config("OE-A", "OE-B")).unwrap();
        let soft = ConstraintEvaluator.evaluate_soft(
            &problem,
            &elective_schedule(),
            &problem.constraints,
        );
        assert_eq!(soft.breakdown[&SoftConstraint::ElectiveClash], 2.0);
        let clash: Vec<_> = soft
            .contributions
            .iter()
            .filter(|c| c.constraint == SoftConstraint::ElectiveClash)
            .collect();
        assert_eq!(clash.len(), 1);
        assert_eq!(clash[0].entity, Entity::Cohort(0));

        // Alternatives within one group are not a clash.
        let problem = Problem::from_config(&elective_config("OE-A", "OE-A")).unwrap();
        let soft = ConstraintEvaluator.evaluate_soft(
            &problem,
            &elective_schedule(),
            &problem.constraints,
        );
        assert_eq!(soft.breakdown[&SoftConstraint::ElectiveClash], 0.0);

        // Apart in time they do not clash either.
        let problem = Problem::from_config(&elective_config("OE-A", "OE-B")).unwrap();
        let mut schedule = elective_schedule();
        schedule.set(4, Some(Placement::new(1, 2, 1)));
        let soft = ConstraintEvaluator.evaluate_soft(&problem, &schedule, &problem.constraints);
        assert_eq!(soft.breakdown[&SoftConstraint::ElectiveClash], 0.0);
    }

    #[test]
    fn test_faculty_workload_variance_cost() {
        let problem = small_problem();
        // Dr. Rao teaches 3 periods and Dr. Iyer 1: mean 2.
        let soft = ConstraintEvaluator.evaluate_soft(
            &problem,
            &feasible_schedule(),
            &problem.constraints,
        );
        assert_eq!(soft.breakdown[&SoftConstraint::FacultyWorkloadVariance], 0.5);
        let costs: Vec<_> = soft
            .contributions
            .iter()
            .filter(|c| c.constraint == SoftConstraint::FacultyWorkloadVariance)
            .map(|c| (c.entity, c.cost))
            .collect();
        assert_eq!(
            costs,
            vec![(Entity::Faculty(0), 0.25), (Entity::Faculty(1), 0.25)]
        );

        // One period each.
        let mut schedule = feasible_schedule();
        schedule.set(2, None);
        let soft = ConstraintEvaluator.evaluate_soft(&problem, &schedule, &problem.constraints);
        assert_eq!(soft.breakdown[&SoftConstraint::FacultyWorkloadVariance], 0.0);
    }

    #[test]
    fn test_idle_gap_cost() {
        let problem = small_problem();
        let mut schedule = feasible_schedule();
        schedule.set(2, Some(Placement::new(2, 1, 2)));
        let soft = ConstraintEvaluator.evaluate_soft(
            &problem,
            &schedule,
            &ConstraintSet::default().with_weight(SoftConstraint::FacultyWorkloadVariance, 0.0),
        );
        // Periods 0 and 2 on Monday leave one idle period.
        assert_eq!(soft.breakdown[&SoftConstraint::CohortIdleGaps], 1.0);
        assert_eq!(soft.total, 1.0);
        assert_eq!(soft.max_entity_cost, 1.0);
    }

    #[test]
    fn test_room_type_mismatch_cost() {
        let mut config = small_config();
        config.rooms[1].room_type = crate::domain::RoomType::Classroom;
        let problem = Problem::from_config(&config).unwrap();
        let mut schedule = feasible_schedule();
        schedule.set(0, Some(Placement::new(1, 0, 1)));
        let soft = ConstraintEvaluator.evaluate_soft(&problem, &schedule, &problem.constraints);
        assert_eq!(soft.breakdown[&SoftConstraint::RoomTypeMismatch], 1.0);
        assert!(soft
            .contributions
            .iter()
            .any(|c| c.entity == Entity::Session(0)));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let problem = small_problem();
        let schedule = feasible_schedule();
        let first = ConstraintEvaluator.score(&problem, &schedule);
        for _ in 0..5 {
            let again = ConstraintEvaluator.score(&problem, &schedule);
            assert_eq!(again.0, first.0);
            assert_eq!(again.1.total.to_bits(), first.1.total.to_bits());
        }
    }

    #[test]
    fn test_score_ordering_prefers_fairness_on_ties() {
        let a = Score { hard: 0, soft: 4.0, fairness: 1.0 };
        let b = Score { hard: 0, soft: 4.0 + 1e-12, fairness: 3.0 };
        assert!(a.is_better_than(&b));
        assert_eq!(a.compare(&a), Ordering::Equal);
    }

    #[test]
    fn test_constraint_set_serde_tags() {
        let json = serde_json::to_value(ConstraintSet::default()).unwrap();
        let hard = json["hard"].as_array().unwrap();
        assert_eq!(hard[0], "unscheduled");
        assert_eq!(json["soft"]["elective-clash"], 2.0);
    }
}
