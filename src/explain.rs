//! Plain-language diagnostics for a scored schedule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::constraints::{Entity, HardConstraint, SoftConstraint, SoftScore, Violation};
use crate::domain::{Problem, Schedule};

/// Default number of soft contributors listed in a report.
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViolationExplanation {
    pub constraint: HardConstraint,
    pub sessions: Vec<String>,
    pub message: String,
}

/// A soft constraint's share of the total cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankedCost {
    pub constraint: SoftConstraint,
    pub label: String,
    pub cost: f64,
    /// Fraction of the soft total, 0 when the total is 0.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    pub constraint: SoftConstraint,
    pub entity: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockedMoves {
    pub constraint: HardConstraint,
    pub count: u64,
}

/// Explainability report attached to every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub feasible: bool,
    pub hard_violation_count: usize,
    pub soft_total: f64,
    /// One entry per violation, in evaluator order.
    pub violations: Vec<ViolationExplanation>,
    /// Soft constraints by descending cost.
    pub soft_breakdown: Vec<RankedCost>,
    pub top_contributors: Vec<Contributor>,
    /// Moves rejected during search, by the constraint they would have broken.
    pub blocked_moves: Vec<BlockedMoves>,
    pub summary: String,
}

impl Report {
    pub fn with_blocked_moves(mut self, blocked: &BTreeMap<HardConstraint, u64>) -> Self {
        let mut moves: Vec<BlockedMoves> = blocked
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(&constraint, &count)| BlockedMoves { constraint, count })
            .collect();
        moves.sort_by(|a, b| b.count.cmp(&a.count).then(a.constraint.cmp(&b.constraint)));
        self.blocked_moves = moves;
        self
    }
}

/// Builds a report for `schedule` from its evaluated violations and soft score.
///
/// # Examples
///
/// ```
/// use timely_scheduler::constraints::{ConstraintEvaluator, Evaluator, HardConstraint};
/// use timely_scheduler::demo_data::{generate, DemoData};
/// use timely_scheduler::domain::{Problem, Schedule};
/// use timely_scheduler::explain::explain;
///
/// let problem = Problem::from_config(&generate(DemoData::Small)).unwrap();
/// let schedule = Schedule::unassigned(problem.sessions.len());
/// let (violations, soft) = ConstraintEvaluator.score(&problem, &schedule);
///
/// let report = explain(&problem, &schedule, &violations, &soft, 3);
/// assert_eq!(report.violations.len(), violations.len());
/// assert_eq!(report.violations[0].constraint, HardConstraint::Unscheduled);
/// assert!(!report.feasible);
/// ```
pub fn explain(
    problem: &Problem,
    schedule: &Schedule,
    violations: &[Violation],
    soft: &SoftScore,
    top_n: usize,
) -> Report {
    let explanations: Vec<ViolationExplanation> = violations
        .iter()
        .map(|v| ViolationExplanation {
            constraint: v.constraint,
            sessions: v
                .sessions
                .iter()
                .filter_map(|&s| problem.sessions.get(s).map(|p| p.session.id.clone()))
                .collect(),
            message: describe(problem, schedule, v),
        })
        .collect();

    let mut soft_breakdown: Vec<RankedCost> = soft
        .breakdown
        .iter()
        .map(|(&constraint, &cost)| RankedCost {
            constraint,
            label: constraint.label().to_string(),
            cost,
            share: if soft.total > 0.0 { cost / soft.total } else { 0.0 },
        })
        .collect();
    soft_breakdown.sort_by(|a, b| b.cost.total_cmp(&a.cost).then(a.constraint.cmp(&b.constraint)));

    let mut ranked: Vec<_> = soft.contributions.iter().filter(|c| c.cost > 0.0).collect();
    ranked.sort_by(|a, b| b.cost.total_cmp(&a.cost));
    let top_contributors = ranked
        .into_iter()
        .take(top_n)
        .map(|c| Contributor {
            constraint: c.constraint,
            entity: entity_name(problem, c.entity),
            cost: c.cost,
        })
        .collect();

    let feasible = violations.is_empty();
    let summary = if feasible {
        format!(
            "Feasible timetable: {} of {} sessions placed, soft cost {:.3}",
            schedule.placed_count(),
            problem.sessions.len(),
            soft.total
        )
    } else {
        let mut counts: BTreeMap<HardConstraint, usize> = BTreeMap::new();
        for v in violations {
            *counts.entry(v.constraint).or_default() += 1;
        }
        let parts: Vec<String> = counts
            .iter()
            .map(|(c, n)| format!("{} {}", n, c.label()))
            .collect();
        format!(
            "Infeasible timetable: {} hard violations ({})",
            violations.len(),
            parts.join(", ")
        )
    };

    Report {
        feasible,
        hard_violation_count: violations.len(),
        soft_total: soft.total,
        violations: explanations,
        soft_breakdown,
        top_contributors,
        blocked_moves: Vec::new(),
        summary,
    }
}

fn describe(problem: &Problem, schedule: &Schedule, v: &Violation) -> String {
    let session = |i: usize| {
        problem
            .sessions
            .get(i)
            .map(|p| p.session.id.clone())
            .unwrap_or_else(|| format!("session #{}", i))
    };
    let first = v.sessions.first().map(|&s| session(s)).unwrap_or_default();
    let pair = || {
        v.sessions
            .iter()
            .map(|&s| session(s))
            .collect::<Vec<_>>()
            .join(" and ")
    };
    let room = || {
        v.room
            .and_then(|r| problem.rooms.get(r))
            .map(|r| r.id.clone())
            .unwrap_or_else(|| "room".to_string())
    };
    let faculty = || {
        v.faculty
            .and_then(|f| problem.faculty.get(f))
            .map(|f| f.display_name().to_string())
            .unwrap_or_else(|| "faculty".to_string())
    };
    let cohort = || {
        v.cohort
            .and_then(|c| problem.cohorts.get(c))
            .map(|c| c.id.clone())
            .unwrap_or_else(|| "cohort".to_string())
    };
    let slot = || v.slot.map(|s| problem.slot_label(s)).unwrap_or_default();
    let day = || v.day.map(|d| problem.day_label(d)).unwrap_or_default();
    let limit = v.limit.unwrap_or_default();

    match v.constraint {
        HardConstraint::Unscheduled => {
            let course = v
                .sessions
                .first()
                .and_then(|&s| problem.sessions.get(s))
                .map(|p| p.session.course_code.as_str())
                .unwrap_or_default();
            format!("{} ({}) could not be scheduled", first, course)
        }
        HardConstraint::RoomDoubleBooking => {
            format!("{} double-booked {}: {}", room(), slot(), pair())
        }
        HardConstraint::FacultyDoubleBooking => {
            format!("{} double-booked {}: {}", faculty(), slot(), pair())
        }
        HardConstraint::CohortDoubleBooking => {
            format!("{} double-booked {}: {}", cohort(), slot(), pair())
        }
        HardConstraint::RoomUnavailable => {
            format!("{} unavailable {}: room blackout for {}", room(), slot(), first)
        }
        HardConstraint::FacultyUnavailable => format!(
            "{} unavailable {}: outside teaching availability for {}",
            faculty(),
            slot(),
            first
        ),
        HardConstraint::CohortUnavailable => {
            format!("{} unavailable {}: cohort blackout for {}", cohort(), slot(), first)
        }
        HardConstraint::RoomCapacity => format!(
            "{} too small for {}: {} students, capacity {}",
            room(),
            first,
            v.amount,
            limit
        ),
        HardConstraint::RoomTypeIncompatible => {
            let (actual, required) = room_types(problem, schedule, v);
            format!("{} is a {}, {} needs a {}", room(), actual, first, required)
        }
        HardConstraint::MissingEquipment => {
            let missing = v
                .sessions
                .first()
                .and_then(|&s| {
                    let planned = problem.sessions.get(s)?;
                    let r = problem.rooms.get(v.room?)?;
                    Some(
                        planned
                            .session
                            .required_equipment
                            .difference(&r.equipment_tags)
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", "),
                    )
                })
                .unwrap_or_default();
            format!("{} lacks equipment for {}: missing {}", room(), first, missing)
        }
        HardConstraint::OutsideTeachingDay => {
            format!("{} starting {} runs past the last period", first, slot())
        }
        HardConstraint::CohortCreditOverflow => format!(
            "{} has {} credits on {}, limit {}",
            cohort(),
            v.amount,
            day(),
            limit
        ),
        HardConstraint::FacultyCreditOverflow => format!(
            "{} teaches {} credits on {}, limit {}",
            faculty(),
            v.amount,
            day(),
            limit
        ),
        HardConstraint::PracticalContinuity => {
            format!("{} straddles the break after {}", first, slot())
        }
    }
}

fn room_types(
    problem: &Problem,
    schedule: &Schedule,
    v: &Violation,
) -> (&'static str, &'static str) {
    let session = v.sessions.first().and_then(|&s| problem.sessions.get(s));
    let room = v
        .room
        .or_else(|| v.sessions.first().and_then(|&s| schedule.get(s)).map(|p| p.room))
        .and_then(|r| problem.rooms.get(r));
    (
        room.map(|r| r.room_type.as_str()).unwrap_or("room"),
        session
            .map(|s| s.session.required_room_type.as_str())
            .unwrap_or("room"),
    )
}

fn entity_name(problem: &Problem, entity: Entity) -> String {
    match entity {
        Entity::Cohort(c) => problem
            .cohorts
            .get(c)
            .map(|c| format!("cohort {}", c.id))
            .unwrap_or_default(),
        Entity::Faculty(f) => problem
            .faculty
            .get(f)
            .map(|f| format!("faculty {}", f.display_name()))
            .unwrap_or_default(),
        Entity::Session(s) => problem
            .sessions
            .get(s)
            .map(|s| format!("session {}", s.session.id))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintEvaluator, Evaluator};
    use crate::domain::tests::small_problem;
    use crate::domain::{Placement, TimeSlot};

    fn report_for(schedule: &Schedule) -> Report {
        let problem = small_problem();
        let (violations, soft) = ConstraintEvaluator.score(&problem, schedule);
        explain(&problem, schedule, &violations, &soft, 2)
    }

    #[test]
    fn test_room_blackout_message() {
        let mut schedule = Schedule::unassigned(3);
        schedule.set(0, Some(Placement::new(0, 0, 2)));
        schedule.set(1, Some(Placement::new(0, 0, 0)));
        schedule.set(2, Some(Placement::new(2, 1, 2)));
        let mut problem = small_problem();
        problem.rooms[2].blackouts.insert(TimeSlot::new(1, 3));
        let (violations, soft) = ConstraintEvaluator.score(&problem, &schedule);
        let report = explain(&problem, &schedule, &violations, &soft, 2);

        assert_eq!(report.violations.len(), 1);
        assert_eq!(
            report.violations[0].message,
            "CS-Lab-2 unavailable Tue 12:00: room blackout for CS101-P1"
        );
        assert_eq!(report.violations[0].sessions, vec!["CS101-P1".to_string()]);
    }

    #[test]
    fn test_every_violation_explained_once() {
        let mut schedule = Schedule::unassigned(3);
        schedule.set(0, Some(Placement::new(0, 0, 0)));
        schedule.set(1, Some(Placement::new(0, 0, 0)));
        let report = report_for(&schedule);
        assert_eq!(report.hard_violation_count, report.violations.len());
        assert_eq!(report.violations.len(), 3);
        assert_eq!(report.violations[0].message, "CS101-P1 (CS101) could not be scheduled");
        assert!(report.violations.iter().any(|v| v.message
            == "LH-1 double-booked Mon 09:00: CS101-L1 and MA101-L1"));
        assert!(report.summary.starts_with("Infeasible timetable: 3 hard violations"));
    }

    #[test]
    fn test_soft_breakdown_ranked_with_shares() {
        let mut schedule = Schedule::unassigned(3);
        schedule.set(0, Some(Placement::new(0, 0, 2)));
        schedule.set(1, Some(Placement::new(0, 0, 0)));
        schedule.set(2, Some(Placement::new(2, 1, 2)));
        let report = report_for(&schedule);
        assert!(report.feasible);
        assert!(report.soft_breakdown.windows(2).all(|w| w[0].cost >= w[1].cost));
        let shares: f64 = report.soft_breakdown.iter().map(|r| r.share).sum();
        assert!((shares - 1.0).abs() < 1e-9);
        assert!(report.top_contributors.len() <= 2);
        assert_eq!(report.top_contributors[0].entity, "cohort SEM1-A");
    }

    #[test]
    fn test_blocked_moves_sorted_by_count() {
        let report = report_for(&Schedule::unassigned(3)).with_blocked_moves(&BTreeMap::from([
            (HardConstraint::RoomDoubleBooking, 3),
            (HardConstraint::RoomCapacity, 9),
            (HardConstraint::Unscheduled, 0),
        ]));
        assert_eq!(
            report.blocked_moves,
            vec![
                BlockedMoves { constraint: HardConstraint::RoomCapacity, count: 9 },
                BlockedMoves { constraint: HardConstraint::RoomDoubleBooking, count: 3 },
            ]
        );
    }
}
