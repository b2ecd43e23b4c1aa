//! DTOs for REST API requests/responses.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::constraints::Score;
use crate::domain::{Assignment, Problem, ScenarioConfig, Schedule};
use crate::explain::Report;
use crate::search::StopReason;
use crate::solver::{InfeasibilityWarning, RunResult};

/// One scheduled session with every reference resolved to a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub session_id: String,
    pub course: String,
    pub title: String,
    pub kind: String,
    pub cohort: String,
    pub faculty: String,
    pub room: String,
    /// Weekday label, e.g. "Mon".
    pub day: String,
    /// Clock span, e.g. "09:00-10:40".
    pub slot: String,
    pub duration_slots: u8,
}

impl SessionRow {
    /// Rows for every placed session, ordered by day, start period and room.
    pub fn from_schedule(problem: &Problem, schedule: &Schedule) -> Vec<SessionRow> {
        let mut placed: Vec<_> = schedule.placed().collect();
        placed.sort_by_key(|(i, p)| (p.start.day, p.start.period, p.room, *i));

        placed
            .into_iter()
            .filter_map(|(i, p)| {
                let planned = problem.sessions.get(i)?;
                let session = &planned.session;
                let room = problem.rooms.get(p.room)?;
                let faculty = problem.faculty.get(planned.faculty)?;
                let cohort = problem
                    .cohorts
                    .iter()
                    .find(|c| c.id == session.cohort_id)
                    .map(|c| c.display_name().to_string())
                    .unwrap_or_else(|| session.cohort_id.clone());

                let start = problem.period_start(p.start.period);
                let minutes =
                    i64::from(problem.period_duration_minutes) * i64::from(planned.duration());
                let end = start + chrono::Duration::minutes(minutes);

                Some(SessionRow {
                    session_id: session.id.clone(),
                    course: session.course_code.clone(),
                    title: session.title.clone(),
                    kind: session.kind.as_str().to_string(),
                    cohort,
                    faculty: faculty.display_name().to_string(),
                    room: room.display_name().to_string(),
                    day: problem.day_label(p.start.day),
                    slot: format!("{}-{}", start.format("%H:%M"), end.format("%H:%M")),
                    duration_slots: planned.duration(),
                })
            })
            .collect()
    }
}

/// Finalized timetable of a completed run.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunResultDto {
    #[schema(value_type = String)]
    pub run_id: Uuid,
    #[schema(value_type = String)]
    pub schedule_id: Uuid,
    pub scenario: String,
    pub score: Score,
    /// Score rendered as "0hard/12.000soft".
    pub score_text: String,
    pub feasible: bool,
    pub stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<InfeasibilityWarning>,
    pub iterations: u64,
    pub assignments: Vec<Assignment>,
    pub rows: Vec<SessionRow>,
    pub report: Report,
}

impl RunResultDto {
    pub fn from_result(result: &RunResult) -> Self {
        Self {
            run_id: result.run_id,
            schedule_id: result.schedule_id,
            scenario: result.problem.name.clone(),
            score: result.score,
            score_text: result.score.to_string(),
            feasible: result.score.is_feasible(),
            stop_reason: result.stop_reason,
            warning: result.warning.clone(),
            iterations: result.stats.iterations,
            assignments: result.assignments.clone(),
            rows: SessionRow::from_schedule(&result.problem, &result.schedule),
            report: result.report.clone(),
        }
    }
}

/// A schedule to score without running the search.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub score: Score,
    pub score_text: String,
    pub rows: Vec<SessionRow>,
    pub report: Report,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "UP" when healthy.
    pub status: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub solver_engine: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::small_problem;
    use crate::domain::Placement;

    #[test]
    fn test_rows_resolve_names_and_order_by_time() {
        let problem = small_problem();
        let mut schedule = Schedule::unassigned(problem.sessions.len());
        let ma = problem.session_index("MA101-L1").unwrap();
        let cs = problem.session_index("CS101-P1").unwrap();
        let lh1 = problem.room_index("LH-1").unwrap();
        let lab = problem.room_index("CS-Lab-2").unwrap();
        schedule.set(cs, Some(Placement::new(lab, 1, 2)));
        schedule.set(ma, Some(Placement::new(lh1, 0, 0)));

        let rows = SessionRow::from_schedule(&problem, &schedule);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session_id, "MA101-L1");
        assert_eq!(rows[0].day, "Mon");
        assert_eq!(rows[0].slot, "09:00-10:00");

        assert_eq!(rows[1].course, "CS101");
        assert_eq!(rows[1].kind, "Practical");
        assert_eq!(rows[1].day, "Tue");
        assert_eq!(rows[1].slot, "11:00-13:00");
        assert_eq!(rows[1].duration_slots, 2);
    }
}
