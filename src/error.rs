//! Error taxonomy for the timetable engine.
//!
//! - [`ConfigurationError`]: a malformed [`ScenarioConfig`](crate::domain::ScenarioConfig),
//!   rejected at submission before any run exists
//! - [`DomainError`]: malformed input to a domain predicate
//! - [`EngineError`] / [`SearchFailure`]: an internal invariant broke mid-run
//! - [`RunError`]: library callers asking for something a run cannot give
//! - [`ServiceConfigError`]: bad environment configuration for the service

use thiserror::Error;
use uuid::Uuid;

use crate::constraints::SoftConstraint;
use crate::domain::{Schedule, TimeSlot};
use crate::solver::RunStatus;

/// A scenario that cannot be turned into a [`Problem`](crate::domain::Problem).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("term start and end dates are required")]
    MissingTermDates,
    #[error("term must end after it starts ({start} .. {end})")]
    InvalidTerm {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
    #[error("scenario has no cohorts")]
    NoCohorts,
    #[error("scenario has no rooms")]
    NoRooms,
    #[error("scenario has no working days")]
    NoWorkingDays,
    #[error("working day {0} is listed more than once")]
    DuplicateWorkingDay(chrono::Weekday),
    #[error("a week has at most 7 working days, got {0}")]
    TooManyWorkingDays(usize),
    #[error("periods per day and period duration must be positive")]
    NoPeriods,
    #[error("teaching day of {periods} x {minutes} min periods does not fit in one day")]
    DayOverflow { periods: u8, minutes: u16 },
    #[error("time budget must be within (0, 1440] minutes, got {0}")]
    InvalidTimeBudget(f64),
    #[error("weight {weight} for {constraint:?} is outside [0, 5]")]
    WeightOutOfRange {
        constraint: SoftConstraint,
        weight: f64,
    },
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{referenced_by} references unknown {kind} '{id}'")]
    UnknownReference {
        kind: &'static str,
        id: String,
        referenced_by: String,
    },
    #[error("session '{session}' has duration {duration}, must be within 1..={periods_per_day}")]
    InvalidDuration {
        session: String,
        duration: u8,
        periods_per_day: u8,
    },
    #[error("{owner} lists slot {slot:?} outside the teaching grid")]
    SlotOutOfGrid { owner: String, slot: TimeSlot },
}

/// Malformed arguments to [`Problem::can_place`](crate::domain::Problem::can_place).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("unknown session index {0}")]
    UnknownSession(usize),
    #[error("unknown room index {0}")]
    UnknownRoom(usize),
    #[error("unknown session id '{0}'")]
    UnknownSessionId(String),
    #[error("unknown room id '{0}'")]
    UnknownRoomId(String),
    #[error("session '{0}' has zero duration")]
    ZeroDuration(String),
    #[error("day {day} is outside the {working_days}-day week")]
    DayOutOfRange { day: u8, working_days: usize },
    #[error("schedule covers {actual} sessions, scenario has {expected}")]
    ScheduleShape { expected: usize, actual: usize },
}

/// An invariant violation inside the evaluator or the search loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("evaluator produced invalid soft cost {0}")]
    InvalidCost(f64),
    #[error("malformed candidate: {0}")]
    MalformedCandidate(String),
}

/// An [`EngineError`] together with the last schedule the engine held.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct SearchFailure {
    pub error: EngineError,
    pub last_schedule: Option<Schedule>,
}

/// Errors returned by [`RunService`](crate::solver::RunService) lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("run {0} not found")]
    NotFound(Uuid),
    #[error("run {id} has no result (status {status:?})")]
    NotCompleted { id: Uuid, status: RunStatus },
}

/// Illegal run status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move run from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// Invalid environment variable for [`ServiceConfig`](crate::config::ServiceConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value '{value}' for {name}")]
pub struct ServiceConfigError {
    pub name: &'static str,
    pub value: String,
}
