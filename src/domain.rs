//! Domain model for university timetabling.
//!
//! # Overview
//!
//! - [`Session`]: a teaching event (lecture, tutorial, practical) to be placed
//! - [`Room`], [`Faculty`], [`Cohort`]: reference data shared read-only by runs
//! - [`TimeSlot`]: one (day, period) cell of the weekly grid
//! - [`ScenarioConfig`]: the serialized scenario a caller submits
//! - [`Problem`]: validated, indexed snapshot of a scenario
//! - [`Schedule`]: one optional [`Placement`] per session, the only mutable part
//!
//! # Design
//!
//! Sessions, rooms, faculty and cohorts are addressed by their position in the
//! [`Problem`] vectors. String ids only appear at the edges, in
//! [`ScenarioConfig`] and [`Assignment`].

use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use utoipa::ToSchema;

use crate::constraints::{ConstraintSet, SoftConstraint};
use crate::error::{ConfigurationError, DomainError};

/// Default first period start.
const DEFAULT_DAY_START: (u32, u32) = (9, 0);

/// Highest accepted soft weight.
pub const MAX_WEIGHT: f64 = 5.0;

/// Longest accepted run budget: one day.
pub const MAX_TIME_BUDGET_MINUTES: f64 = 24.0 * 60.0;

/// One cell of the weekly teaching grid.
///
/// `day` indexes [`ScenarioConfig::working_days`], `period` counts from the
/// first period of the day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub struct TimeSlot {
    pub day: u8,
    pub period: u8,
}

impl TimeSlot {
    pub const fn new(day: u8, period: u8) -> Self {
        Self { day, period }
    }
}

/// Kind of teaching session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SessionKind {
    Lecture,
    Tutorial,
    Practical,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Lecture => "Lecture",
            SessionKind::Tutorial => "Tutorial",
            SessionKind::Practical => "Practical",
        }
    }
}

/// Room category.
///
/// General purpose rooms (lecture halls, classrooms, seminar rooms) can stand
/// in for each other; labs only host sessions that ask for that exact type.
///
/// ```
/// use timely_scheduler::domain::RoomType;
///
/// assert!(RoomType::LectureHall.accepts(RoomType::Classroom));
/// assert!(!RoomType::Classroom.accepts(RoomType::Lab));
/// assert!(!RoomType::ComputerLab.accepts(RoomType::Lab));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum RoomType {
    LectureHall,
    Classroom,
    Seminar,
    Lab,
    ComputerLab,
}

impl RoomType {
    pub fn is_general_purpose(self) -> bool {
        matches!(
            self,
            RoomType::LectureHall | RoomType::Classroom | RoomType::Seminar
        )
    }

    /// Returns true if a room of this type can host a session requiring `required`.
    pub fn accepts(self, required: RoomType) -> bool {
        self == required || (self.is_general_purpose() && required.is_general_purpose())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomType::LectureHall => "lecture hall",
            RoomType::Classroom => "classroom",
            RoomType::Seminar => "seminar room",
            RoomType::Lab => "lab",
            RoomType::ComputerLab => "computer lab",
        }
    }
}

/// A bookable room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub capacity: u32,
    #[serde(default)]
    pub equipment_tags: BTreeSet<String>,
    /// Authoritative exclusions, never assignable.
    #[serde(default)]
    pub blackouts: BTreeSet<TimeSlot>,
}

impl Room {
    pub fn new(id: impl Into<String>, room_type: RoomType, capacity: u32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            room_type,
            capacity,
            equipment_tags: BTreeSet::new(),
            blackouts: BTreeSet::new(),
        }
    }

    pub fn with_equipment(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.equipment_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_blackouts(mut self, slots: impl IntoIterator<Item = TimeSlot>) -> Self {
        self.blackouts.extend(slots);
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A faculty member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Slots the faculty member may teach in. Empty means unrestricted.
    #[serde(default)]
    pub availability: BTreeSet<TimeSlot>,
    #[serde(default)]
    pub max_credits_per_day: Option<u32>,
}

impl Faculty {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            availability: BTreeSet::new(),
            max_credits_per_day: None,
        }
    }

    pub fn with_availability(mut self, slots: impl IntoIterator<Item = TimeSlot>) -> Self {
        self.availability.extend(slots);
        self
    }

    pub fn with_max_credits_per_day(mut self, max: u32) -> Self {
        self.max_credits_per_day = Some(max);
        self
    }

    pub fn is_available(&self, slot: TimeSlot) -> bool {
        self.availability.is_empty() || self.availability.contains(&slot)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A group of students taking the same sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub program: Option<String>,
    pub size: u32,
    /// Sessions owned by another cohort that this cohort also attends.
    #[serde(default)]
    pub enrolled_sessions: BTreeSet<String>,
    #[serde(default)]
    pub blackouts: BTreeSet<TimeSlot>,
    #[serde(default)]
    pub max_credits_per_day: Option<u32>,
}

impl Cohort {
    pub fn new(id: impl Into<String>, size: u32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            program: None,
            size,
            enrolled_sessions: BTreeSet::new(),
            blackouts: BTreeSet::new(),
            max_credits_per_day: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_max_credits_per_day(mut self, max: u32) -> Self {
        self.max_credits_per_day = Some(max);
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A degree program offered in the term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub semester: Option<u8>,
}

/// A weekly teaching event.
///
/// ```
/// use timely_scheduler::domain::{RoomType, Session, SessionKind};
///
/// let lab = Session::new("CS101-P1", "CS101", SessionKind::Practical, "SEM1-A", "F-RAO")
///     .with_room_type(RoomType::ComputerLab)
///     .with_duration(2);
///
/// assert_eq!(lab.duration_slots, 2);
/// assert_eq!(lab.credit_weight, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub course_code: String,
    #[serde(default)]
    pub title: String,
    pub kind: SessionKind,
    pub cohort_id: String,
    pub faculty_id: String,
    pub required_room_type: RoomType,
    #[serde(default = "default_duration")]
    pub duration_slots: u8,
    #[serde(default = "default_credit_weight")]
    pub credit_weight: u32,
    #[serde(default)]
    pub required_equipment: BTreeSet<String>,
    /// Parallel electives of one basket share this group.
    #[serde(default)]
    pub elective_group: Option<String>,
    /// Sessions with the same group may share room and time.
    #[serde(default)]
    pub colocation_group: Option<String>,
}

fn default_duration() -> u8 {
    1
}

fn default_credit_weight() -> u32 {
    1
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        course_code: impl Into<String>,
        kind: SessionKind,
        cohort_id: impl Into<String>,
        faculty_id: impl Into<String>,
    ) -> Self {
        let required_room_type = match kind {
            SessionKind::Lecture => RoomType::LectureHall,
            SessionKind::Tutorial => RoomType::Classroom,
            SessionKind::Practical => RoomType::Lab,
        };
        Self {
            id: id.into(),
            course_code: course_code.into(),
            title: String::new(),
            kind,
            cohort_id: cohort_id.into(),
            faculty_id: faculty_id.into(),
            required_room_type,
            duration_slots: 1,
            credit_weight: 1,
            required_equipment: BTreeSet::new(),
            elective_group: None,
            colocation_group: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_room_type(mut self, room_type: RoomType) -> Self {
        self.required_room_type = room_type;
        self
    }

    pub fn with_duration(mut self, slots: u8) -> Self {
        self.duration_slots = slots;
        self
    }

    pub fn with_credits(mut self, credits: u32) -> Self {
        self.credit_weight = credits;
        self
    }

    pub fn with_equipment(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_equipment
            .extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_elective_group(mut self, group: impl Into<String>) -> Self {
        self.elective_group = Some(group.into());
        self
    }

    pub fn with_colocation_group(mut self, group: impl Into<String>) -> Self {
        self.colocation_group = Some(group.into());
        self
    }
}

/// Teaching term bounds. Both dates are required; they are optional here so
/// a missing date surfaces as [`ConfigurationError::MissingTermDates`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Term {
    #[serde(default)]
    #[schema(value_type = Option<String>, format = Date)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = Date)]
    pub end: Option<NaiveDate>,
}

/// Optional step-based termination on top of the time budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unimproved_step_limit: Option<u64>,
}

/// A timetable generation request.
///
/// Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub term: Term,
    #[schema(value_type = Vec<String>)]
    pub working_days: Vec<Weekday>,
    pub periods_per_day: u8,
    pub period_duration_minutes: u16,
    #[serde(default = "default_day_start")]
    #[schema(value_type = String, example = "09:00:00")]
    pub day_start: NaiveTime,
    /// Periods that are followed by a break (e.g. lunch after period 3).
    #[serde(default)]
    pub breaks_after: BTreeSet<u8>,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub faculty: Vec<Faculty>,
    #[serde(default)]
    pub cohorts: Vec<Cohort>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub constraints: ConstraintSet,
    pub time_budget_minutes: f64,
    #[serde(default)]
    pub termination: TerminationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(DEFAULT_DAY_START.0, DEFAULT_DAY_START.1, 0).unwrap_or(NaiveTime::MIN)
}

/// Where a session runs: a room and a starting slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub room: usize,
    pub start: TimeSlot,
}

impl Placement {
    pub const fn new(room: usize, day: u8, period: u8) -> Self {
        Self {
            room,
            start: TimeSlot::new(day, period),
        }
    }

    /// Returns the periods `[start, start + duration)` on the placement day.
    pub fn periods(&self, duration: u8) -> std::ops::Range<u8> {
        self.start.period..self.start.period.saturating_add(duration)
    }

    /// Returns true if two placements share a day and their period ranges intersect.
    ///
    /// ```
    /// use timely_scheduler::domain::Placement;
    ///
    /// let lab = Placement::new(0, 1, 2);      // Tue, periods 2..4
    /// let lecture = Placement::new(1, 1, 3);  // Tue, period 3
    /// assert!(lab.overlaps(2, &lecture, 1));
    /// assert!(!lab.overlaps(2, &Placement::new(1, 1, 4), 1));
    /// ```
    pub fn overlaps(&self, duration: u8, other: &Placement, other_duration: u8) -> bool {
        let a = self.periods(duration);
        let b = other.periods(other_duration);
        self.start.day == other.start.day && a.start < b.end && b.start < a.end
    }
}

/// The exported, id-based form of a placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub session_id: String,
    pub room_id: String,
    pub day: u8,
    pub start_slot: u8,
}

/// One optional placement per session, in scenario session order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    placements: Vec<Option<Placement>>,
}

impl Schedule {
    /// Creates a schedule with every session unscheduled.
    pub fn unassigned(session_count: usize) -> Self {
        Self {
            placements: vec![None; session_count],
        }
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn get(&self, session: usize) -> Option<Placement> {
        self.placements.get(session).copied().flatten()
    }

    pub fn set(&mut self, session: usize, placement: Option<Placement>) {
        if let Some(slot) = self.placements.get_mut(session) {
            *slot = placement;
        }
    }

    /// Iterates `(session index, placement)` over scheduled sessions.
    pub fn placed(&self) -> impl Iterator<Item = (usize, Placement)> + '_ {
        self.placements
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (i, p)))
    }

    pub fn placed_count(&self) -> usize {
        self.placements.iter().filter(|p| p.is_some()).count()
    }

    /// Converts to id-based assignments, skipping unscheduled sessions.
    pub fn assignments(&self, problem: &Problem) -> Vec<Assignment> {
        self.placed()
            .filter_map(|(i, p)| {
                let session = problem.sessions.get(i)?;
                let room = problem.rooms.get(p.room)?;
                Some(Assignment {
                    session_id: session.session.id.clone(),
                    room_id: room.id.clone(),
                    day: p.start.day,
                    start_slot: p.start.period,
                })
            })
            .collect()
    }

    /// Builds a schedule from id-based assignments. Later duplicates win.
    pub fn from_assignments(
        problem: &Problem,
        assignments: &[Assignment],
    ) -> Result<Self, DomainError> {
        let mut schedule = Schedule::unassigned(problem.sessions.len());
        for a in assignments {
            let session = problem
                .session_index(&a.session_id)
                .ok_or_else(|| DomainError::UnknownSessionId(a.session_id.clone()))?;
            let room = problem
                .room_index(&a.room_id)
                .ok_or_else(|| DomainError::UnknownRoomId(a.room_id.clone()))?;
            if a.day as usize >= problem.working_days.len() {
                return Err(DomainError::DayOutOfRange {
                    day: a.day,
                    working_days: problem.working_days.len(),
                });
            }
            schedule.set(session, Some(Placement::new(room, a.day, a.start_slot)));
        }
        Ok(schedule)
    }
}

/// A session with its references resolved to indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSession {
    pub session: Session,
    pub faculty: usize,
    /// Attending cohorts, sorted ascending. Contains the owning cohort.
    pub cohorts: Vec<usize>,
    /// Summed size of attending cohorts.
    pub attendance: u32,
    /// Rooms whose type accepts the session, exact matches first.
    pub compatible_rooms: Vec<usize>,
}

impl PlannedSession {
    pub fn duration(&self) -> u8 {
        self.session.duration_slots
    }

    pub fn is_elective(&self) -> bool {
        self.session.elective_group.is_some()
    }

    pub fn shares_cohort(&self, other: &PlannedSession) -> bool {
        self.cohorts.iter().any(|c| other.cohorts.contains(c))
    }
}

/// A broken placement rule reported by [`Problem::placement_conflicts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementConflict {
    RoomTypeIncompatible,
    MissingEquipment,
    Capacity,
    PastEndOfDay,
    RoomBlackout(TimeSlot),
    FacultyUnavailable(TimeSlot),
    CohortBlackout { cohort: usize, slot: TimeSlot },
    RoomBusy { other: usize },
    FacultyBusy { other: usize },
    CohortBusy { cohort: usize, other: usize },
}

/// Validated, indexed snapshot of a [`ScenarioConfig`].
///
/// Read-only for the lifetime of a run; runs share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Problem {
    pub name: String,
    pub term_start: NaiveDate,
    pub term_end: NaiveDate,
    pub working_days: Vec<Weekday>,
    pub periods_per_day: u8,
    pub period_duration_minutes: u16,
    pub day_start: NaiveTime,
    pub breaks_after: BTreeSet<u8>,
    pub programs: Vec<Program>,
    pub rooms: Vec<Room>,
    pub faculty: Vec<Faculty>,
    pub cohorts: Vec<Cohort>,
    pub sessions: Vec<PlannedSession>,
    pub constraints: ConstraintSet,
    pub time_budget: std::time::Duration,
    pub termination: TerminationConfig,
    pub seed: Option<u64>,
    room_ids: HashMap<String, usize>,
    session_ids: HashMap<String, usize>,
}

impl Problem {
    /// Validates a scenario and resolves all references.
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, ConfigurationError> {
        let (term_start, term_end) = match (config.term.start, config.term.end) {
            (Some(start), Some(end)) if end > start => (start, end),
            (Some(start), Some(end)) => {
                return Err(ConfigurationError::InvalidTerm { start, end })
            }
            _ => return Err(ConfigurationError::MissingTermDates),
        };
        if config.cohorts.is_empty() {
            return Err(ConfigurationError::NoCohorts);
        }
        if config.rooms.is_empty() {
            return Err(ConfigurationError::NoRooms);
        }
        if config.working_days.is_empty() {
            return Err(ConfigurationError::NoWorkingDays);
        }
        if config.working_days.len() > 7 {
            return Err(ConfigurationError::TooManyWorkingDays(config.working_days.len()));
        }
        let mut seen_days = HashSet::new();
        if let Some(day) = config.working_days.iter().find(|d| !seen_days.insert(**d)) {
            return Err(ConfigurationError::DuplicateWorkingDay(*day));
        }
        if config.periods_per_day == 0 || config.period_duration_minutes == 0 {
            return Err(ConfigurationError::NoPeriods);
        }
        let day_minutes =
            u32::from(config.periods_per_day) * u32::from(config.period_duration_minutes);
        let start_minutes = config.day_start.signed_duration_since(NaiveTime::MIN).num_minutes();
        if i64::from(day_minutes) + start_minutes > 24 * 60 {
            return Err(ConfigurationError::DayOverflow {
                periods: config.periods_per_day,
                minutes: config.period_duration_minutes,
            });
        }
        let budget_minutes = config.time_budget_minutes;
        if !(budget_minutes > 0.0 && budget_minutes <= MAX_TIME_BUDGET_MINUTES) {
            return Err(ConfigurationError::InvalidTimeBudget(budget_minutes));
        }
        let time_budget = std::time::Duration::try_from_secs_f64(budget_minutes * 60.0)
            .map_err(|_| ConfigurationError::InvalidTimeBudget(budget_minutes))?;
        for constraint in SoftConstraint::ALL {
            let weight = config.constraints.weight(constraint);
            if !(0.0..=MAX_WEIGHT).contains(&weight) {
                return Err(ConfigurationError::WeightOutOfRange { constraint, weight });
            }
        }

        let grid = Grid {
            days: config.working_days.len(),
            periods: config.periods_per_day,
        };

        let programs: HashSet<&str> =
            unique_ids("program", config.programs.iter().map(|p| p.code.as_str()))?;
        let room_ids = index_ids("room", config.rooms.iter().map(|r| r.id.as_str()))?;
        let faculty_ids = index_ids("faculty", config.faculty.iter().map(|f| f.id.as_str()))?;
        let cohort_ids = index_ids("cohort", config.cohorts.iter().map(|c| c.id.as_str()))?;
        let session_ids = index_ids("session", config.sessions.iter().map(|s| s.id.as_str()))?;

        for room in &config.rooms {
            grid.check(&format!("room '{}'", room.id), &room.blackouts)?;
        }
        for faculty in &config.faculty {
            grid.check(&format!("faculty '{}'", faculty.id), &faculty.availability)?;
        }
        for cohort in &config.cohorts {
            grid.check(&format!("cohort '{}'", cohort.id), &cohort.blackouts)?;
            if let Some(program) = &cohort.program {
                if !programs.contains(program.as_str()) {
                    return Err(ConfigurationError::UnknownReference {
                        kind: "program",
                        id: program.clone(),
                        referenced_by: format!("cohort '{}'", cohort.id),
                    });
                }
            }
            for session in &cohort.enrolled_sessions {
                if !session_ids.contains_key(session) {
                    return Err(ConfigurationError::UnknownReference {
                        kind: "session",
                        id: session.clone(),
                        referenced_by: format!("cohort '{}'", cohort.id),
                    });
                }
            }
        }

        let mut sessions = Vec::with_capacity(config.sessions.len());
        for session in &config.sessions {
            let owner = format!("session '{}'", session.id);
            let faculty = *faculty_ids.get(&session.faculty_id).ok_or_else(|| {
                ConfigurationError::UnknownReference {
                    kind: "faculty",
                    id: session.faculty_id.clone(),
                    referenced_by: owner.clone(),
                }
            })?;
            let primary = *cohort_ids.get(&session.cohort_id).ok_or_else(|| {
                ConfigurationError::UnknownReference {
                    kind: "cohort",
                    id: session.cohort_id.clone(),
                    referenced_by: owner.clone(),
                }
            })?;
            if session.duration_slots == 0 || session.duration_slots > config.periods_per_day {
                return Err(ConfigurationError::InvalidDuration {
                    session: session.id.clone(),
                    duration: session.duration_slots,
                    periods_per_day: config.periods_per_day,
                });
            }

            let mut cohorts: Vec<usize> = config
                .cohorts
                .iter()
                .enumerate()
                .filter(|(i, c)| *i == primary || c.enrolled_sessions.contains(&session.id))
                .map(|(i, _)| i)
                .collect();
            cohorts.sort_unstable();
            let attendance = cohorts.iter().map(|&c| config.cohorts[c].size).sum();

            let mut compatible_rooms: Vec<usize> = config
                .rooms
                .iter()
                .enumerate()
                .filter(|(_, r)| r.room_type.accepts(session.required_room_type))
                .map(|(i, _)| i)
                .collect();
            compatible_rooms
                .sort_by_key(|&r| config.rooms[r].room_type != session.required_room_type);

            sessions.push(PlannedSession {
                session: session.clone(),
                faculty,
                cohorts,
                attendance,
                compatible_rooms,
            });
        }

        Ok(Self {
            name: config.name.clone(),
            term_start,
            term_end,
            working_days: config.working_days.clone(),
            periods_per_day: config.periods_per_day,
            period_duration_minutes: config.period_duration_minutes,
            day_start: config.day_start,
            breaks_after: config.breaks_after.clone(),
            programs: config.programs.clone(),
            rooms: config.rooms.clone(),
            faculty: config.faculty.clone(),
            cohorts: config.cohorts.clone(),
            sessions,
            constraints: config.constraints.clone(),
            time_budget,
            termination: config.termination.clone(),
            seed: config.seed,
            room_ids,
            session_ids,
        })
    }

    pub fn session_index(&self, id: &str) -> Option<usize> {
        self.session_ids.get(id).copied()
    }

    pub fn room_index(&self, id: &str) -> Option<usize> {
        self.room_ids.get(id).copied()
    }

    pub fn day_count(&self) -> u8 {
        u8::try_from(self.working_days.len()).unwrap_or(u8::MAX)
    }

    /// Number of grid cells in a week.
    pub fn slot_count(&self) -> usize {
        self.working_days.len() * usize::from(self.periods_per_day)
    }

    /// Wall-clock start of a period.
    pub fn period_start(&self, period: u8) -> NaiveTime {
        let offset = Duration::minutes(i64::from(period) * i64::from(self.period_duration_minutes));
        self.day_start + offset
    }

    /// Short weekday name of a day index, e.g. "Wed".
    pub fn day_label(&self, day: u8) -> String {
        self.working_days
            .get(usize::from(day))
            .map(|d| d.to_string())
            .unwrap_or_else(|| format!("Day{}", day))
    }

    /// Human label for a slot, e.g. "Wed 14:00".
    pub fn slot_label(&self, slot: TimeSlot) -> String {
        format!(
            "{} {}",
            self.day_label(slot.day),
            self.period_start(slot.period).format("%H:%M")
        )
    }

    /// True if the two sessions may overlap in any resource.
    pub fn co_located(&self, a: usize, b: usize) -> bool {
        match (
            &self.sessions[a].session.colocation_group,
            &self.sessions[b].session.colocation_group,
        ) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// True if a shared cohort may attend both sessions in parallel.
    ///
    /// Co-located sessions and pairs of electives qualify. Electives of
    /// different groups still cost `elective-clash` soft penalty.
    pub fn cohort_overlap_allowed(&self, a: usize, b: usize) -> bool {
        self.co_located(a, b) || (self.sessions[a].is_elective() && self.sessions[b].is_elective())
    }

    /// True if both sessions are electives from different groups.
    pub fn elective_clash(&self, a: usize, b: usize) -> bool {
        match (
            &self.sessions[a].session.elective_group,
            &self.sessions[b].session.elective_group,
        ) {
            (Some(x), Some(y)) => x != y,
            _ => false,
        }
    }

    /// Iterates every start slot where a session of `duration` fits in the day.
    pub fn start_slots(&self, duration: u8) -> impl Iterator<Item = TimeSlot> + '_ {
        let last_start = self.periods_per_day.saturating_sub(duration);
        (0..self.day_count()).flat_map(move |day| {
            (0..=last_start).map(move |period| TimeSlot::new(day, period))
        })
    }

    /// Lists every domain rule broken by putting `session` in `room` at
    /// `start`, ignoring the session's own current placement.
    pub fn placement_conflicts(
        &self,
        session: usize,
        room: usize,
        start: TimeSlot,
        schedule: &Schedule,
    ) -> Result<Vec<PlacementConflict>, DomainError> {
        let planned = self
            .sessions
            .get(session)
            .ok_or(DomainError::UnknownSession(session))?;
        let room_ref = self.rooms.get(room).ok_or(DomainError::UnknownRoom(room))?;
        if planned.duration() == 0 {
            return Err(DomainError::ZeroDuration(planned.session.id.clone()));
        }
        if usize::from(start.day) >= self.working_days.len() {
            return Err(DomainError::DayOutOfRange {
                day: start.day,
                working_days: self.working_days.len(),
            });
        }
        if schedule.len() != self.sessions.len() {
            return Err(DomainError::ScheduleShape {
                expected: self.sessions.len(),
                actual: schedule.len(),
            });
        }

        let mut conflicts = Vec::new();
        if !room_ref.room_type.accepts(planned.session.required_room_type) {
            conflicts.push(PlacementConflict::RoomTypeIncompatible);
        }
        if !planned.session.required_equipment.is_subset(&room_ref.equipment_tags) {
            conflicts.push(PlacementConflict::MissingEquipment);
        }
        if planned.attendance > room_ref.capacity {
            conflicts.push(PlacementConflict::Capacity);
        }

        let placement = Placement { room, start };
        let end = u16::from(start.period) + u16::from(planned.duration());
        if end > u16::from(self.periods_per_day) {
            conflicts.push(PlacementConflict::PastEndOfDay);
        }

        for period in placement.periods(planned.duration()) {
            if period >= self.periods_per_day {
                break;
            }
            let slot = TimeSlot::new(start.day, period);
            if room_ref.blackouts.contains(&slot) {
                conflicts.push(PlacementConflict::RoomBlackout(slot));
            }
            if !self.faculty[planned.faculty].is_available(slot) {
                conflicts.push(PlacementConflict::FacultyUnavailable(slot));
            }
            for &cohort in &planned.cohorts {
                if self.cohorts[cohort].blackouts.contains(&slot) {
                    conflicts.push(PlacementConflict::CohortBlackout { cohort, slot });
                }
            }
        }

        for (other, other_placement) in schedule.placed() {
            if other == session {
                continue;
            }
            let other_planned = &self.sessions[other];
            if !placement.overlaps(planned.duration(), &other_placement, other_planned.duration()) {
                continue;
            }
            if self.co_located(session, other) {
                continue;
            }
            if other_placement.room == room {
                conflicts.push(PlacementConflict::RoomBusy { other });
            }
            if other_planned.faculty == planned.faculty {
                conflicts.push(PlacementConflict::FacultyBusy { other });
            }
            if !self.cohort_overlap_allowed(session, other) {
                for &cohort in &planned.cohorts {
                    if other_planned.cohorts.contains(&cohort) {
                        conflicts.push(PlacementConflict::CohortBusy { cohort, other });
                    }
                }
            }
        }

        Ok(conflicts)
    }

    /// Returns whether `session` can legally start in `room` at (`day`, `slot`).
    ///
    /// Rule violations yield `Ok(false)`; only malformed input is an error.
    pub fn can_place(
        &self,
        session: usize,
        room: usize,
        day: u8,
        slot: u8,
        schedule: &Schedule,
    ) -> Result<bool, DomainError> {
        self.placement_conflicts(session, room, TimeSlot::new(day, slot), schedule)
            .map(|conflicts| conflicts.is_empty())
    }
}

struct Grid {
    days: usize,
    periods: u8,
}

impl Grid {
    fn check(&self, owner: &str, slots: &BTreeSet<TimeSlot>) -> Result<(), ConfigurationError> {
        match slots
            .iter()
            .find(|s| usize::from(s.day) >= self.days || s.period >= self.periods)
        {
            Some(slot) => Err(ConfigurationError::SlotOutOfGrid {
                owner: owner.to_string(),
                slot: *slot,
            }),
            None => Ok(()),
        }
    }
}

fn index_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, usize>, ConfigurationError> {
    let mut map = HashMap::new();
    for (i, id) in ids.enumerate() {
        if map.insert(id.to_string(), i).is_some() {
            return Err(ConfigurationError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(map)
}

fn unique_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, ConfigurationError> {
    let mut set = HashSet::new();
    for id in ids {
        if !set.insert(id) {
            return Err(ConfigurationError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(set)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Two lecture halls, one lab, one cohort of 40, three sessions.
    pub(crate) fn small_config() -> ScenarioConfig {
        ScenarioConfig {
            name: "test".to_string(),
            term: Term {
                start: NaiveDate::from_ymd_opt(2025, 8, 1),
                end: NaiveDate::from_ymd_opt(2025, 12, 1),
            },
            working_days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed],
            periods_per_day: 4,
            period_duration_minutes: 60,
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            breaks_after: BTreeSet::from([1]),
            programs: vec![Program {
                code: "FYUGP".to_string(),
                name: "Four Year UG".to_string(),
                semester: Some(1),
            }],
            rooms: vec![
                Room::new("LH-1", RoomType::LectureHall, 60),
                Room::new("LH-2", RoomType::LectureHall, 60)
                    .with_blackouts([TimeSlot::new(2, 3)]),
                Room::new("CS-Lab-2", RoomType::ComputerLab, 40).with_equipment(["pc"]),
            ],
            faculty: vec![
                Faculty::new("F-RAO", "Dr. Rao"),
                Faculty::new("F-IYER", "Dr. Iyer").with_availability([
                    TimeSlot::new(0, 0),
                    TimeSlot::new(0, 1),
                    TimeSlot::new(1, 0),
                ]),
            ],
            cohorts: vec![Cohort::new("SEM1-A", 40).with_program("FYUGP")],
            sessions: vec![
                Session::new("CS101-L1", "CS101", SessionKind::Lecture, "SEM1-A", "F-RAO"),
                Session::new("MA101-L1", "MA101", SessionKind::Lecture, "SEM1-A", "F-IYER"),
                Session::new("CS101-P1", "CS101", SessionKind::Practical, "SEM1-A", "F-RAO")
                    .with_room_type(RoomType::ComputerLab)
                    .with_equipment(["pc"])
                    .with_duration(2),
            ],
            constraints: ConstraintSet::default(),
            time_budget_minutes: 0.05,
            termination: TerminationConfig::default(),
            seed: Some(7),
        }
    }

    pub(crate) fn small_problem() -> Problem {
        Problem::from_config(&small_config()).unwrap()
    }

    /// Small scenario plus two SEM1-A electives (indices 3 and 4) taught by
    /// separate faculty, in groups `group_a` and `group_b`.
    pub(crate) fn elective_config(group_a: &str, group_b: &str) -> ScenarioConfig {
        let mut config = small_config();
        config.faculty.push(Faculty::new("F-SEN", "Dr. Sen"));
        config.faculty.push(Faculty::new("F-KAPOOR", "Dr. Kapoor"));
        config.sessions.push(
            Session::new("PSY101-L1", "PSY101", SessionKind::Lecture, "SEM1-A", "F-SEN")
                .with_elective_group(group_a),
        );
        config.sessions.push(
            Session::new("ECO101-L1", "ECO101", SessionKind::Lecture, "SEM1-A", "F-KAPOOR")
                .with_elective_group(group_b),
        );
        config
    }

    #[test]
    fn test_from_config_resolves_indices() {
        let problem = small_problem();
        assert_eq!(problem.sessions.len(), 3);
        assert_eq!(problem.sessions[1].faculty, 1);
        assert_eq!(problem.sessions[2].compatible_rooms, vec![2]);
        assert_eq!(problem.sessions[0].compatible_rooms, vec![0, 1]);
        assert_eq!(problem.session_index("CS101-P1"), Some(2));
        assert_eq!(problem.time_budget.as_millis(), 3000);
    }

    #[test]
    fn test_missing_term_dates_rejected() {
        let mut config = small_config();
        config.term.end = None;
        assert_eq!(
            Problem::from_config(&config).unwrap_err(),
            ConfigurationError::MissingTermDates
        );
    }

    #[test]
    fn test_zero_cohorts_and_budget_rejected() {
        let mut config = small_config();
        config.time_budget_minutes = 0.0;
        assert!(matches!(
            Problem::from_config(&config),
            Err(ConfigurationError::InvalidTimeBudget(_))
        ));

        let mut config = small_config();
        config.cohorts.clear();
        assert_eq!(
            Problem::from_config(&config).unwrap_err(),
            ConfigurationError::NoCohorts
        );
    }

    #[test]
    fn test_time_budget_bounds() {
        for minutes in [f64::NAN, -1.0, f64::INFINITY, 1e300, MAX_TIME_BUDGET_MINUTES + 1.0] {
            let mut config = small_config();
            config.time_budget_minutes = minutes;
            assert!(matches!(
                Problem::from_config(&config),
                Err(ConfigurationError::InvalidTimeBudget(_))
            ));
        }

        let mut config = small_config();
        config.time_budget_minutes = MAX_TIME_BUDGET_MINUTES;
        let problem = Problem::from_config(&config).unwrap();
        assert_eq!(problem.time_budget.as_secs(), 86_400);
    }

    #[test]
    fn test_zero_rooms_rejected() {
        let mut config = small_config();
        config.rooms.clear();
        config.sessions.clear();
        assert_eq!(Problem::from_config(&config).unwrap_err(), ConfigurationError::NoRooms);
    }

    #[test]
    fn test_working_days_validated() {
        let mut config = small_config();
        config.working_days = vec![Weekday::Mon, Weekday::Tue, Weekday::Mon];
        assert_eq!(
            Problem::from_config(&config).unwrap_err(),
            ConfigurationError::DuplicateWorkingDay(Weekday::Mon)
        );

        let mut config = small_config();
        config.working_days = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
            Weekday::Mon,
        ]
        .to_vec();
        assert_eq!(
            Problem::from_config(&config).unwrap_err(),
            ConfigurationError::TooManyWorkingDays(8)
        );

        let mut config = small_config();
        config.working_days.extend([Weekday::Thu, Weekday::Fri, Weekday::Sat, Weekday::Sun]);
        assert_eq!(Problem::from_config(&config).unwrap().day_count(), 7);
    }

    #[test]
    fn test_unknown_faculty_rejected() {
        let mut config = small_config();
        config.sessions[0].faculty_id = "F-NOBODY".to_string();
        assert!(matches!(
            Problem::from_config(&config),
            Err(ConfigurationError::UnknownReference { kind: "faculty", .. })
        ));
    }

    #[test]
    fn test_blackout_outside_grid_rejected() {
        let mut config = small_config();
        config.rooms[0].blackouts.insert(TimeSlot::new(0, 9));
        assert!(matches!(
            Problem::from_config(&config),
            Err(ConfigurationError::SlotOutOfGrid { .. })
        ));
    }

    #[test]
    fn test_joint_session_attendance() {
        let mut config = small_config();
        let mut other = Cohort::new("SEM1-B", 30);
        other.enrolled_sessions.insert("CS101-L1".to_string());
        config.cohorts.push(other);
        let problem = Problem::from_config(&config).unwrap();
        assert_eq!(problem.sessions[0].cohorts, vec![0, 1]);
        assert_eq!(problem.sessions[0].attendance, 70);
        assert!(!problem.can_place(0, 0, 0, 0, &Schedule::unassigned(3)).unwrap());
    }

    #[test]
    fn test_can_place_rules() {
        let problem = small_problem();
        let mut schedule = Schedule::unassigned(3);

        assert!(problem.can_place(0, 0, 0, 0, &schedule).unwrap());
        // Practical needs the computer lab.
        assert!(!problem.can_place(2, 0, 0, 0, &schedule).unwrap());
        assert!(problem.can_place(2, 2, 0, 0, &schedule).unwrap());
        // Two-period practical cannot start in the last period.
        assert!(!problem.can_place(2, 2, 0, 3, &schedule).unwrap());
        // Room blackout.
        assert!(!problem.can_place(0, 1, 2, 3, &schedule).unwrap());
        // Dr. Iyer is only available in three slots.
        assert!(problem.can_place(1, 0, 1, 0, &schedule).unwrap());
        assert!(!problem.can_place(1, 0, 1, 1, &schedule).unwrap());

        schedule.set(0, Some(Placement::new(0, 0, 0)));
        // Same room, same time.
        assert!(!problem.can_place(1, 0, 0, 0, &schedule).unwrap());
        // Different room, same cohort.
        assert!(!problem.can_place(1, 1, 0, 0, &schedule).unwrap());
        // Overlaps the practical's second period with the same faculty.
        assert!(!problem.can_place(2, 2, 0, 0, &schedule).unwrap());
        // A session never conflicts with its own placement.
        assert!(problem.can_place(0, 0, 0, 0, &schedule).unwrap());
    }

    #[test]
    fn test_can_place_lets_electives_share_cohort_slot() {
        let problem = Problem::from_config(&elective_config("OE-A", "OE-B")).unwrap();
        let mut schedule = Schedule::unassigned(5);
        schedule.set(3, Some(Placement::new(0, 2, 0)));

        // The other elective may run alongside in a different room.
        assert!(problem.can_place(4, 1, 2, 0, &schedule).unwrap());
        // A core session may not.
        assert!(!problem.can_place(0, 1, 2, 0, &schedule).unwrap());
        // The room is still taken.
        assert!(!problem.can_place(4, 0, 2, 0, &schedule).unwrap());
    }

    #[test]
    fn test_can_place_malformed_input() {
        let problem = small_problem();
        let schedule = Schedule::unassigned(3);
        assert_eq!(
            problem.can_place(9, 0, 0, 0, &schedule),
            Err(DomainError::UnknownSession(9))
        );
        assert_eq!(
            problem.can_place(0, 7, 0, 0, &schedule),
            Err(DomainError::UnknownRoom(7))
        );
        assert!(matches!(
            problem.can_place(0, 0, 5, 0, &schedule),
            Err(DomainError::DayOutOfRange { .. })
        ));
    }

    #[test]
    fn test_colocated_sessions_share_room() {
        let mut config = small_config();
        config.sessions[0] = config.sessions[0].clone().with_colocation_group("combined");
        config.sessions[1] = config.sessions[1].clone().with_colocation_group("combined");
        let problem = Problem::from_config(&config).unwrap();
        let mut schedule = Schedule::unassigned(3);
        schedule.set(0, Some(Placement::new(0, 0, 0)));
        assert!(problem.can_place(1, 0, 0, 0, &schedule).unwrap());
    }

    #[test]
    fn test_assignment_round_trip_and_labels() {
        let problem = small_problem();
        let mut schedule = Schedule::unassigned(3);
        schedule.set(2, Some(Placement::new(2, 2, 2)));
        let assignments = schedule.assignments(&problem);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].room_id, "CS-Lab-2");
        assert_eq!(Schedule::from_assignments(&problem, &assignments).unwrap(), schedule);
        assert_eq!(problem.slot_label(TimeSlot::new(2, 2)), "Wed 11:00");
    }

    #[test]
    fn test_scenario_config_json_defaults() {
        let json = r#"{
            "term": {"start": "2025-08-01", "end": "2025-12-01"},
            "workingDays": ["Mon", "Tue"],
            "periodsPerDay": 6,
            "periodDurationMinutes": 50,
            "cohorts": [{"id": "SEM1-A", "size": 60}],
            "rooms": [{"id": "LH-1", "type": "LectureHall", "capacity": 60}],
            "timeBudgetMinutes": 1
        }"#;
        let config: ScenarioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.day_start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.constraints, ConstraintSet::default());
        assert!(Problem::from_config(&config).is_ok());
    }
}
