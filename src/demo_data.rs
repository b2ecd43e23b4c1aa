//! Demo data generators for FYUGP timetabling.
//!
//! - SMALL: one first-semester cohort, lecture halls and classrooms only
//! - LARGE: four cohorts with labs, two-period practicals, a joint lecture,
//!   an elective basket and seeded blackouts
//! - OVERSUBSCRIBED: SMALL with a cohort larger than every room

use chrono::{NaiveDate, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

use crate::constraints::ConstraintSet;
use crate::domain::{
    Cohort, Faculty, Program, Room, RoomType, ScenarioConfig, Session, SessionKind, Term,
    TerminationConfig, TimeSlot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    Small,
    Large,
    Oversubscribed,
}

impl std::str::FromStr for DemoData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SMALL" => Ok(DemoData::Small),
            "LARGE" => Ok(DemoData::Large),
            "OVERSUBSCRIBED" => Ok(DemoData::Oversubscribed),
            _ => Err(()),
        }
    }
}

impl DemoData {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoData::Small => "SMALL",
            DemoData::Large => "LARGE",
            DemoData::Oversubscribed => "OVERSUBSCRIBED",
        }
    }
}

const FACULTY_NAMES: [(&str, &str); 8] = [
    ("F-RAO", "Dr. Anjali Rao"),
    ("F-IYER", "Dr. Karthik Iyer"),
    ("F-MENON", "Dr. Priya Menon"),
    ("F-SINGH", "Dr. Harpreet Singh"),
    ("F-DAS", "Dr. Sourav Das"),
    ("F-KULKARNI", "Dr. Meera Kulkarni"),
    ("F-NAIR", "Dr. Arjun Nair"),
    ("F-BOSE", "Dr. Ritika Bose"),
];

/// (code, title) of the first-semester core.
const SEM1_CORE: [(&str, &str); 3] = [
    ("CS101", "Programming Fundamentals"),
    ("MA101", "Calculus I"),
    ("PH101", "Physics I"),
];

const SEM3_CORE: [(&str, &str); 3] = [
    ("CS301", "Data Structures"),
    ("CS302", "Operating Systems"),
    ("MA301", "Discrete Mathematics"),
];

const SEM3_ELECTIVES: [(&str, &str); 2] = [
    ("OE311", "Machine Learning Basics"),
    ("OE312", "Digital Marketing"),
];

const SEM1_DAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

pub fn list_demo_data() -> Vec<&'static str> {
    vec![
        DemoData::Small.as_str(),
        DemoData::Large.as_str(),
        DemoData::Oversubscribed.as_str(),
    ]
}

/// Generates a demo scenario.
///
/// # Examples
///
/// ```
/// use timely_scheduler::demo_data::{generate, DemoData};
/// use timely_scheduler::domain::Problem;
///
/// let config = generate(DemoData::Small);
/// assert_eq!(config.cohorts[0].id, "FYUGP-SEM1-A");
/// assert!(Problem::from_config(&config).is_ok());
/// ```
pub fn generate(demo: DemoData) -> ScenarioConfig {
    match demo {
        DemoData::Small => small(),
        DemoData::Large => large(),
        DemoData::Oversubscribed => {
            let mut config = small();
            config.name = "FYUGP oversubscribed".to_string();
            config.cohorts[0].size = 150;
            config
        }
    }
}

fn base(name: &str, periods_per_day: u8, breaks_after: &[u8]) -> ScenarioConfig {
    ScenarioConfig {
        name: name.to_string(),
        term: Term {
            start: NaiveDate::from_ymd_opt(2025, 8, 1),
            end: NaiveDate::from_ymd_opt(2025, 12, 1),
        },
        working_days: SEM1_DAYS.to_vec(),
        periods_per_day,
        period_duration_minutes: 50,
        day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
        breaks_after: breaks_after.iter().copied().collect(),
        programs: vec![Program {
            code: "FYUGP".to_string(),
            name: "Four Year Undergraduate Programme".to_string(),
            semester: None,
        }],
        rooms: Vec::new(),
        faculty: Vec::new(),
        cohorts: Vec::new(),
        sessions: Vec::new(),
        constraints: ConstraintSet::default(),
        time_budget_minutes: 0.5,
        termination: TerminationConfig::default(),
        seed: Some(0),
    }
}

fn faculty(count: usize) -> Vec<Faculty> {
    FACULTY_NAMES
        .iter()
        .take(count)
        .map(|(id, name)| Faculty::new(*id, *name).with_max_credits_per_day(4))
        .collect()
}

/// Lectures, one tutorial and an optional practical for one course.
fn course_sessions(
    cohort: &str,
    (code, title): (&str, &str),
    lectures: usize,
    faculty_id: &str,
) -> Vec<Session> {
    let mut sessions: Vec<Session> = (1..=lectures)
        .map(|n| {
            Session::new(
                format!("{}-{}-L{}", cohort, code, n),
                code,
                SessionKind::Lecture,
                cohort,
                faculty_id,
            )
            .with_title(title)
        })
        .collect();
    sessions.push(
        Session::new(
            format!("{}-{}-T1", cohort, code),
            code,
            SessionKind::Tutorial,
            cohort,
            faculty_id,
        )
        .with_title(title),
    );
    sessions
}

fn practical(
    cohort: &str,
    (code, title): (&str, &str),
    faculty_id: &str,
    room_type: RoomType,
    equipment: &str,
) -> Session {
    Session::new(
        format!("{}-{}-P1", cohort, code),
        code,
        SessionKind::Practical,
        cohort,
        faculty_id,
    )
    .with_title(format!("{} Lab", title))
    .with_room_type(room_type)
    .with_equipment([equipment])
    .with_duration(2)
    .with_credits(2)
}

fn small() -> ScenarioConfig {
    let mut config = base("FYUGP Semester 1", 6, &[2]);
    config.time_budget_minutes = 1.0;
    config.rooms = vec![
        Room::new("LH-101", RoomType::LectureHall, 80),
        Room::new("CR-201", RoomType::Classroom, 60),
    ];
    config.faculty = faculty(4);
    config.cohorts = vec![Cohort::new("FYUGP-SEM1-A", 55).with_program("FYUGP")];

    let courses = [
        SEM1_CORE[0],
        SEM1_CORE[1],
        SEM1_CORE[2],
        ("EN101", "Communicative English"),
    ];
    for (i, course) in courses.into_iter().enumerate() {
        config
            .sessions
            .extend(course_sessions("FYUGP-SEM1-A", course, 3, FACULTY_NAMES[i].0));
    }
    config
}

fn large() -> ScenarioConfig {
    let mut rng = StdRng::seed_from_u64(0);
    let mut config = base("FYUGP Semesters 1 and 3", 7, &[3]);

    config.rooms = vec![
        Room::new("LH-101", RoomType::LectureHall, 120),
        Room::new("LH-102", RoomType::LectureHall, 90),
        Room::new("CR-201", RoomType::Classroom, 70),
        Room::new("CR-202", RoomType::Classroom, 70),
        Room::new("SR-301", RoomType::Seminar, 40),
        Room::new("CS-Lab-1", RoomType::ComputerLab, 70).with_equipment(["pc", "projector"]),
        Room::new("CS-Lab-2", RoomType::ComputerLab, 70).with_equipment(["pc"]),
        Room::new("PHY-Lab", RoomType::Lab, 70).with_equipment(["bench"]),
    ];
    let days = config.working_days.len() as u8;
    for room in &mut config.rooms {
        let slot = TimeSlot::new(rng.gen_range(0..days), rng.gen_range(0..7));
        room.blackouts.insert(slot);
    }

    let mut faculty = faculty(8);
    // Two teachers keep one day free.
    for f in faculty.iter_mut().skip(6) {
        let free_day = rng.gen_range(0..days);
        f.availability = (0..days)
            .filter(|&d| d != free_day)
            .flat_map(|d| (0..7).map(move |p| TimeSlot::new(d, p)))
            .collect();
    }
    let mut pool: Vec<&str> = faculty.iter().map(|f| f.id.as_str()).collect();
    pool.shuffle(&mut rng);
    let pool: Vec<String> = pool.into_iter().map(String::from).collect();
    config.faculty = faculty;

    config.programs.push(Program {
        code: "ITEP".to_string(),
        name: "Integrated Teacher Education Programme".to_string(),
        semester: Some(3),
    });

    let assembly: BTreeSet<TimeSlot> = [TimeSlot::new(4, 5), TimeSlot::new(4, 6)].into();
    let mut cohorts = vec![
        Cohort::new("FYUGP-SEM1-A", 60).with_program("FYUGP"),
        Cohort::new("FYUGP-SEM1-B", 55).with_program("FYUGP"),
        Cohort::new("FYUGP-SEM3-A", 40).with_program("FYUGP"),
        Cohort::new("ITEP-SEM3-B", 35).with_program("ITEP"),
    ];
    for cohort in &mut cohorts {
        cohort.max_credits_per_day = Some(5);
        cohort.name = cohort.id.replace('-', " ");
    }
    for cohort in cohorts.iter_mut().take(2) {
        cohort.blackouts = assembly.clone();
    }

    let mut next_faculty = 0usize;
    let mut assign = || {
        let id = pool[next_faculty % pool.len()].clone();
        next_faculty += 1;
        id
    };

    let mut sessions = Vec::new();
    for (cohort, core) in [
        ("FYUGP-SEM1-A", SEM1_CORE),
        ("FYUGP-SEM1-B", SEM1_CORE),
        ("FYUGP-SEM3-A", SEM3_CORE),
        ("ITEP-SEM3-B", SEM3_CORE),
    ] {
        for course in core {
            sessions.extend(course_sessions(cohort, course, 2, &assign()));
        }
    }
    sessions.push(practical("FYUGP-SEM1-A", SEM1_CORE[0], &assign(), RoomType::ComputerLab, "pc"));
    sessions.push(practical("FYUGP-SEM1-B", SEM1_CORE[2], &assign(), RoomType::Lab, "bench"));
    sessions.push(practical("FYUGP-SEM3-A", SEM3_CORE[0], &assign(), RoomType::ComputerLab, "pc"));
    sessions.push(practical("ITEP-SEM3-B", SEM3_CORE[0], &assign(), RoomType::ComputerLab, "pc"));

    // Joint environmental studies lecture for both first-semester sections.
    let env_faculty = assign();
    for n in 1..=2 {
        let id = format!("FYUGP-SEM1-ENV101-L{}", n);
        sessions.push(
            Session::new(
                id.clone(),
                "ENV101",
                SessionKind::Lecture,
                "FYUGP-SEM1-A",
                env_faculty.as_str(),
            )
                .with_title("Environmental Studies"),
        );
        cohorts[1].enrolled_sessions.insert(id);
    }

    // Third-semester open elective basket, taken by both sections.
    for (code, title) in SEM3_ELECTIVES {
        let teacher = assign();
        for n in 1..=2 {
            let id = format!("SEM3-{}-L{}", code, n);
            sessions.push(
                Session::new(
                    id.clone(),
                    code,
                    SessionKind::Lecture,
                    "FYUGP-SEM3-A",
                    teacher.as_str(),
                )
                    .with_title(title)
                    .with_elective_group("OE-3"),
            );
            cohorts[3].enrolled_sessions.insert(id);
        }
    }

    config.cohorts = cohorts;
    config.sessions = sessions;
    config
}
