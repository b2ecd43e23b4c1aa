//! Timely NEP timetable engine
//!
//! Generates weekly university timetables for NEP 2020 programmes (FYUGP,
//! ITEP) by placing every teaching session into a room and slot so that no
//! hard constraint is broken and the weighted soft cost is low.
//!
//! # Domain Model
//!
//! - [`Room`](domain::Room), [`Faculty`](domain::Faculty), [`Cohort`](domain::Cohort):
//!   resources with capacity, availability and blackouts
//! - [`Session`](domain::Session): one weekly teaching meeting to place
//! - [`Problem`](domain::Problem): validated, indexed scenario shared by a run
//! - [`Schedule`](domain::Schedule): one optional placement per session
//!
//! # Pipeline
//!
//! - [`constraints`]: hard violations and weighted soft cost of a schedule
//! - [`search`]: greedy construction followed by simulated annealing
//! - [`solver`]: run lifecycle with progress, cancellation and time budget
//! - [`explain`]: plain-language report of a scored schedule

pub mod api;
pub mod config;
pub mod console;
pub mod constraints;
pub mod demo_data;
pub mod domain;
pub mod dto;
pub mod error;
pub mod explain;
pub mod search;
pub mod solver;
