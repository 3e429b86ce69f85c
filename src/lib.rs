//! Enrollment reconciliation and schedule projection for the academic planner.
//!
//! Students record courses with a status, grade and self-reported metrics;
//! the planner derives each course's grade-level bucket and regroups the
//! records into a four-year schedule.

pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod schedule;
pub mod service;
pub mod store;

pub use error::{PlannerError, Result};
pub use service::Planner;
