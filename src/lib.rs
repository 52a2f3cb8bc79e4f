//! SafeTrail - Tourist safety monitoring and incident response.
//!
//! # Overview
//!
//! SafeTrail scores each tourist's latest telemetry snapshot against a fixed
//! set of risk factors, lists the tourists who need attention and tracks
//! incidents through two independent workflows: a control-room board and a
//! field response stepper. Every incident transition appends an entry to an
//! append-only log.
//!
//! # Modules
//!
//! - [`model`]: Telemetry snapshots, risk factors and score tiers
//! - [`risk`]: Risk-factor extraction, safety scores and tier policies
//! - [`incident`]: Incidents, workflows and the incident log
//! - [`protocol`]: Suggested response protocols per alert type
//! - [`auth`]: Roles, sessions and signup validation
//! - [`report`]: Emergency reports and their dispatcher
//! - [`zone`]: Geo-fence zones drawn by authorities
//! - [`storage`]: SQLite storage layer
//! - [`config`]: Environment configuration
//! - [`error`]: Crate error type
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod incident;
pub mod model;
pub mod protocol;
pub mod report;
pub mod risk;
pub mod storage;
pub mod zone;
