//! Timetable assignment store and its client-side cache.
//!
//! The `rosterd` binary owns the SQLite store and answers line-delimited JSON
//! requests. The [`cache`] module mirrors the assignment table on the client
//! side for instant grid rendering and keeps it coherent with placements,
//! deletions and edits to subjects, teachers, groups and classrooms.

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod ipc;
pub mod logging;
pub mod rpc;
