// src/jobs/mod.rs

pub mod dedup;
pub mod points;
