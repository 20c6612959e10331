// src/models/mod.rs

pub mod assignment;
pub mod band;
pub mod module;
pub mod result;
pub mod submission;
