// src/tasks/mod.rs

pub mod sweep;
