// src/services/mod.rs

pub mod access;
pub mod issuer;
pub mod lifecycle;
pub mod scoring;
pub mod submissions;
