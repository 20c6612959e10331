// src/lib.rs

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod tasks;
pub mod utils;

pub use routes::create_router;
