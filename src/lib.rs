pub mod clipboard;
pub mod config;
pub mod controller;
pub mod gemini;
pub mod models;
pub mod naming;
pub mod preview;
pub mod routes;
