//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate index checks and store writes into reading list use-cases.
//! - Keep host application layers decoupled from storage details.

pub mod config;
pub mod reading_lists_controller;
