//! Orchestrator Service Library
//!
//! This library acts as the core of the Operation Orchestrator Service, exporting
//! the necessary modules for the application binary and integration tests.
//!
//! # Modules
//!
//! * `api` - Contains the HTTP API interface.
//! * `config` - Contains the typed process configuration loaded from the environment.
//! * `domain` - Contains the domain entities, ports and business rules.
//! * `infrastructure` - Contains the concrete implementations of repositories, gateways and custody.
//! * `jobs` - Contains the background jobs (validation poller, secret cache sweeper).
//! * `use_cases` - Contains the application business logic and workflows.

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod jobs;
pub mod use_cases;
