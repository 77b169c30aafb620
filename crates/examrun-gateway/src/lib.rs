//! examrun-gateway — Exam service and submission gateway integrations.
//!
//! Implements the `ExamService` and `SubmissionGateway` traits for an
//! in-memory service, a JSON/HTTP service, and a scripted mock for tests.

pub mod config;
pub mod http;
pub mod memory;
pub mod mock;

pub use config::{
    create_backend, load_config, load_config_from, Backend, BackendConfig, ExamrunConfig,
};
pub use http::HttpExamService;
pub use memory::InMemoryExamService;
pub use mock::{MockBehavior, MockGateway};
