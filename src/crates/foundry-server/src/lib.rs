//! Foundry server: HTTP surface, persistence, dispatch and automations
//!
//! Wires the graph compiler, interpreter and executors into a running
//! service: axum routes over a SQLite store, the remote-execution dispatcher
//! with scoped container tokens, and the automation router that turns issue
//! status transitions into workflow executions.

pub mod api;
pub mod automation;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod integrations;
pub mod platform;
pub mod secrets;
pub mod store;
pub mod token;

pub use api::{create_router, AppState};
pub use automation::{AutomationOutcome, AutomationRouter, StatusChange};
pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, DispatcherConfig, ExecutionMode, WebhookPayload};
pub use platform::{ContainerPlatform, DeploymentStatus, HttpContainerPlatform, ServiceSpec};
pub use secrets::EnvCipher;
pub use store::SqliteStateSaver;
pub use token::{ExecutionTokenClaims, TokenSigner};
