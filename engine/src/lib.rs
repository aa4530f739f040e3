//! Process supervision engine.
//!
//! Registers process definitions, starts them with dependency
//! ordering, supervises restarts with backoff and a start-rate limit,
//! probes health, and activates processes on socket traffic.
//!
//! ```no_run
//! use psup_engine::domain::CreateProcessCommand;
//! use psup_engine::engine::{Engine, EngineConfig};
//!
//! # async fn demo() -> psup_engine::domain::Result<()> {
//! let engine = Engine::new(EngineConfig::default());
//! engine.create(CreateProcessCommand::new("web", "/usr/bin/web"))?;
//! let pid = engine.start("web").await?;
//! println!("web running as {pid}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod deps;
pub mod domain;
pub mod engine;
pub mod health;
pub mod registry;
pub mod socket;
pub mod spawn;
pub mod supervisor;

pub use domain::{CreateProcessCommand, DomainError, ProcessDefinition, ProcessState, Result};
pub use engine::{Engine, EngineConfig};
