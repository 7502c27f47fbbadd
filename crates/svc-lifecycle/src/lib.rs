//! Coordinates interdependent, long-running services through a shared
//! three-phase lifecycle (prepare → online → cleanup), respecting a
//! dependency partial order, with phase-barrier synchronization, cooperative
//! cancellation, rollback on startup failure, and safe dynamic add/remove
//! while running.

pub mod context;
pub mod error;
pub mod graph;
pub mod helper;
pub mod lifespan;
pub mod resolver;
pub mod service;
pub mod status;
pub mod task_group;

#[cfg(feature = "config")]
pub mod config;

pub use context::{PhaseGuard, ServiceContext};
pub use error::{
    DaemonError, FailedDaemon, GraphError, IllegalTransition, LifespanError, ResolverError,
    UnhandledExit,
};
pub use graph::{ServiceGraph, SubgraphPlan};
pub use helper::{ScopedResource, ScopedService};
pub use lifespan::LifespanController;
pub use resolver::{resolve_dependencies, validate_removal, Layer, Requirement, ServiceDescriptor};
pub use service::Service;
pub use status::{Phase, ServiceStatus, Stage, IDLE};
pub use task_group::{TaskGroup, TaskId};

#[cfg(feature = "config")]
pub use config::LifespanConfig;
