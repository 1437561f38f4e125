//! # svcwrap_core
//!
//! Service definitions and the project lifecycle for svcwrap.
//!
//! A service wraps one command-line program. Clients create a project, stage
//! input files under input templates, bind the global parameters and start
//! the program; the project then runs to completion (or is aborted) and its
//! output files can be fetched.
//!
//! # Architecture
//!
//! - **Definition**: YAML or TOML file with the command, parameters, formats,
//!   converters and profiles, validated into a [`Service`]
//! - **Context**: storage root and flags for one service instance
//! - **Layout**: on-disk structure of a project (`input/`, `output/`, `tmp/`,
//!   data file, pid and exit files)
//! - **Manager**: the state machine `ready -> running -> done | aborted | error`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use svcwrap_core::{InputUpload, ProjectManager, Service, ServiceContext};
//!
//! let service = Service::load(Path::new("service.yaml"))?;
//! let context = ServiceContext::from_definition(service.definition());
//! let manager = ProjectManager::new(Arc::new(service), context);
//!
//! manager.create("p1").await?;
//! manager
//!     .add_input("p1", InputUpload::new("text", "/tmp/upload.txt"), None)
//!     .await?;
//! manager.submit("p1", &HashMap::new(), None).await?;
//! let state = manager.wait("p1").await?;
//! ```

pub mod context;
pub mod definition;
pub mod error;
pub mod lifecycle;
pub mod project;

pub use context::ServiceContext;
pub use definition::{DefinitionSyntax, Service, ServiceDefinition};
pub use error::{CoreError, CoreResult};
pub use lifecycle::{InputUpload, ProjectManager};
pub use project::{validate_project_id, ProjectLayout, ProjectState, ProjectStatus, DATA_FILE};
