//! GitOps engine: repository convergence, manifest generation, and the
//! top-level cluster lifecycle orchestration around the Flux reconciler.

pub mod client;
pub mod error;
pub mod files;
pub mod flux;
pub mod repository;

pub use client::{FluxClient, GitClient, KubeClient, ReconcilerClient};
pub use error::{GitOpsError, Result};
pub use files::FileGenerator;
pub use flux::Flux;
pub use repository::{RepoState, RepositorySynchronizer};
