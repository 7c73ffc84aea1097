pub mod assembler;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod governor;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod reaper;
pub mod store;
pub mod testing;

pub use assembler::{Assembler, AssemblyError};
pub use catalog::{Catalog, CatalogError, CatalogFile, HttpCatalog};
pub use config::{
    load_config, load_config_from_str, validate_config, CatalogConfig, Config, ConfigError,
    DownloadConfig, ReaperConfig, ServerConfig, StoreConfig,
};
pub use fetcher::{
    FetchError, FetchErrorKind, FetchRequest, Fetched, Fetcher, HttpFetcher, RetryPolicy,
};
pub use governor::{Governor, GovernorStatus};
pub use job::{
    ArchiveRef, CreateJobRequest, FailureKind, FileTask, FileTaskStatus, GroupSelection, Job,
    JobFailure, JobStatus,
};
pub use orchestrator::{JobError, JobOrchestrator, OrchestratorStatus};
pub use reaper::{Reaper, SweepStats};
pub use store::{JobTier, MemoryTier, RemoteKvTier, SqliteTier, StoreError, TieredJobStore};
