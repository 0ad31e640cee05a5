pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod filter;
pub mod gateway;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod models;
pub mod pagination;
pub mod service;
pub mod session;
pub mod summary;
pub mod validation;

pub use error::{ReportError, Result};
pub use filter::{FilterCapabilities, FilterPlan, ReportFilter, Scope};
pub use gateway::ReportGateway;
#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryGateway;
pub use pagination::{LoadKind, PageOutcome, ReportPager};
pub use service::{Dashboard, ReportService};
