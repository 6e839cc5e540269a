//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod html_report_renderer;
mod in_memory_audit_repository;
mod in_memory_campaign_repository;
mod postgres_audit_repository;
mod postgres_campaign_repository;
mod system_clock;

pub use html_report_renderer::HtmlReportRenderer;
pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_campaign_repository::InMemoryCampaignRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_campaign_repository::PostgresCampaignRepository;
pub use system_clock::SystemClock;
