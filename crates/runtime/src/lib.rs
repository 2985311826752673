//! Production wiring for the outreach pipeline: HTTP clients for the mail API
//! and the lead-scraping actor, plus assembly of a [`Pipeline`] from
//! configuration and a database pool.
//!
//! [`Pipeline`]: outreach_core::pipeline::Pipeline

pub mod assembly;
pub mod mailer;
pub mod scraper;

#[cfg(test)]
mod test_support;

pub use assembly::{build_pipeline, production_deps, AssemblyError};
pub use mailer::HttpMailSender;
pub use scraper::ActorLeadSource;
