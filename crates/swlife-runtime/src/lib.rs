//! swlife-runtime: async controllers for one page (tab), the fingerprint
//! generator, configuration, and the end-to-end simulation.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod fingerprint;
pub mod install;
pub mod page;
pub mod presenter;
pub mod registration;
pub mod simulate;
pub mod surface;

pub use config::LifecycleConfig;
pub use page::{PageDeps, PageSession, PageSignal};
