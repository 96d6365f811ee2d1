//! Data models

pub mod assignment;
pub mod equipment;
pub mod membership;
pub mod organization;
pub mod project;
pub mod provider;
pub mod user;
pub mod webhook;

pub use assignment::*;
pub use equipment::*;
pub use membership::*;
pub use organization::*;
pub use project::*;
pub use provider::*;
pub use user::*;
pub use webhook::*;
