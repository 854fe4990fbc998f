pub mod drafts;
pub mod lifecycle;
pub mod scoring;
pub mod session;
