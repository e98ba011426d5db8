//! sea-orm entities for the relational backend.

pub mod accounts;
pub mod idempotency;
pub mod media_assets;
pub mod op_log;
pub mod records;
