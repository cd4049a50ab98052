//! ticketdesk-core: match, score and rank staff for incoming tickets, and
//! keep an append-only audit log of who got each one.
//!
//! Pipeline:
//!   roster + incidents → matcher → scorer → recommender → desk → assignment log

pub mod assignment;
pub mod config;
pub mod desk;
pub mod error;
pub mod explain;
pub mod incident;
pub mod ingest;
pub mod llm_client;
pub mod matcher;
pub mod recommender;
pub mod roster;
pub mod scorer;
pub mod store;
pub mod types;
