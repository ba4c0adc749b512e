//! Domain types for the synchronization engine

pub mod dto;
pub mod entities;
pub mod integration;
pub mod provider;
pub mod sync_job;
