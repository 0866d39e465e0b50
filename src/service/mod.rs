pub mod background_jobs;
pub mod bid_service;
pub mod error;
pub mod event_bus;
pub mod gatekeeper;
pub mod job_lifecycle;
pub mod job_service;
pub mod mpesa;
pub mod pricing;
pub mod reputation;
pub mod settlement_service;
