pub mod aggregation;
pub mod background_jobs;
pub mod chip;
pub mod error;
pub mod escrow;
pub mod payment_service;
