pub mod auth;
pub mod bids;
pub mod jobs;
pub mod payments;
pub mod submissions;
pub mod users;
