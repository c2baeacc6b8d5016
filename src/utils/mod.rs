// Utility modules
pub mod currency;
pub mod password;
pub mod token;
