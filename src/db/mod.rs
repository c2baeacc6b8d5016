pub mod db;
pub mod marketdb;
pub mod paymentdb;
pub mod userdb;
