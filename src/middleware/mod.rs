// Middleware module
pub mod main_middleware;
