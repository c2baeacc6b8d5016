// Request/response DTOs
pub mod marketdtos;
pub mod paymentdtos;
pub mod userdtos;
