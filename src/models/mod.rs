// Data models
pub mod marketmodel;
pub mod usermodel;
