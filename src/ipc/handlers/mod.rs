pub mod backup_exchange;
pub mod calc;
pub mod classes;
pub mod core;
pub mod grades;
pub mod settings;
