pub mod appointment;
pub mod clinic;
pub mod patient;
pub mod rbac;
pub mod user;
