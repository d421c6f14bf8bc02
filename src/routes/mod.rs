pub mod appointments;
pub mod auth;
pub mod clinics;
pub mod health;
pub mod patients;
pub mod rbac;
pub mod users;
