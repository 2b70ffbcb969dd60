pub mod analyses;
pub mod auth;
pub mod drawings;
pub mod evaluations;
pub mod users;
