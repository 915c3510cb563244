pub mod admin;
pub mod phone;
pub mod sessions;
