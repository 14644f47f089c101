pub mod admin;
pub mod docs;
pub mod health;
pub mod jwt;
pub mod users;
