pub mod bootstrap;
pub mod handlers;
