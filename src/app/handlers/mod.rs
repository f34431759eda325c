pub mod default_handler;
pub mod ladder_handler;

pub use default_handler::DefaultActionHandler;
pub use ladder_handler::LadderActionHandler;
