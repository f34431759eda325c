// Domain layer: request/response models and the ports the dispatcher and handlers depend on.

pub mod model;
pub mod ports;
