pub mod executor;
pub mod model;
pub mod resolver;
pub mod submit;
