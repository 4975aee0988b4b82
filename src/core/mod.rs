pub mod codec;
pub mod engine;
pub mod model;
pub mod output;
pub mod session;
pub mod validate;
