pub mod builder;
pub mod decoder;
pub mod registry;
pub mod traits;
