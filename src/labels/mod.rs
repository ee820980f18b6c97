pub mod character;
pub mod manifest;
pub mod preprocess;
pub(crate) mod table;
pub mod vocabulary;
