// Core modules implementing the Skiff reader, schema model, materializer and decoder.
pub mod decoder;
pub mod error;
pub mod options;
pub mod reader;
pub mod scan;
pub mod schema;
pub mod value;
