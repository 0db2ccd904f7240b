pub mod console;
pub mod dataset;
pub mod manifest;
pub mod session;
