pub mod hook;
pub mod schema;
pub mod serve;
pub mod status;
