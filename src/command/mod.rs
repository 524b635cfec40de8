pub mod dispatcher;
pub mod policy;
pub mod types;
