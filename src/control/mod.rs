pub mod backoff;
pub mod controller;
pub mod events;
pub mod supervisor;
