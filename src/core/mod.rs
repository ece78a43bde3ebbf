pub mod controller;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod window;
