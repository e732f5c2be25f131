pub mod system;
pub mod tasks;
