pub mod adapter;
pub mod monitor;
pub mod persistence;
pub mod proxy;
pub mod repository;

pub use adapter::*;
pub use monitor::*;
pub use persistence::*;
pub use proxy::*;
pub use repository::*;
