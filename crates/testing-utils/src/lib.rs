//! # Crawler Testing Utils
//!
//! 工作区内各 crate 共用的测试替身与辅助函数。
//!
//! ```toml
//! [dev-dependencies]
//! crawler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod helpers;
pub mod mocks;

pub use helpers::*;
pub use mocks::*;
