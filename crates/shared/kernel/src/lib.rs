//! Kernel utilities shared by the transaction manager crates.
//! Keep this crate lightweight; today it only carries the layered config loader.
//!
//! ## Config loading
//! ```rust,no_run
//! use gts_kernel::config::load_config;
//! use gts_kernel::domain::config::ManagerConfig;
//!
//! let cfg: ManagerConfig = load_config(Some("manager")).unwrap();
//! println!("listening on {}:{}", cfg.server.address, cfg.server.port);
//! ```
pub mod config;

pub use gts_domain as domain;
