//! Account management module
//!
//! Account creation and cache-aside reads. Balances are never written here;
//! see [`crate::transfer::engine`].

pub mod repository;
pub mod service;

pub use repository::AccountRepository;
pub use service::AccountService;
