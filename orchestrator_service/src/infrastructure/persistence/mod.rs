pub mod models;
pub mod operation_repository;
pub mod wallet_repository;
