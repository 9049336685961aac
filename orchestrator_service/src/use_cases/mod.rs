pub mod create_wallet;
pub mod execute_operation;
pub mod fund_wallet;
pub mod get_operation;
pub mod get_wallet;
pub mod submit_intent;
