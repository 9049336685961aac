pub mod json_rpc_ledger_gateway;
pub mod stub_ledger_gateway;
