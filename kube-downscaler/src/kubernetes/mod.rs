pub mod adapters;
pub mod client;
pub mod controller;
pub mod crds;
pub mod filter;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod scaler;
pub mod workload;
