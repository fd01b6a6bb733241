mod controller;
mod network_flows;
mod workload;
