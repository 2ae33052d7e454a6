pub mod config;
pub mod entity;
pub mod gen;
pub mod ledger;
pub mod pipeline;
pub mod render;
pub mod seed;
pub mod sink;
