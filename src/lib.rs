pub mod config;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod fetch;
pub mod loader;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod sampler;
pub mod stats;
pub mod tidy;
