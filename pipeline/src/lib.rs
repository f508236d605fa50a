pub mod compositor;
pub mod display;
pub mod filter;
pub mod paths;
pub mod recorder;
pub mod snapshot;
pub mod stats;
