pub mod builder;
pub mod catalog;
pub mod completion;
pub mod constants;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod highlight;
pub mod layout;
pub mod protocol;
pub mod puzzle;
pub mod registry;
pub mod rng;
pub mod types;
