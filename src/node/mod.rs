//! node
//!
//! Node aggregates and the node command handler.

pub mod aggregate;
pub mod handler;

pub use aggregate::{NodeAggregate, NodeAggregateClassification, PropertyValues};
pub use handler::NodeCommandHandler;
