mod connection_handler;
mod node;

pub use node::Node;
