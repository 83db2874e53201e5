pub mod node_to_node;
