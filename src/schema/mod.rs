pub mod stage;
pub mod table;
pub mod tree;
