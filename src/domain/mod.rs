pub mod analysis;
pub mod category_tree;
pub mod error;
pub mod marketplace;
pub mod ports;
pub mod record;
pub mod schema;
pub mod value_objects;
