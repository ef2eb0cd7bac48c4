pub mod cache;
pub mod cached;
pub mod json_file;
pub mod memory;
pub mod row_mapper;
