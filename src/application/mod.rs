pub mod analyzer;
pub mod batch;
pub mod confirmation;
pub mod context;
pub mod entity;
pub mod id_generator;
pub mod merge;
pub mod monitoring;
