pub mod cache;
pub mod importers;
pub mod persistence;
pub mod provider;
pub mod registry;
