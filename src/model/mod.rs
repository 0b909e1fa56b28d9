//! Data models, split by where they are used.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;
