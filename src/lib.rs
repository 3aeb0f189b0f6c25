#![warn(clippy::all, rust_2018_idioms)]

pub mod labels;
pub mod map;
pub mod maps_api;
pub mod ui;
