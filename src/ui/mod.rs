pub mod map_app;
