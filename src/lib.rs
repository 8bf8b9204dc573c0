pub mod app;
pub mod audio;
pub mod config;
pub mod fractal_config;
pub mod kernels;
pub mod project;
pub mod render;
pub mod spectrum;
pub mod terminal;
pub mod visualizer;
