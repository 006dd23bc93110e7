// Audio download relay — streams extractor subprocess output to HTTP clients.

pub mod config;
pub mod extractor;
pub mod normalize;
pub mod relay;
pub mod server;
