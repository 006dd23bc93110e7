// HTTP surface — the one-route download endpoint and server lifecycle.

pub mod handler;
