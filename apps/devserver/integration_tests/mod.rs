mod build_cycle;
mod helpers;
mod server;
