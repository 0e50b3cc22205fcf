mod client;
mod helpers;
mod hub_tests;
mod port;
mod transport;
