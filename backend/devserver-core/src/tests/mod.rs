mod client_state;
mod port;
mod support;
