mod build_state_builder;
mod message;
mod policy;
