mod long_poll;
mod ws;
