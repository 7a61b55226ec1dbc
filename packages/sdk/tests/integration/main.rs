mod common;
mod save;
mod store;
