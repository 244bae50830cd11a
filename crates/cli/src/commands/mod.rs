pub mod config_cmd;
pub mod pack;
pub mod search;
