//! `echogarden config` — Show the effective configuration.

use echogarden_config::EngineConfig;

pub fn show(config: &EngineConfig) {
    println!("{}", config.to_toml());
}
