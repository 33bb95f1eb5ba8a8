use once_cell::sync::Lazy;

use crate::config::Config;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    pretty_env_logger::try_init().ok();
    Config::default()
});
