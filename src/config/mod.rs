mod settings;

use std::env;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BusSettings, LogSettings, ProducerSettings, ProtocolSettings, RunMode, ServerSettings,
    Settings, ShutdownSettings,
};

/// Loads the configuration from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the optional file at `path` (any format the
/// `config` crate recognises by extension) and the environment.
///
/// Precedence, lowest first: defaults, the file, `TICKBUS_<SECTION>__<KEY>`
/// variables, then the plain `PORT` and `APP_ENV` variables.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("TICKBUS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("server.port", env::var("PORT").ok())?
        .set_override_option("server.mode", env::var("APP_ENV").ok())?;

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
