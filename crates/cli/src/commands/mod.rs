pub mod doctor;
pub mod gateway;
pub mod history;
pub mod onboard;

use askgate_config::AppConfig;

/// Load the config file, mapping failures to a printable message.
pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}
