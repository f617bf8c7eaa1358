//! Default value functions for configuration.

/// Port the application-service listener binds to.
pub fn default_appservice_port() -> u16 {
    9999
}

/// Address the application-service listener binds to.
pub fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Plaintext IRC port used when a server block has no explicit address.
pub fn default_irc_port() -> u16 {
    6667
}
