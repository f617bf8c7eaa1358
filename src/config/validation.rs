//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use slirc_proto::ChannelExt;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("homeserver.domain is required")]
    MissingDomain,
    #[error("homeserver.url is required")]
    MissingHomeserverUrl,
    #[error("appservice.{0} must not be empty")]
    EmptyToken(&'static str),
    #[error("at least one [servers.\"<id>\"] block is required")]
    NoServers,
    #[error("servers.\"{0}\".nick is required")]
    MissingBotNick(String),
    #[error("server id '{0}' must not contain '_' (user ids would be ambiguous)")]
    AmbiguousServerId(String),
    #[error("servers.\"{0}\" maps '{1}', which is not a channel name")]
    InvalidChannel(String, String),
    #[error("servers.\"{0}\" maps '{1}' to '{2}', which is not a room id")]
    InvalidRoomId(String, String, String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.homeserver.domain.is_empty() {
        errors.push(ValidationError::MissingDomain);
    }
    if config.homeserver.url.is_empty() {
        errors.push(ValidationError::MissingHomeserverUrl);
    }
    if config.appservice.hs_token.is_empty() {
        errors.push(ValidationError::EmptyToken("hs_token"));
    }
    if config.appservice.as_token.is_empty() {
        errors.push(ValidationError::EmptyToken("as_token"));
    }

    if config.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }

    for (id, server) in &config.servers {
        if id.contains('_') {
            errors.push(ValidationError::AmbiguousServerId(id.clone()));
        }
        if server.nick.is_empty() {
            errors.push(ValidationError::MissingBotNick(id.clone()));
        }
        for (channel, rooms) in &server.rooms.mappings {
            if !channel.is_channel_name() {
                errors.push(ValidationError::InvalidChannel(id.clone(), channel.clone()));
            }
            for room in rooms {
                if !room.starts_with('!') || !room.contains(':') {
                    errors.push(ValidationError::InvalidRoomId(
                        id.clone(),
                        channel.clone(),
                        room.clone(),
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
