//! Identity mapping between IRC and Matrix.
//!
//! A virtual Matrix user stands in for one nick on one IRC network. Its
//! localpart is `{server_id}_{nick}`, so the mapping is invertible from the
//! string alone as long as no server id contains `_` (enforced by config
//! validation). Room aliases for channels use the same `{server_id}_{channel}`
//! shape.

use crate::error::{BridgeError, BridgeResult};
use slirc_proto::ChannelExt;

/// One IRC nick on one IRC network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualIdentity {
    pub server_id: String,
    pub nick: String,
}

impl VirtualIdentity {
    pub fn new(server_id: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            nick: nick.into(),
        }
    }

    /// `{server_id}_{nick}`.
    pub fn localpart(&self) -> String {
        format!("{}_{}", self.server_id, self.nick)
    }

    /// `@{server_id}_{nick}:{domain}`.
    pub fn user_id(&self, domain: &str) -> String {
        irc_user_id_for(&self.server_id, &self.nick, domain)
    }
}

/// Build the Matrix user id for an IRC nick.
pub fn irc_user_id_for(server_id: &str, nick: &str, domain: &str) -> String {
    format!("@{server_id}_{nick}:{domain}")
}

/// Build the alias localpart for an IRC channel.
pub fn alias_localpart_for(server_id: &str, channel: &str) -> String {
    format!("{server_id}_{channel}")
}

/// Split a Matrix identifier (`@user:domain`, `#alias:domain`) into its
/// localpart and domain.
pub fn split_id(id: &str, sigil: char) -> Option<(&str, &str)> {
    id.strip_prefix(sigil)?.split_once(':')
}

/// Deterministic, reversible mapping for the configured IRC networks.
#[derive(Debug, Clone)]
pub struct IdentityMapper {
    domain: String,
    /// Longest first, so a server id that prefixes another never shadows it.
    server_ids: Vec<String>,
}

impl IdentityMapper {
    pub fn new<I, S>(domain: impl Into<String>, server_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut server_ids: Vec<String> = server_ids.into_iter().map(Into::into).collect();
        server_ids.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            domain: domain.into(),
            server_ids,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.homeserver.domain.clone(), config.servers.keys().cloned())
    }

    /// The homeserver domain virtual users live on.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Matrix user id for a nick on a network.
    pub fn user_id_for(&self, server_id: &str, nick: &str) -> String {
        irc_user_id_for(server_id, nick, &self.domain)
    }

    /// Recover the network and nick from a virtual user id.
    pub fn parse(&self, user_id: &str) -> BridgeResult<VirtualIdentity> {
        let unrecognized = || BridgeError::UnrecognizedIdentity(user_id.to_string());
        let (localpart, domain) = split_id(user_id, '@').ok_or_else(unrecognized)?;
        if domain != self.domain {
            return Err(unrecognized());
        }
        let (server_id, nick) = self.split_prefixed(localpart).ok_or_else(unrecognized)?;
        Ok(VirtualIdentity::new(server_id, nick))
    }

    /// Whether a user id belongs to a virtual IRC user.
    pub fn is_virtual(&self, user_id: &str) -> bool {
        self.parse(user_id).is_ok()
    }

    /// Recover the network and channel from an alias like
    /// `#irc.example_#foobar:hs.example`.
    pub fn parse_alias(&self, alias: &str) -> BridgeResult<(String, String)> {
        let unrecognized = || BridgeError::UnrecognizedIdentity(alias.to_string());
        let (localpart, domain) = split_id(alias, '#').ok_or_else(unrecognized)?;
        if domain != self.domain {
            return Err(unrecognized());
        }
        let (server_id, channel) = self.split_prefixed(localpart).ok_or_else(unrecognized)?;
        if !channel.is_channel_name() {
            return Err(unrecognized());
        }
        Ok((server_id.to_string(), channel.to_string()))
    }

    fn split_prefixed<'a>(&self, localpart: &'a str) -> Option<(&'a str, &'a str)> {
        self.server_ids.iter().find_map(|id| {
            let rest = localpart.strip_prefix(id.as_str())?.strip_prefix('_')?;
            (!rest.is_empty()).then(|| (&localpart[..id.len()], rest))
        })
    }
}

/// Derive an IRC nick for a real Matrix user.
///
/// Uses the localpart, dropping characters IRC does not allow in nicks and
/// prefixing `M-` when the result would start with a digit or `-`.
pub fn irc_nick_for(matrix_user_id: &str) -> String {
    let localpart = split_id(matrix_user_id, '@')
        .map(|(local, _)| local)
        .unwrap_or(matrix_user_id);

    let mut nick: String = localpart.chars().filter(|c| is_nick_char(*c)).collect();
    if nick.is_empty() {
        nick.push_str("M-user");
    } else if nick.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        nick.insert_str(0, "M-");
    }
    nick
}

/// Nicks to try for a real Matrix user, most preferred first.
///
/// Starts with [`irc_nick_for`], then the same nick tagged with the first
/// label of the user's homeserver (`flibble[evil]` for
/// `@flibble:evil.example`), then that tag numbered from 2. Never ends.
pub fn irc_nick_candidates(matrix_user_id: &str) -> impl Iterator<Item = String> + use<> {
    let base = irc_nick_for(matrix_user_id);
    let tag: String = split_id(matrix_user_id, '@')
        .and_then(|(_, domain)| domain.split(['.', ':']).next())
        .unwrap_or_default()
        .chars()
        .filter(|c| is_nick_char(*c) && !"[]".contains(*c))
        .collect();
    let tagged = if tag.is_empty() {
        format!("{base}[m]")
    } else {
        format!("{base}[{tag}]")
    };

    std::iter::once(base)
        .chain(std::iter::once(tagged.clone()))
        .chain((2u32..).map(move |n| format!("{tagged}{n}")))
}

fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-[]\\^{}|`".contains(c)
}
