//! Broker configuration.

use embassy_time::Duration;
use heapless::String;

use crate::error::SessionError;

pub const MAX_HOST_LEN: usize = 64;
pub const MAX_USERNAME_LEN: usize = 20;
pub const MAX_PASSWORD_LEN: usize = 20;

/// What the session does after the broker connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReconnectPolicy {
    /// Stay disconnected until `start_session` is called again.
    #[default]
    Manual,
    /// Issue a new connect after the given delay.
    After(Duration),
}

/// Connection parameters handed to the transport driver on start.
///
/// A blank configuration (see [`SessionConfig::default`]) is what
/// `initialize_parameter` hands out; it does not pass validation until a
/// host and port have been filled in.
///
/// ```ignore
/// let config = SessionConfig::new("192.168.1.10", 1883)?
///     .with_credentials("gateway", "secret")?
///     .with_reconnect(ReconnectPolicy::After(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub host: String<MAX_HOST_LEN>,
    pub port: u16,
    pub username: String<MAX_USERNAME_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
    pub reconnect: ReconnectPolicy,
}

impl SessionConfig {
    pub fn new(host: &str, port: u16) -> Result<Self, SessionError> {
        let mut config = Self {
            port,
            ..Self::default()
        };
        config.host = bounded(host)?;
        Ok(config)
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Result<Self, SessionError> {
        self.username = bounded(username)?;
        self.password = bounded(password)?;
        Ok(self)
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Check that the configuration names a reachable broker.
    ///
    /// Length bounds are already enforced by the field types; credentials
    /// may be empty for anonymous brokers.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.host.is_empty() || self.port == 0 {
            return Err(SessionError::ConfigInvalid);
        }
        Ok(())
    }
}

fn bounded<const N: usize>(value: &str) -> Result<String<N>, SessionError> {
    let mut out = String::new();
    out.push_str(value).map_err(|_| SessionError::ConfigInvalid)?;
    Ok(out)
}
