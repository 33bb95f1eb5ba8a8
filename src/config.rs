use serde::{Deserialize, Serialize};

/// Default amount of seconds between location broadcasts
const fn default_broadcast_interval() -> u64 {
    30
}

/// Default amount of seconds between message retries on reporting nodes
const fn default_message_retry_interval() -> u64 {
    10
}

/// Default resolution page budget in bytes
const fn default_page_size_limit() -> u64 {
    16 * 1024
}

/// Lookup and synchronization configuration
///
/// Injected at construction; none of the components read process-wide
/// state.
#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    /// Amount of seconds between periodic location broadcasts
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval: u64,

    /// Amount of seconds between message retries on reporting nodes
    ///
    /// The replica down timer is derived from this: half the retry
    /// interval, floored at one second.
    #[serde(default = "default_message_retry_interval")]
    pub message_retry_interval: u64,

    /// Byte budget for one page of resolution entries
    #[serde(default = "default_page_size_limit")]
    pub page_size_limit: u64,
}

#[cfg(not(test))]
impl Default for Config {
    fn default() -> Self {
        Config {
            broadcast_interval: default_broadcast_interval(),
            message_retry_interval: default_message_retry_interval(),
            page_size_limit: default_page_size_limit(),
        }
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Config {
            broadcast_interval: 1,
            message_retry_interval: 2,
            page_size_limit: 256,
        }
    }
}
