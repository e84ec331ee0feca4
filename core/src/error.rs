use std::{error, fmt};

/**
An invalid encoder configuration.
*/
pub struct ConfigError {
    msg: String,
}

impl ConfigError {
    pub(crate) fn msg(msg: impl Into<String>) -> Self {
        ConfigError { msg: msg.into() }
    }
}

impl error::Error for ConfigError {}

impl fmt::Debug for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigError").field("msg", &self.msg).finish()
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}
