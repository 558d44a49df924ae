use crate::{EmsError, Result, ServerConfig};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

fn read_properties<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let file = File::open(&path).map_err(|e| {
        EmsError::InvalidArgument(format!("Failed to open config file {:?}: {}", path.as_ref(), e))
    })?;

    let reader = BufReader::new(file);
    java_properties::read(reader)
        .map_err(|e| EmsError::InvalidArgument(format!("Failed to parse properties: {}", e)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        EmsError::InvalidArgument(format!("Invalid value for {}: {:?}", key, value))
    })
}

/// Parse a Java properties file into a ServerConfig, starting from defaults.
pub fn parse_properties_file<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
    merge_properties(ServerConfig::default(), path)
}

/// Apply the properties in `path` on top of an existing config.
pub fn merge_properties<P: AsRef<Path>>(mut config: ServerConfig, path: P) -> Result<ServerConfig> {
    let properties = read_properties(path)?;

    for (key, value) in properties {
        match key.as_str() {
            "server.pipe" => config.server_pipe = PathBuf::from(value),
            "state.access.delay.us" => config.access_delay_us = parse_number(&key, &value)?,
            "max.sessions" => config.max_sessions = parse_number(&key, &value)?,
            "message.size" => config.message_size = parse_number(&key, &value)?,
            "shutdown.timeout.secs" => config.shutdown_timeout_secs = parse_number(&key, &value)?,
            _ => {
                config.additional_properties.insert(key, value);
            }
        }
    }

    Ok(config)
}
