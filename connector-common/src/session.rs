use serde::Serialize;
use zenoh::Session;

use crate::config::ZenohConfig;
use crate::error::{Error, Result};

/// Open a Zenoh session for publishing measurements.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    let zenoh_config = session_config(config)?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Opening Zenoh session"
    );

    let session = zenoh::open(zenoh_config).await?;
    tracing::info!(zid = %session.zid(), "Zenoh session open");

    Ok(session)
}

/// Translate connector settings into a Zenoh configuration.
pub fn session_config(config: &ZenohConfig) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    set(&mut zenoh_config, "mode", &config.mode)?;
    if !config.connect.is_empty() {
        set(&mut zenoh_config, "connect/endpoints", &config.connect)?;
    }
    if !config.listen.is_empty() {
        set(&mut zenoh_config, "listen/endpoints", &config.listen)?;
    }

    Ok(zenoh_config)
}

fn set<T: Serialize + ?Sized>(zenoh_config: &mut zenoh::Config, key: &str, value: &T) -> Result<()> {
    let invalid = |reason: String| Error::ZenohConfig {
        key: key.to_string(),
        reason,
    };

    let json = serde_json::to_string(value).map_err(|e| invalid(e.to_string()))?;
    zenoh_config
        .insert_json5(key, &json)
        .map_err(|e| invalid(e.to_string()))
}
