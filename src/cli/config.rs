use std::fs;
use std::path::PathBuf;

use crate::security::SecurityState;

pub const SESSION_FILE: &str = "session.json";

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("SDA_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("sda").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn load_session_state() -> anyhow::Result<SecurityState> {
    let session_file = get_config_dir()?.join(SESSION_FILE);

    if !session_file.exists() {
        return Ok(SecurityState::default());
    }

    let content = fs::read_to_string(session_file)?;
    let state: SecurityState = serde_json::from_str(&content)?;
    Ok(state)
}

pub fn save_session_state(state: &SecurityState) -> anyhow::Result<()> {
    let session_file = get_config_dir()?.join(SESSION_FILE);

    let content = serde_json::to_string_pretty(state)?;
    fs::write(session_file, content)?;
    Ok(())
}

pub fn clear_session_state() -> anyhow::Result<()> {
    let session_file = get_config_dir()?.join(SESSION_FILE);

    if session_file.exists() {
        fs::remove_file(session_file)?;
    }
    Ok(())
}
