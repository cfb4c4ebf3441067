use std::path::PathBuf;

const WARDEN_CONFIG: &str = "WARDEN_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./config.json";

pub fn get_config_path() -> String {
    let path_from_env = std::env::var(WARDEN_CONFIG);
    path_from_env.unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const WARDEN_STATE: &str = "WARDEN_STATE";

const DEFAULT_STATE_PATH: &str = "./warden_state.json";

pub fn get_state_path() -> PathBuf {
    let path_from_env = std::env::var(WARDEN_STATE);
    path_from_env.map_or(PathBuf::from(DEFAULT_STATE_PATH), PathBuf::from)
}
