use std::path::PathBuf;

/// Environment variable holding the remote service base URL.
pub const API_ENV_VAR: &str = "DMDJ_API";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/dmdj/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("dmdj")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dmdj")
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dmdj")
}

pub fn log_path() -> PathBuf {
    data_dir().join("dmdj.log")
}
