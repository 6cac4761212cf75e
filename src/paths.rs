use std::path::PathBuf;

/// Returns the user's home directory, honouring `RAGPROBE_HOME` first.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("RAGPROBE_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from)
        })
}

/// Returns the default path to ~/.env (or $RAGPROBE_HOME/.env if set).
pub fn home_env_path() -> Option<PathBuf> {
    home_dir().map(|mut dir| {
        dir.push(".env");
        dir
    })
}

/// Returns the directory where run logs are written.
pub fn data_dir() -> PathBuf {
    if let Some(mut dir) = home_dir() {
        dir.push(".ragprobe");
        dir
    } else {
        PathBuf::from(".ragprobe")
    }
}
