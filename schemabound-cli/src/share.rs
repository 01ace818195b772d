use std::path::PathBuf;

pub fn get_share_dir() -> PathBuf {
    if let Some(path) = std::env::var_os("SCHEMABOUND_SHARE_DIR") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".schemabound")
}
