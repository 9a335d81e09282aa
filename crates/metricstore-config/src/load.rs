use std::path::Path;

use crate::error::{Error, Result};
use crate::resolve::{resolve, Config};
use crate::schema::RawConfig;

/// Reads, parses, and validates the configuration file at `path`.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_owned(),
        source,
    })?;
    let raw: RawConfig = serde_json::from_str(&text).map_err(|source| Error::Parse {
        path: path.to_owned(),
        source,
    })?;
    resolve(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "checkpoints": {"interval": "30s", "directory": "/data/checkpoints"},
                "archive": {"interval": "1h", "directory": "/data/archive"},
                "retention-in-memory": "24h",
                "memory-cap": 64
            }"#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.memory_cap_gb, 64.0);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(matches!(load(&path), Err(Error::Read { .. })));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load(&path), Err(Error::Parse { .. })));
    }
}
