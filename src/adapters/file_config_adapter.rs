//! INI file configuration adapter.

use crate::domain::error::VoltraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, VoltraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| VoltraderError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, VoltraderError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| VoltraderError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// Drop a trailing ` ; comment` or ` # comment`.
    fn strip_inline_comment(value: &str) -> &str {
        let cut = [" ;", "\t;", " #", "\t#"]
            .iter()
            .filter_map(|marker| value.find(marker))
            .min();
        match cut {
            Some(i) => value[..i].trim_end(),
            None => value,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| Self::strip_inline_comment(&v).to_string())
    }
}
