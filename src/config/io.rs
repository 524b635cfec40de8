use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{debug, info};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::Config;
use crate::error::ConfigError;

// volcano-control.json in an os dependent standard directory, such as ~/.config on linux
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("nl", "volcano-control", "volcano-control").map(|dirs| {
        dirs.config_dir().join("volcano-control.json")
    })
}

fn get_config_path(override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    /// Exclusive for as long as the guard lives; a second instance gets `CanNotLock`.
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    pub fn new_sync(override_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = get_config_path(override_path)?;
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent().filter(|directory| !directory.as_os_str().is_empty()) {
            std::fs::create_dir_all(directory)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(&path)?;

        let inner = ConfigIOInner { file };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");
        let file = inner.file.try_clone()?; // std File
        Ok(File::from_std(file)) // tokio File
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;
        debug!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        debug!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("volcano-control-{}-{}.json", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_empty_file_reads_defaults_and_save_round_trips() {
        let path = temp_config_path("io");
        let config_io = ConfigIO::new_sync(Some(&path)).unwrap();
        assert_eq!(config_io.read().await.unwrap(), Config::default());

        let mut config = Config::default();
        config.device_address = Some("AA:BB:CC:DD:EE:FF".to_string());
        config_io.save(&config).await.unwrap();

        config.device_address = None;
        config_io.save(&config).await.unwrap();
        assert_eq!(config_io.read().await.unwrap(), config);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_the_open_file() {
        let path = temp_config_path("clone");
        let config_io = ConfigIO::new_sync(Some(&path)).unwrap();
        let other = config_io.clone();

        let mut config = Config::default();
        config.device_address = Some("11:22:33:44:55:66".to_string());
        other.save(&config).await.unwrap();
        assert_eq!(config_io.read().await.unwrap(), config);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_lock_is_exclusive() {
        let path = temp_config_path("lock");
        let config_io = ConfigIO::new_sync(Some(&path)).unwrap();

        let mut first = config_io.locker().unwrap();
        let _guard = first.lock().unwrap();

        let other = ConfigIO::new_sync(Some(&path)).unwrap();
        let mut second = other.locker().unwrap();
        assert!(matches!(second.lock(), Err(ConfigError::CanNotLock { .. })));

        drop(_guard);
        std::fs::remove_file(&path).unwrap();
    }
}
