use icy_rlefont::{OptimizerOptions, PartitionOptions};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Optimize iterations run when neither the command line nor the options
/// file say otherwise. 0 runs until interrupted.
pub const DEFAULT_SESSION_LIMIT: usize = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Options {
    #[serde(default = "default_session_limit")]
    pub session_limit: usize,

    #[serde(default)]
    pub optimizer: OptimizerOptions,

    #[serde(default)]
    pub partition: PartitionOptions,
}

fn default_session_limit() -> usize {
    DEFAULT_SESSION_LIMIT
}

impl Default for Options {
    fn default() -> Self {
        Self {
            session_limit: DEFAULT_SESSION_LIMIT,
            optimizer: OptimizerOptions::default(),
            partition: PartitionOptions::default(),
        }
    }
}

impl Options {
    pub fn load_options() -> Self {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "GitHub", "icy_fontopt") {
            if !proj_dirs.config_dir().exists() && fs::create_dir_all(proj_dirs.config_dir()).is_err() {
                log::error!("Can't create configuration directory {:?}", proj_dirs.config_dir());
                return Self::default();
            }
            let options_file = proj_dirs.config_dir().join("options.toml");
            if options_file.exists() {
                match fs::read_to_string(options_file) {
                    Ok(txt) => match Self::from_toml(&txt) {
                        Ok(result) => return result,
                        Err(err) => log::error!("Error parsing options file: {}", err),
                    },
                    Err(err) => log::error!("Error reading options file: {}", err),
                }
            } else {
                Self::default().store_options();
            }
        }
        Self::default()
    }

    pub fn store_options(&self) {
        if let Some(file_name) = Self::get_options_file() {
            match toml::to_string(self) {
                Ok(text) => {
                    if let Err(err) = fs::write(file_name, text) {
                        log::error!("Error writing options file: {}", err);
                    }
                }
                Err(err) => log::error!("Error writing options file: {}", err),
            }
        }
    }

    pub fn from_toml(txt: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(txt)
    }

    pub fn get_options_file() -> Option<PathBuf> {
        Self::get_config_dir().map(|dir| dir.join("options.toml"))
    }

    /// Returns the configuration directory path
    pub fn get_config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "GitHub", "icy_fontopt").map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
    }

    /// Returns the log directory path
    pub fn get_log_dir() -> Option<PathBuf> {
        let dir = Self::get_config_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir).ok()?;
        }
        Some(dir)
    }
}
