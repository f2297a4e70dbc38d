use std::{error::Error, path::Path};

use crate::config::TomlConfig;

#[derive(clap::Args)]
#[command(about = "Write a default configuration file", long_about = None)]
pub struct Initialize {}

impl Initialize {
    pub fn init(self, path: &Path) -> Result<(), Box<dyn Error>> {
        if std::fs::exists(path)? {
            eprintln!("{} already exists.\nExiting...", path.display());
            return Ok(());
        }
        let toml = toml::to_string_pretty(&TomlConfig::default())?;
        std::fs::write(path, toml)?;
        eprintln!("Written config to {}!", path.display());
        Ok(())
    }
}
