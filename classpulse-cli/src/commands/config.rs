//! `classpulse config`

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{ClasspulseConfig, ConfigLoader};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the merged configuration with defaults applied
    Show {
        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Print the user and project config locations
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show { json } => {
            let config = ConfigLoader::load()?;
            println!("{}", render(&config, json)?);
            Ok(())
        }
        ConfigCommands::Path => {
            match ConfigLoader::user_config_path() {
                Some(path) => println!("user:    {}", describe(&path)),
                None => println!("user:    (no home directory)"),
            }
            println!("project: {}", describe(&ConfigLoader::project_config_path()));
            Ok(())
        }
    }
}

fn render(config: &ClasspulseConfig, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(config)?)
    } else {
        Ok(toml::to_string_pretty(config)?)
    }
}

fn describe(path: &Path) -> String {
    let state = if path.exists() { "found" } else { "missing" };
    format!("{} ({state})", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_toml_has_every_section() {
        let rendered = render(&ClasspulseConfig::default(), false).unwrap();
        for section in ["[queue]", "[dispatcher]", "[guard]", "[session]"] {
            assert!(rendered.contains(section), "missing {section} in\n{rendered}");
        }
        assert!(rendered.contains("store_timeout = \"5s\""));
    }

    #[test]
    fn test_render_json() {
        let rendered = render(&ClasspulseConfig::default(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["queue"]["group"], "classpulse-ingest");
    }

    #[test]
    fn test_describe_marks_missing_files() {
        assert!(describe(Path::new("/nonexistent/classpulse/config.toml")).ends_with("(missing)"));
    }
}
