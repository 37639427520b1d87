//! Config command - show the effective engine configuration

use clap::Subcommand;
use engine::EngineConfig;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Print the configuration after defaults, file and environment are merged
    #[command(name = "show")]
    Show,

    /// Check the configuration without running anything
    #[command(name = "validate")]
    Validate,
}

impl ConfigCommand {
    pub fn execute(&self, config: &EngineConfig) -> anyhow::Result<()> {
        match self {
            ConfigCommand::Show => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            ConfigCommand::Validate => {
                config.validate()?;
                println!("configuration is valid");
            }
        }
        Ok(())
    }
}
