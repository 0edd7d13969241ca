//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

fn render_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_default()
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);

    match args.command {
        ConfigCommand::Show => {
            let cfg = config::resolve(global)?;
            let format = config::output_format(global, &cfg);
            let out = output::render_single(format, &cfg, render_toml, |c| {
                c.cache_dir().display().to_string()
            })?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        // Does not load the existing file, so a broken one can be replaced.
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::Conflict {
                    resource_type: "config file".into(),
                    identifier: path.display().to_string(),
                    hint: "Use --force to overwrite it.".into(),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            tracing::info!(path = %path.display(), "config written");
            if !global.quiet {
                eprintln!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}
