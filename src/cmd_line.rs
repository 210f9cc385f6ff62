//! Command line options that are used across applications.

use std::path::{Path, PathBuf};

use clap::{crate_version, Arg, ArgMatches, Command};

use crate::{config::Config, errors::DtExtractErr, logging::LogConfig, times::parse_basetime};

/// Struct to package up command line arguments.
#[derive(Clone, Debug)]
pub struct CommonCmdLineArgs {
    // Path to the configuration file
    config_path: PathBuf,
    // The configuration, with any base time override applied
    config: Config,
    // Logging settings, from --loglevel or the configuration
    log: LogConfig,
}

impl CommonCmdLineArgs {
    /// Create a new set of args.
    pub fn new_app(app_name: &'static str, about: &'static str) -> Command {
        Command::new(app_name)
            .about(about)
            .version(crate_version!())
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .required(true)
                    .value_name("FILE")
                    .help("Path to the TOML configuration file."),
            )
            .arg(
                Arg::new("basetime")
                    .short('b')
                    .long("basetime")
                    .value_name("TIME")
                    .help("Base time of the cycle to process.")
                    .long_help(concat!(
                        "Base time of the cycle to process, e.g. 2024-03-05T00:00:00Z or ",
                        "2024030500. Overrides general.times.basetime in the configuration."
                    )),
            )
            .arg(
                Arg::new("loglevel")
                    .short('l')
                    .long("loglevel")
                    .value_name("LEVEL")
                    .help("Log level, overriding general.loglevel."),
            )
    }

    /// Process a `Command` to get the parsed values out of it and the matches object so an
    /// application can continue with further argument parsing.
    pub fn matches(app: Command) -> Result<(Self, ArgMatches), DtExtractErr> {
        let matches = app.get_matches();

        let cmd_line_opts = Self::from_matches(&matches)?;

        Ok((cmd_line_opts, matches))
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, DtExtractErr> {
        let config_path = matches
            .get_one::<String>("config")
            .map(PathBuf::from)
            .ok_or_else(|| DtExtractErr::Config("no configuration file given".to_owned()))?;

        let mut config = Config::load(&config_path)?;

        if let Some(basetime) = matches.get_one::<String>("basetime") {
            config.set_basetime(&parse_basetime(basetime)?);
        }

        let log = match matches.get_one::<String>("loglevel") {
            Some(level) => level.parse::<LogConfig>()?,
            None => config.general.loglevel.parse::<LogConfig>()?,
        };

        Ok(CommonCmdLineArgs {
            config_path,
            config,
            log,
        })
    }

    /// Get the path of the configuration file
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the logging settings
    pub fn log(&self) -> LogConfig {
        self.log
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;
    use crate::config::TEST_CONFIG;

    use tempdir::TempDir;

    #[test]
    fn test_basetime_override() {
        let tmp = TempDir::new("dt-extract-cmd").unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, TEST_CONFIG).unwrap();
        let path = path.to_string_lossy().into_owned();

        let matches = CommonCmdLineArgs::new_app("test", "testing")
            .try_get_matches_from(vec!["test", "-c", path.as_str(), "--basetime", "2024030200"])
            .unwrap();
        let args = CommonCmdLineArgs::from_matches(&matches).unwrap();

        assert_eq!(args.config().general.times.basetime, "2024-03-02T00:00:00Z");
        assert_eq!(args.log().external_name(), "DEBUG");
        assert_eq!(args.config_path(), Path::new(&path));
    }

    #[test]
    fn test_loglevel_override() {
        let tmp = TempDir::new("dt-extract-cmd").unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, TEST_CONFIG).unwrap();
        let path = path.to_string_lossy().into_owned();

        let matches = CommonCmdLineArgs::new_app("test", "testing")
            .try_get_matches_from(vec!["test", "--config", path.as_str(), "-l", "warning"])
            .unwrap();
        let args = CommonCmdLineArgs::from_matches(&matches).unwrap();

        assert_eq!(args.config().general.times.basetime, "2024-03-05T00:00:00Z");
        assert_eq!(args.log().external_name(), "WARNING");
    }

    #[test]
    fn test_config_is_required() {
        let result =
            CommonCmdLineArgs::new_app("test", "testing").try_get_matches_from(vec!["test"]);
        assert!(result.is_err());
    }
}
