//! Provides a means to read, parse and hold configuration options for scans.
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_BATCH_SIZE: usize = 256;
const DEFAULT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_TRIES: u8 = 3;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hostsweep",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Finds named hosts on your local subnet.
/// Every address of the subnet is looked up with reverse DNS and the hosts
/// that have a name are printed.
pub struct Opts {
    /// Subnet to scan, for example 192.168.1.0/24. Skips interface selection.
    #[arg(short, long, conflicts_with = "interface")]
    pub cidr: Option<String>,

    /// Name of the interface whose subnet is scanned. Without it (and without
    /// --cidr) a menu of interfaces is shown.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// A comma-delimited list or file of DNS resolvers.
    #[arg(long)]
    pub resolver: Option<String>,

    /// How many addresses are looked up at the same time.
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// The timeout in milliseconds of a single lookup attempt.
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout: u64,

    /// The number of lookup attempts before an address is given up.
    /// If set to 0, hostsweep will correct it to 1.
    #[arg(long, default_value_t = DEFAULT_TRIES)]
    pub tries: u8,

    /// Upper bound in milliseconds for the whole scan.
    #[arg(long)]
    pub scan_timeout: Option<u64>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,

    /// Also print addresses for which every lookup failed.
    #[arg(long)]
    pub show_failed: bool,

    /// Greppable mode. Only output `<address> <name>` lines.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(long, value_parser)]
    pub config_path: Option<PathBuf>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Opts::parse()
    }

    /// The configuration file named by the options. With `--no-config` the
    /// file is not even opened, so a broken file cannot stop the scan.
    pub fn load_config(&self) -> Result<Config> {
        if self.no_config {
            return Ok(Config::default());
        }
        Config::read(self.config_path.clone())
    }

    /// Merges the values found within the user configuration file, unless
    /// the configuration file is ignored.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(batch_size, timeout, tries, show_failed, greppable, accessible);
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        // A subnet or interface given on the command line wins over the file.
        if self.cidr.is_none() && self.interface.is_none() {
            merge_optional!(cidr, interface);
        }

        merge_optional!(resolver, scan_timeout, ulimit);
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            cidr: None,
            interface: None,
            resolver: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT_MS,
            tries: DEFAULT_TRIES,
            scan_timeout: None,
            ulimit: None,
            show_failed: false,
            greppable: false,
            accessible: false,
            no_config: true,
            config_path: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    cidr: Option<String>,
    interface: Option<String>,
    resolver: Option<String>,
    batch_size: Option<usize>,
    timeout: Option<u64>,
    tries: Option<u8>,
    scan_timeout: Option<u64>,
    ulimit: Option<u64>,
    show_failed: Option<bool>,
    greppable: Option<bool>,
    accessible: Option<bool>,
}

impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file is an empty configuration.
    ///
    /// # Format
    ///
    /// cidr = "192.168.1.0/24"
    /// resolver = "192.168.1.1"
    /// batch_size = 128
    /// timeout = 1500
    /// tries = 3
    /// scan_timeout = 30000
    /// show_failed = false
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match custom_config_path {
            Some(path) => path,
            None => match default_config_path() {
                Some(path) => path,
                None => return Ok(Config::default()),
            },
        };

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read {}", config_path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Found an error in configuration file {}", config_path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(".hostsweep.toml");
    Some(config_path)
}
