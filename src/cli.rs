use crate::config::{self, HarvestConfig};
use crate::error::AppResult;
use crate::logging::{log, LogLevel};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Harvests paginated JSON search results into a local file, resuming where the last run stopped.",
    long_about = None,
    after_help = format!(
        "Environment:\n    {}  optional proxy URL for all requests\n    {}, {}, {}  request credentials",
        config::ENV_PROXY,
        config::ENV_ANTI_FORGERY_TOKEN,
        config::ENV_SESSION_COOKIE,
        config::ENV_SEARCH_TOKEN
    ),
    arg_required_else_help = true
)]
pub struct CliArgs {
    #[arg(long, value_name = "FILE_PATH", help = "JSON config file; flags override its values")]
    config: Option<PathBuf>,

    #[arg(short = 'n', long, help = "Number of pages to harvest, starting at page 1")]
    total_pages: Option<u32>,

    #[arg(short, long, help = "Pages per window [default: 10]")]
    batch_size: Option<u32>,

    #[arg(short, long, help = "Maximum simultaneous page requests [default: 10]")]
    concurrency: Option<usize>,

    #[arg(short, long, value_name = "FILE_PATH", help = "Progress/output JSON file")]
    output: Option<PathBuf>,

    #[arg(long, value_name = "URL", help = "Search endpoint to POST to")]
    endpoint: Option<String>,

    #[arg(long, value_name = "URL", help = "Referer header value")]
    referer: Option<String>,

    #[arg(long, help = "Per-attempt timeout in seconds [default: 30]")]
    timeout_secs: Option<u64>,

    #[arg(long, help = "Retries after the first failed attempt [default: 3]")]
    max_retries: Option<u32>,

    #[arg(long, help = "Base retry delay in ms; retry n waits n times this [default: 1000]")]
    retry_delay_ms: Option<u64>,

    #[arg(long, help = "Pause between windows in ms [default: 100]")]
    window_delay_ms: Option<u64>,

    #[arg(long, value_name = "JSON_POINTER", help = "Location of the record array in responses [default: /data/list]")]
    records_pointer: Option<String>,

    #[arg(long, help = "Disable colored log output")]
    no_color: bool,
}

impl CliArgs {
    pub fn use_color(&self) -> bool {
        !self.no_color
    }

    /// Builds the effective configuration: defaults, then the config file, then flags, then the
    /// proxy from the environment.
    pub fn to_config(&self) -> AppResult<HarvestConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                log(
                    LogLevel::Info,
                    &format!("Loading config from {}", path.display()),
                );
                HarvestConfig::from_file(path)?
            }
            None => HarvestConfig::default(),
        };

        if let Some(v) = self.total_pages {
            cfg.total_pages = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.concurrency {
            cfg.concurrency = v;
        }
        if let Some(v) = &self.output {
            cfg.output = v.clone();
        }
        if let Some(v) = &self.endpoint {
            cfg.request.endpoint = v.clone();
        }
        if let Some(v) = &self.referer {
            cfg.request.referer = Some(v.clone());
        }
        if let Some(v) = self.timeout_secs {
            cfg.timeout_secs = v;
        }
        if let Some(v) = self.max_retries {
            cfg.max_retries = v;
        }
        if let Some(v) = self.retry_delay_ms {
            cfg.retry_delay_ms = v;
        }
        if let Some(v) = self.window_delay_ms {
            cfg.window_delay_ms = v;
        }
        if let Some(v) = &self.records_pointer {
            cfg.request.records_pointer = v.clone();
        }

        let cfg = cfg.with_env_proxy();
        cfg.validate()?;
        Ok(cfg)
    }
}
