use std::path::PathBuf;
use std::time::Duration;

use axum::http::header::HeaderName;
use facet::Facet;
use figue as args;

use crate::auth::DEFAULT_OWNER_HEADER;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:9140";
const DEFAULT_DB_PATH: &str = "procchain.sqlite";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Command-line flags. Each one overrides the matching `PROCCHAIN_*`
/// environment variable.
#[derive(Facet, Debug)]
pub struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::named, default)]
    http: Option<String>,
    #[facet(args::named, default)]
    db: Option<String>,
    #[facet(args::named, default)]
    fetch_timeout_secs: Option<u64>,
    #[facet(args::named, default)]
    owner_header: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub http: Option<String>,
    pub db: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub owner_header: Option<String>,
}

impl From<Cli> for Overrides {
    fn from(cli: Cli) -> Self {
        Self {
            http: cli.http,
            db: cli.db,
            fetch_timeout_secs: cli.fetch_timeout_secs,
            owner_header: cli.owner_header,
        }
    }
}

pub fn parse_cli() -> Result<Cli, String> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("procchain-web")
                .description("Process snapshot ingestion and adjacency-chain server")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;
    Ok(cli.value)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub db_path: PathBuf,
    pub fetch_timeout: Duration,
    pub owner_header: HeaderName,
}

impl Config {
    pub fn from_env(overrides: Overrides) -> Result<Self, String> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    fn resolve(
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let http_addr = overrides
            .http
            .or_else(|| env("PROCCHAIN_HTTP"))
            .unwrap_or_else(|| DEFAULT_HTTP_ADDR.into());
        let db_path = PathBuf::from(
            overrides
                .db
                .or_else(|| env("PROCCHAIN_DB"))
                .unwrap_or_else(|| DEFAULT_DB_PATH.into()),
        );

        let fetch_timeout_secs = match overrides.fetch_timeout_secs {
            Some(secs) => secs,
            None => match env("PROCCHAIN_FETCH_TIMEOUT_SECS") {
                Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                    format!("PROCCHAIN_FETCH_TIMEOUT_SECS must be a number of seconds: {e}")
                })?,
                None => DEFAULT_FETCH_TIMEOUT_SECS,
            },
        };
        if fetch_timeout_secs == 0 {
            return Err(String::from("fetch timeout must be at least one second"));
        }

        let owner_header = overrides
            .owner_header
            .or_else(|| env("PROCCHAIN_OWNER_HEADER"))
            .unwrap_or_else(|| DEFAULT_OWNER_HEADER.into());
        let owner_header = HeaderName::try_from(owner_header.trim().to_ascii_lowercase())
            .map_err(|e| format!("invalid owner header name {owner_header:?}: {e}"))?;

        Ok(Self {
            http_addr,
            db_path,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            owner_header,
        })
    }
}
