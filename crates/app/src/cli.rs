use clap::Parser;
use std::path::PathBuf;

/// 命令行参数，优先级高于配置文件与 `TICKVAULT__*` 环境变量
#[derive(Debug, Clone, Default, Parser)]
#[command(author, version, about = "A-share market data collector and file gateway")]
pub struct Cli {
    /// API key required by the HTTP gateway (open mode when absent)
    #[arg(long, env = "TICKVAULT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Raise the default log level to debug
    #[arg(long)]
    pub debug: bool,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the series files
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<String>,

    /// Base URL of the vendor HTTP bridge
    #[arg(long, value_name = "URL")]
    pub feed_url: Option<String>,

    /// Serve files only, without the background scheduler
    #[arg(long)]
    pub no_scheduler: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "tickvault",
            "--api-key",
            "secret-key-123",
            "--port",
            "9000",
            "--debug",
            "--no-scheduler",
            "--data-dir",
            "/srv/data",
        ])
        .unwrap();
        assert_eq!(cli.api_key.as_deref(), Some("secret-key-123"));
        assert_eq!(cli.port, Some(9000));
        assert!(cli.debug);
        assert!(cli.no_scheduler);
        assert_eq!(cli.data_dir.as_deref(), Some("/srv/data"));
        assert!(cli.host.is_none());
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["tickvault", "--port", "70000"]).is_err());
    }
}
