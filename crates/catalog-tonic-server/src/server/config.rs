use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `catalog-tonic-server` binary.
///
/// These settings control where the server listens, where uploaded images
/// are written, how access tokens are signed and how long they live. All
/// values are parsed from CLI arguments or environment variables (a `.env`
/// file is honored), with defaults suitable for local development.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "catalog-tonic-server",
    version,
    about = "A gRPC laptop catalog with streaming search, uploads and ratings"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/catalog.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Directory uploaded laptop images are written to. Created on startup
    /// if missing.
    ///
    /// Environment variable: `IMAGE_FOLDER`
    #[arg(long, env = "IMAGE_FOLDER", default_value = "img")]
    pub image_folder: PathBuf,

    /// Symmetric key used to sign and verify access tokens.
    ///
    /// Environment variable: `TOKEN_SECRET`
    #[arg(long, env = "TOKEN_SECRET", default_value_t = String::from("secret"), hide_env_values = true)]
    pub token_secret: String,

    /// Lifetime of an issued access token, in seconds.
    ///
    /// Environment variable: `TOKEN_DURATION_SECS`
    #[arg(long, env = "TOKEN_DURATION_SECS", default_value_t = 900)]
    pub token_duration_secs: u64,

    /// Capacity of the response buffer between a streaming task and the gRPC
    /// stream.
    ///
    /// Lower values increase backpressure responsiveness; higher values let a
    /// search run further ahead of a slow client.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Register the demo accounts `admin1` and `user1` (password `secret`).
    ///
    /// Environment variable: `SEED_USERS`
    #[arg(long, env = "SEED_USERS", default_value_t = true, action = clap::ArgAction::Set)]
    pub seed_users: bool,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub image_folder: PathBuf,
    pub token_secret: String,
    pub token_duration: Duration,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub seed_users: bool,
}

impl core::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("server_addr", &self.server_addr)
            .field("uds", &self.uds)
            .field("image_folder", &self.image_folder)
            .field("token_secret", &"<redacted>")
            .field("token_duration", &self.token_duration)
            .field("stream_buffer_size", &self.stream_buffer_size)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("seed_users", &self.seed_users)
            .finish()
    }
}

impl ServerConfig {
    /// Configuration for embedding the service (tests, benches) without
    /// parsing a command line.
    pub fn local(image_folder: impl Into<PathBuf>) -> Self {
        Self {
            server_addr: String::from("127.0.0.1:0"),
            uds: false,
            image_folder: image_folder.into(),
            token_secret: String::from("secret"),
            token_duration: Duration::from_secs(900),
            stream_buffer_size: 8,
            shutdown_timeout: Duration::from_secs(3),
            seed_users: true,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.token_secret.is_empty() {
            bail!("TOKEN_SECRET must not be empty");
        }

        if args.token_duration_secs == 0 {
            bail!("TOKEN_DURATION_SECS must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            image_folder: args.image_folder,
            token_secret: args.token_secret,
            token_duration: Duration::from_secs(args.token_duration_secs),
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            seed_users: args.seed_users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec!["catalog-tonic-server"];
        argv.extend_from_slice(extra);
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.token_duration, Duration::from_secs(900));
        assert_eq!(config.stream_buffer_size, 8);
        assert!(config.seed_users);
    }

    #[test]
    fn rejects_zero_sized_settings() {
        assert!(parse(&["--token-duration-secs", "0"]).is_err());
        assert!(parse(&["--stream-buffer-size", "0"]).is_err());
        assert!(parse(&["--token-secret", ""]).is_err());
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let config = parse(&["--token-secret", "hunter2"]).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn seed_users_can_be_disabled() {
        let config = parse(&["--seed-users", "false"]).unwrap();
        assert!(!config.seed_users);
    }
}
