use crate::services::{
    id_generator::DEFAULT_ID_LENGTH, object_store::DEFAULT_MAX_UPLOAD_BYTES, sweeper::DEFAULT_TTL,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub public_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub id_length: usize,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Ephemeral image drop: uploads expire after a fixed window")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_DROP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_DROP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding uploaded files; emptied on startup (overrides IMAGE_DROP_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Directory with index.html and static/ (overrides IMAGE_DROP_PUBLIC_DIR)
    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    /// Largest accepted upload in bytes (overrides IMAGE_DROP_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Length of the random part of object ids (overrides IMAGE_DROP_ID_LENGTH)
    #[arg(long)]
    pub id_length: Option<usize>,

    /// Seconds an upload is kept (overrides IMAGE_DROP_TTL_SECS)
    #[arg(long)]
    pub ttl_secs: Option<u64>,

    /// Seconds between eviction sweeps, defaults to the TTL (overrides IMAGE_DROP_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key))
    }

    /// Merge parsed CLI args over values read through `lookup`, then defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_host = lookup("IMAGE_DROP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_number(&lookup, "IMAGE_DROP_PORT", 8000)?;
        let env_upload = lookup("IMAGE_DROP_UPLOAD_DIR").unwrap_or_else(|_| "./tmp_images".into());
        let env_public = lookup("IMAGE_DROP_PUBLIC_DIR").unwrap_or_else(|_| "./public".into());
        let env_max = env_number(&lookup, "IMAGE_DROP_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let env_id_len = env_number(&lookup, "IMAGE_DROP_ID_LENGTH", DEFAULT_ID_LENGTH)?;
        let env_ttl = env_number(&lookup, "IMAGE_DROP_TTL_SECS", DEFAULT_TTL.as_secs())?;

        // --- Merge ---
        let ttl_secs = args.ttl_secs.unwrap_or(env_ttl);
        let env_interval = env_number(&lookup, "IMAGE_DROP_SWEEP_INTERVAL_SECS", ttl_secs)?;
        let interval_secs = args.sweep_interval_secs.unwrap_or(env_interval);

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            upload_dir: args.upload_dir.unwrap_or_else(|| env_upload.into()),
            public_dir: args.public_dir.unwrap_or_else(|| env_public.into()),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max),
            id_length: args.id_length.unwrap_or(env_id_len),
            ttl: Duration::from_secs(ttl_secs),
            sweep_interval: Duration::from_secs(interval_secs),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.id_length == 0 {
            bail!("id length must be at least 1");
        }
        if self.ttl.is_zero() {
            bail!("ttl must be at least one second");
        }
        if self.sweep_interval.is_zero() {
            bail!("sweep interval must be at least one second");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(argv: &[&str], vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let args = Args::try_parse_from(std::iter::once("image-drop").chain(argv.iter().copied()))?;
        AppConfig::resolve(args, |key| vars.get(key).cloned().ok_or(env::VarError::NotPresent))
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = resolve(&[], &[]).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8000");
        assert_eq!(cfg.upload_dir, PathBuf::from("./tmp_images"));
        assert_eq!(cfg.public_dir, PathBuf::from("./public"));
        assert_eq!(cfg.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.id_length, 12);
        assert_eq!(cfg.ttl, Duration::from_secs(600));
        assert_eq!(cfg.sweep_interval, cfg.ttl);
    }

    #[test]
    fn cli_overrides_environment() {
        let cfg = resolve(
            &["--port", "9100", "--ttl-secs", "30"],
            &[
                ("IMAGE_DROP_PORT", "9000"),
                ("IMAGE_DROP_TTL_SECS", "60"),
                ("IMAGE_DROP_ID_LENGTH", "20"),
            ],
        )
        .unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.ttl, Duration::from_secs(30));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(30));
        assert_eq!(cfg.id_length, 20);
    }

    #[test]
    fn sweep_interval_can_differ_from_ttl() {
        let cfg = resolve(&["--sweep-interval-secs", "15"], &[]).unwrap();
        assert_eq!(cfg.ttl, Duration::from_secs(600));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(15));
    }

    #[test]
    fn malformed_env_number_is_an_error() {
        let err = resolve(&[], &[("IMAGE_DROP_MAX_UPLOAD_BYTES", "five")]).unwrap_err();
        assert!(err.to_string().contains("IMAGE_DROP_MAX_UPLOAD_BYTES"));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(resolve(&["--id-length", "0"], &[]).is_err());
        assert!(resolve(&["--ttl-secs", "0"], &[]).is_err());
        assert!(resolve(&["--sweep-interval-secs", "0"], &[]).is_err());
    }
}
