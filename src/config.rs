use std::{net::IpAddr, path::PathBuf};

use chrono::TimeDelta;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::logging::Verbosity;

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "defaults::listen_addr")]
    pub listen_addr: IpAddr,

    #[serde(default = "defaults::port")]
    pub port: u16,

    #[serde(default = "defaults::verbosity")]
    pub verbosity: Verbosity,

    #[serde(default = "defaults::log_file")]
    pub log_file: PathBuf,

    #[serde(default = "defaults::access_token_minutes")]
    pub access_token_minutes: i64,

    #[serde(default = "defaults::refresh_token_days")]
    pub refresh_token_days: i64,

    #[serde(default)]
    pub rollback_on_500: bool,

    // notes endpoints are unavailable without a database
    pub db_url: Option<String>,

    // no default! must be specified in some way
    pub jwt_secret: String,
}

impl Config {
    pub fn get() -> Self {
        let args = CliArgs::parse();

        // merge semantic: bottom overrides top
        let result = Figment::new()
            .merge(Toml::file("nested-errors.toml"))
            .merge(Env::prefixed("NESTED_ERRORS_"))
            .merge(Serialized::defaults(args)) // CLI
            .extract();

        match result {
            Ok(config) => config,
            Err(errors) => {
                for error in errors {
                    eprintln!("Fatal configuration error: {error}");
                }
                panic!("Failed to determine a valid configuration")
            }
        }
    }

    pub fn get_rocket_config(&self) -> rocket::Config {
        let ident = rocket::config::Ident::try_new("nested-errors").unwrap();

        rocket::Config {
            address: self.listen_addr,
            port: self.port,
            ident, // HTTP `Server` header
            ..Default::default()
        }
    }

    pub fn jwt_secret(&self) -> Vec<u8> {
        let secret =
            hex::decode(&self.jwt_secret).expect("Fatal error: JWT secret is invalid hex sequence");

        if secret.len() < 32 {
            panic!(
                "Fatal error: JWT secret is too short. Use, e.g., `openssl rand -hex 32` to \
                 generate"
            )
        }

        secret
    }

    pub fn access_expires(&self) -> TimeDelta {
        TimeDelta::try_minutes(self.access_token_minutes)
            .expect("Fatal error: access token lifetime is out of range")
    }

    pub fn refresh_expires(&self) -> TimeDelta {
        TimeDelta::try_days(self.refresh_token_days)
            .expect("Fatal error: refresh token lifetime is out of range")
    }
}

// separate from Config so that only explicitly passed flags override the
// other providers (clap defaults would always win otherwise)
#[derive(Parser, Serialize, Deserialize, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// IP address to listen for connections on [default: 0.0.0.0]
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<IpAddr>,

    /// Port to listen to connections on [default: 6869]
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// PostgreSQL connection string to use for notes [no default]
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_url: Option<String>,

    /// Hex string of at least 32 bytes used to sign tokens [no default]
    #[arg(short = 'k', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Minutes until an access token expires [default: 15]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_minutes: Option<i64>,

    /// Days until a refresh token expires [default: 30]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_days: Option<i64>,

    /// Roll back the request's open transaction before reporting a 500
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_on_500: Option<bool>,

    /// How much information to show and log [default: normal]
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,

    /// File to log to, in append mode [default: /tmp/nested-errors.log]
    #[arg(short = 'f', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

mod defaults {
    use std::{
        net::{IpAddr, Ipv4Addr},
        path::PathBuf,
    };

    use crate::logging::Verbosity;

    pub const fn listen_addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED) // 0.0.0.0
    }

    pub const fn port() -> u16 {
        6869
    }

    pub const fn verbosity() -> Verbosity {
        Verbosity::Normal
    }

    pub fn log_file() -> PathBuf {
        PathBuf::from("/tmp/nested-errors.log")
    }

    pub const fn access_token_minutes() -> i64 {
        15
    }

    pub const fn refresh_token_days() -> i64 {
        30
    }
}
