use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};

/// flatdb -- read-only key/value lookup server over a sorted flat file.
#[derive(Parser, Debug)]
#[command(name = "flatdb", version, about)]
pub struct Args {
    /// Path to the sorted data file
    #[arg(long = "db-file")]
    pub db_file: PathBuf,

    /// Address to listen on for HTTP clients
    #[arg(long = "http-address", default_value = ":8080")]
    pub http_address: String,

    /// Single byte separating the key from the value within a record
    #[arg(long = "field-separator", default_value = "\t")]
    pub field_separator: String,

    /// Log one access line to stdout per request (Common Log Format)
    #[arg(long = "enable-logging")]
    pub enable_logging: bool,

    /// Pin the mapped file in physical memory
    #[arg(long = "mlock")]
    pub mlock: bool,
}

impl Args {
    /// The record separator byte. The flag must decode to exactly one byte.
    pub fn separator_byte(&self) -> Result<u8> {
        match self.field_separator.as_bytes() {
            [b] => Ok(*b),
            other => crate::errinput!(
                "field separator must be a single byte, got {} bytes",
                other.len()
            ),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_listen_addr(&self.http_address)
    }
}

/// Parses a listen address, accepting both `host:port` and the bare
/// `:port` form (which binds all interfaces).
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let full = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    };
    full.parse()
        .map_err(|_| Error::InvalidInput(format!("invalid listen address {addr:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!(
            parse_listen_addr(":8080").unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen_addr("not-an-address").is_err());
        assert!(parse_listen_addr(":not-a-port").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["flatdb", "--db-file", "/data/db.tab"]);
        assert_eq!(args.db_file, PathBuf::from("/data/db.tab"));
        assert_eq!(args.http_address, ":8080");
        assert_eq!(args.separator_byte().unwrap(), b'\t');
        assert!(!args.enable_logging);
        assert!(!args.mlock);
    }

    #[test]
    fn test_separator_byte_validation() {
        let args = Args::parse_from([
            "flatdb",
            "--db-file",
            "/data/db.tab",
            "--field-separator",
            ",",
        ]);
        assert_eq!(args.separator_byte().unwrap(), b',');

        let args = Args::parse_from([
            "flatdb",
            "--db-file",
            "/data/db.tab",
            "--field-separator",
            "ab",
        ]);
        assert!(args.separator_byte().is_err());
    }
}
