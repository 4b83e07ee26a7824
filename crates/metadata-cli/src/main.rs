use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use metadata_core::token::{self, Claims};
use metadata_core::{document_did, ql};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "metadata")]
#[command(about = "MetaData service admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the filter a query string translates to
    Explain { query: String },
    /// Report documents in a JSON file that lack a usable `did`
    Check { file: PathBuf },
    /// Mint a capability token
    Token {
        #[arg(long, default_value = "active")]
        kid: String,
        #[arg(long, env = "CAP_KEY_ACTIVE")]
        secret: String,
        #[arg(long)]
        sub: Option<String>,
        #[arg(long = "scope")]
        scopes: Vec<String>,
        /// Lifetime in seconds
        #[arg(long)]
        ttl: Option<i64>,
    },
}

/// Indexes of documents without an identifier; non-objects count as missing.
fn missing_dids(input: &JsonValue) -> Result<Vec<usize>> {
    let docs = match input {
        JsonValue::Array(items) => items.as_slice(),
        JsonValue::Object(_) => std::slice::from_ref(input),
        _ => bail!("expected a JSON object or an array of objects"),
    };
    Ok(docs
        .iter()
        .enumerate()
        .filter(|(_, d)| d.as_object().and_then(document_did).is_none())
        .map(|(i, _)| i)
        .collect())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Explain { query } => match ql::parse_query(&query) {
            Ok(spec) => println!("{}", serde_json::to_string_pretty(&spec.into_value())?),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        Cmd::Check { file } => {
            let raw = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let input: JsonValue = serde_json::from_slice(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let missing = missing_dids(&input)?;
            if missing.is_empty() {
                println!("ok");
            } else {
                for i in &missing {
                    println!("document {i}: missing did");
                }
                std::process::exit(1);
            }
        }
        Cmd::Token {
            kid,
            secret,
            sub,
            scopes,
            ttl,
        } => {
            let claims = Claims {
                sub,
                scopes,
                exp: ttl.map(|t| chrono::Utc::now().timestamp() + t),
            };
            println!("{}", token::mint(&kid, &secret, &claims)?);
        }
    }
    Ok(())
}
