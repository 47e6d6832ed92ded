//! rxresolve - command-line front end for the resolver and hybrid matcher
//!
//! Results are printed to stdout as JSON; diagnostics go to stderr and are
//! controlled with `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use rxresolve_core::matcher::OpenAiEmbeddingClient;
use rxresolve_core::{
    EmbeddingCache, HybridMatcher, MatcherConfig, Normalizer, Reranker, Resolver, ResolverConfig,
    RxNavClient, ServiceConfig, TermGenerator,
};
use rxresolve_llm::OpenAiChatClient;

#[derive(Parser)]
#[command(name = "rxresolve", version, about = "Resolve free-text medication descriptions")]
struct Cli {
    /// JSON file with vocabulary tables, scoring weights and matcher settings
    #[arg(long, global = true, env = "RXRESOLVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a description into structured attributes
    Parse { text: String },

    /// Print the ordered lookup terms for a description
    Terms { text: String },

    /// Resolve a description against RxNav
    Resolve {
        text: String,

        /// Cross-check the ranked candidates with the hybrid matcher
        #[arg(long)]
        hybrid: bool,
    },

    /// Pick the best name for an input from a candidate list
    Match {
        input: String,

        #[arg(long = "candidate", short = 'c', required = true)]
        candidates: Vec<String>,

        /// Let the LLM judge override a confident pick
        #[arg(long)]
        rerank: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ResolverConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ResolverConfig::default(),
    };

    match cli.command {
        Command::Parse { text } => {
            let normalizer = Normalizer::with_tables(config.vocabulary);
            print_json(&normalizer.parse(&text))
        }
        Command::Terms { text } => {
            let normalizer = Normalizer::with_tables(config.vocabulary);
            let parsed = normalizer.parse(&text);
            let terms = TermGenerator::new(normalizer.tables()).build_terms(&parsed);
            print_json(&terms)
        }
        Command::Resolve { text, hybrid } => {
            let services = ServiceConfig::from_env()?;
            let client = RxNavClient::new(&services.rxnav_base_url, services.timeout_secs)?;
            info!(base_url = %services.rxnav_base_url, "resolving against RxNav");

            let matcher_config = config.matcher.clone();
            let mut resolver = Resolver::with_config(client, config);
            if hybrid {
                resolver = resolver.with_matcher(build_matcher(&services, matcher_config)?);
            }
            print_json(&resolver.resolve(&text))
        }
        Command::Match {
            input,
            candidates,
            rerank,
        } => {
            let services = ServiceConfig::from_env()?;
            let mut matcher = build_matcher(&services, config.matcher.clone())?;
            if rerank {
                let judge = OpenAiChatClient::new(
                    &services.openai_base_url,
                    services.require_api_key()?,
                    &services.judge_model,
                    services.timeout_secs,
                )?;
                matcher = matcher.with_reranker(Reranker::new(judge, &config.matcher));
            }
            print_json(&matcher.best_match_with_rerank(&input, &candidates)?)
        }
    }
}

fn build_matcher(services: &ServiceConfig, config: MatcherConfig) -> Result<HybridMatcher> {
    let embedder = OpenAiEmbeddingClient::new(
        &services.openai_base_url,
        services.require_api_key()?,
        &services.embedding_model,
        services.timeout_secs,
    )?;
    let cache = Arc::new(EmbeddingCache::new(embedder));
    Ok(HybridMatcher::new(config, cache))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
