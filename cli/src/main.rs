//! chainstate CLI: replay and follow application operations on a Hive node.
//!
//! Usage:
//! ```bash
//! # Show the node's head and last irreversible block
//! chainstate head --node https://api.hive.blog
//!
//! # Replay from a checkpoint, then follow live; Ctrl-C prints the cursor
//! chainstate follow --node https://api.hive.blog --from 80000000 --prefix mygame_
//! ```

use std::env;
use std::process;

use chainstate_core::handler::{block_fn, streaming_start_fn};
use chainstate_core::{BlockProvider, Processor, ProcessorConfig, ProcessorState, StreamMode};
use chainstate_hive::HiveProvider;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "head" => cmd_head(&args[2..]).await,
        "follow" => cmd_follow(&args[2..]).await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chainstate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainstate {}", env!("CARGO_PKG_VERSION"));
    println!("Replay and follow application operations on a Hive node\n");
    println!("USAGE:");
    println!("    chainstate <COMMAND>\n");
    println!("COMMANDS:");
    println!("    head     Show head and last irreversible block");
    println!("    follow   Replay from a block, then stream live blocks");
    println!("    info     Show default configuration");
    println!("    version  Print version");
    println!("    help     Print this help\n");
    println!("FOLLOW FLAGS:");
    println!("    --node <URL>      JSON-RPC endpoint  [required]");
    println!("    --from <N>        First block to process");
    println!("    --mode <MODE>     latest | irreversible");
    println!("    --prefix <P>      custom_json id prefix");
    println!("    --delay <MS>      Pause between catch-up steps");
    println!("    --config <FILE>   ProcessorConfig as JSON");
    println!("    --json            Emit JSON logs");
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn cmd_head(args: &[String]) -> Result<(), String> {
    let url = parse_flag(args, "--node").ok_or("--node is required")?;
    let provider = HiveProvider::connect(&url).map_err(|e| e.to_string())?;

    let start = std::time::Instant::now();
    let heads = provider
        .get_chain_heads()
        .await
        .map_err(|e| e.to_string())?;
    let latency = start.elapsed();

    println!("Node {url}");
    println!("  Head block:         {}", heads.head_block_number);
    println!("  Last irreversible:  {}", heads.last_irreversible_block_num);
    println!("  Latency:            {}ms", latency.as_millis());
    Ok(())
}

async fn cmd_follow(args: &[String]) -> Result<(), String> {
    let url = parse_flag(args, "--node").ok_or("--node is required")?;
    init_tracing(has_flag(args, "--json"));

    let mut config = match parse_flag(args, "--config") {
        Some(path) => load_config(&path)?,
        None => ProcessorConfig::default(),
    };
    if let Some(from) = parse_flag(args, "--from") {
        config.initial_block_number = from
            .parse()
            .map_err(|_| format!("invalid --from '{from}'"))?;
    }
    if let Some(mode) = parse_flag(args, "--mode") {
        config.mode = mode.parse::<StreamMode>()?;
    }
    if let Some(prefix) = parse_flag(args, "--prefix") {
        config.operation_id_prefix = prefix;
    }
    if let Some(delay) = parse_flag(args, "--delay") {
        config.catch_up_delay_ms = delay
            .parse()
            .map_err(|_| format!("invalid --delay '{delay}'"))?;
    }

    let provider = HiveProvider::connect(&url).map_err(|e| e.to_string())?;
    let prefix = config.operation_id_prefix.clone();
    let processor = Processor::builder(provider)
        .config(config)
        .on_unexpected_stop(|err| {
            tracing::error!(kind = ?err.kind(), error = %err, "processor stopped unexpectedly");
        })
        .build()
        .map_err(|e| e.to_string())?;

    processor.on_block(block_fn(move |number, block| {
        for tx in &block.transactions {
            for op in tx.operations.iter().filter(|op| op.is_custom_json()) {
                let id = op.value.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                if id.starts_with(&prefix) {
                    tracing::info!(block = number, tx = %tx.transaction_id, id, "custom_json");
                }
            }
        }
        Ok(())
    }));
    processor.on_streaming_start(streaming_start_fn(|at_block| {
        tracing::info!(at_block, "now streaming live blocks");
        Ok(())
    }));

    processor.start().map_err(|e| e.to_string())?;

    let state = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, stopping");
            processor.stop().await;
            processor.state()
        }
        state = processor.stopped() => state,
    };

    println!("Resume from block {}", processor.current_block_number());
    if state == ProcessorState::Failed {
        return Err("processor stopped on a fatal error".into());
    }
    Ok(())
}

fn load_config(path: &str) -> Result<ProcessorConfig, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    serde_json::from_str(&raw).map_err(|e| format!("{path}: {e}"))
}

fn cmd_info() {
    let cfg = ProcessorConfig::default();
    println!("ChainState v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default start block:      {}", cfg.initial_block_number);
    println!("  Default catch-up delay:   {}ms", cfg.catch_up_delay_ms);
    println!("  Default id prefix:        {}", cfg.operation_id_prefix);
    println!("  Default mode:             {}", cfg.mode);
    println!("  Default fault policy:     {:?}", cfg.handler_fault_policy);
    println!("  Provider: Hive condenser_api over HTTP JSON-RPC");
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
