use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{LevelFilter, debug};
use nsremap::{
    config::Config,
    engine::ModelEngine,
    mapping::MappingTableProvider,
    namespace::NamespaceGraph,
    pipeline::RemapPipeline,
    remap_path::RemapRequest,
};

#[derive(Parser, Debug)]
#[command(name = "nsremap", version)]
#[command(about = "Remap class archives between mapping namespaces")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "nsremap.toml")]
    config: PathBuf,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Route {
    /// Source namespace
    #[arg(long)]
    from: String,

    /// Nearest fully mapped namespace adjacent to the source
    #[arg(long)]
    from_fallback: Option<String>,

    /// Target namespace
    #[arg(long)]
    to: String,

    /// Nearest fully mapped namespace adjacent to the target
    #[arg(long)]
    to_fallback: Option<String>,
}

impl Route {
    fn request(&self, graph: &NamespaceGraph) -> Result<RemapRequest> {
        Ok(RemapRequest::from_names(
            graph,
            &self.from,
            self.from_fallback.as_deref().unwrap_or(&self.from),
            self.to_fallback.as_deref().unwrap_or(&self.to),
            &self.to,
        )?)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remap an archive
    Remap {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        route: Route,
    },
    /// Print the namespaces a remap would hop through
    Path {
        #[command(flatten)]
        route: Route,
    },
    /// Write the mapping table of a namespace pair as Tiny v2
    Export {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long)]
        output: PathBuf,
    },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    debug!("Loading configuration from {}", cli.config.display());
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Remap {
            input,
            output,
            route,
        } => remap(&config, &route, &input, &output),
        Command::Path { route } => print_path(&config, &route),
        Command::Export { from, to, output } => export(&config, &from, &to, &output),
    }
}

#[allow(clippy::print_stdout)]
fn remap(config: &Config, route: &Route, input: &Path, output: &Path) -> Result<()> {
    let pipeline = RemapPipeline::from_config(config, ModelEngine::new(config.threads))?;
    let request = route.request(pipeline.graph())?;
    let outcome = pipeline.remap(&request, input, output)?;

    for hop in &outcome.hops {
        let state = if hop.cache_hit { "cached" } else { "remapped" };
        println!("{} -> {}: {state}", hop.from, hop.to);
        for (file, refmap) in &hop.reference_maps {
            println!("  {file}: {} entries", refmap.len());
        }
        for warning in &hop.warnings {
            match warning.as_error() {
                Some(error) => println!("  error: {error}"),
                None => println!("  warning: {warning}"),
            }
        }
    }
    println!("wrote {}", outcome.output.display());
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_path(config: &Config, route: &Route) -> Result<()> {
    let graph = config.build_graph()?;
    let request = route.request(&graph)?;
    let path = graph.remap_path(&request)?;
    let mut names = vec![graph.name(request.src)];
    names.extend(path.iter().map(|&id| graph.name(id)));
    println!("{}", names.join(" -> "));
    Ok(())
}

fn export(config: &Config, from: &str, to: &str, output: &Path) -> Result<()> {
    let graph = Arc::new(config.build_graph()?);
    let provider = MappingTableProvider::from_files(Arc::clone(&graph), &config.mappings)?;
    let table = provider.table(graph.require(from)?, graph.require(to)?)?;
    fs::write(output, table.to_tiny())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}
