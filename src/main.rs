use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vemcache::cli;
use vemcache::config::{Cli, Commands, ServeArgs};
use vemcache::{Dispatcher, Server};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dispatcher = cli.store.open().context("failed to open store")?;

    match cli.command {
        Some(Commands::Serve(args)) => serve(args, dispatcher),
        Some(Commands::Repl) | None => {
            let stdin = std::io::stdin();
            cli::run_repl(&dispatcher, stdin.lock(), std::io::stdout())?;
            Ok(())
        }
    }
}

fn serve(args: ServeArgs, dispatcher: Dispatcher) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        let addr = args.bind_addr();
        let server = Server::bind(&addr, dispatcher, args.max_line_bytes)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        server
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await?;
        Ok(())
    })
}
