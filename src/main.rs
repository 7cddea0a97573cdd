use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use contactbook::cli::{
    resolve_db_path, run_export, run_import, run_migrate, run_stats, Cli, Commands,
};
use contactbook::server::ApiServer;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let db_path = resolve_db_path(args.db)?;
            let server = ApiServer::new(args.port, db_path)?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            let _ = ctrlc::set_handler(move || {
                println!("\nReceived Ctrl+C, shutting down...");
                flag.store(true, Ordering::SeqCst);
            });

            server.start(shutdown)?;
        }
        Commands::Migrate(args) => {
            run_migrate(&resolve_db_path(args.db)?)?;
        }
        Commands::Export(args) => {
            run_export(&resolve_db_path(args.db)?, &args.file)?;
        }
        Commands::Import(args) => {
            run_import(&resolve_db_path(args.db)?, &args.file)?;
        }
        Commands::Stats(args) => {
            run_stats(&resolve_db_path(args.db)?)?;
        }
    }

    Ok(())
}
