//! paperseal - Seal sensitive documents before they leave the device
//!
//! Usage:
//!   paperseal init                 - Write a default configuration
//!   paperseal seal <file>          - Encrypt a file and store it
//!   paperseal open <id>            - Decrypt a stored document
//!   paperseal passphrase           - Print a fresh passphrase

use clap::{Parser, Subcommand};
use paperseal::{
    config::Config,
    crypto::{Passphrase, PassphraseGenerator},
    envelope,
    session::{SessionState, UploadOrchestrator},
    store::{DirectoryStore, DocumentStore},
    validate::SelectedFile,
    Error, Result,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "paperseal")]
#[command(author = "paperseal Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Encrypt sensitive documents under a generated passphrase before upload")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/paperseal/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a file and hand it to the document store
    Seal {
        /// File to seal (.pdf, .jpg, .jpeg, .png)
        file: PathBuf,

        /// Declared MIME type (inferred from the extension if omitted)
        #[arg(long = "type")]
        mime_type: Option<String>,

        /// Skip the "saved the passphrase" prompt
        #[arg(long)]
        yes: bool,
    },

    /// Decrypt a stored document
    Open {
        /// Document identifier printed by `seal`
        id: String,

        /// Output path (defaults to the original file name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read the passphrase from a file instead of prompting
        #[arg(long)]
        passphrase_file: Option<PathBuf>,

        /// Overwrite the output file if it exists
        #[arg(long)]
        force: bool,
    },

    /// Print a freshly generated passphrase
    Passphrase {
        /// Number of characters
        #[arg(long)]
        length: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config_path = expand_tilde(&cli.config);
    let config = Config::load_or_default(&config_path);

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    let log_file = config.as_ref().ok().and_then(|c| c.logging.file.clone());
    setup_logging(&level, log_file.as_deref());

    let result = config.and_then(|config| run_command(cli.command, &config_path, config));
    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn setup_logging(level: &str, file: Option<&Path>) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match file.map(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
    }) {
        Some(Ok(file)) => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        _ => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    if let Err(e) = result {
        eprintln!("Failed to set up logging: {}", e);
    }
}

fn run_command(command: Commands, config_path: &Path, config: Config) -> Result<()> {
    match command {
        Commands::Init { force } => cmd_init(config_path, config, force),
        Commands::Seal {
            file,
            mime_type,
            yes,
        } => cmd_seal(config, &file, mime_type.as_deref(), yes),
        Commands::Open {
            id,
            output,
            passphrase_file,
            force,
        } => cmd_open(config, &id, output, passphrase_file, force),
        Commands::Passphrase { length } => cmd_passphrase(&config, length),
    }
}

fn cmd_init(config_path: &Path, config: Config, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "{:?} already exists (use --force to overwrite)",
            config_path
        )));
    }

    config.save(config_path)?;
    config.ensure_directories()?;

    info!("Configuration saved to {:?}", config_path);
    info!("Documents will be stored in {:?}", config.store.directory);
    Ok(())
}

fn cmd_seal(config: Config, path: &Path, mime_type: Option<&str>, yes: bool) -> Result<()> {
    let file = SelectedFile::from_path(path, mime_type)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))?;

    let store = Arc::new(DirectoryStore::from_config(&config.store));
    let orchestrator = UploadOrchestrator::new(store, &config)?;

    orchestrator.select(file)?;
    let disclosure = orchestrator.request_upload()?;

    println!();
    println!("Your passphrase (shown once, it cannot be recovered):");
    println!();
    println!("    {}", disclosure.expose());
    println!();

    if !yes && !wait_for_acknowledgement()? {
        orchestrator.remove()?;
        info!("Aborted, nothing was uploaded");
        return Ok(());
    }
    drop(disclosure);

    let snapshot = runtime.block_on(async {
        let pipeline = orchestrator.confirm()?;
        pipeline
            .await
            .map_err(|e| Error::Internal(format!("Pipeline task failed: {}", e)))?;
        Ok::<_, Error>(orchestrator.snapshot())
    })?;

    match (snapshot.state, snapshot.receipt, snapshot.error) {
        (SessionState::Success, Some(receipt), _) => {
            println!("Sealed and stored as {}", receipt.id);
            Ok(())
        }
        (_, _, Some(err)) => Err(err.into()),
        (state, _, None) => Err(Error::Internal(format!(
            "Upload ended in unexpected state: {}",
            state
        ))),
    }
}

/// Block until the user types `saved` (true) or `abort`/EOF (false)
fn wait_for_acknowledgement() -> Result<bool> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("Type 'saved' once you have stored the passphrase (or 'abort'): ");
        std::io::stdout().flush()?;

        match lines.next() {
            Some(line) => match line?.trim() {
                "saved" => return Ok(true),
                "abort" => return Ok(false),
                _ => continue,
            },
            None => return Ok(false),
        }
    }
}

fn cmd_open(
    config: Config,
    id: &str,
    output: Option<PathBuf>,
    passphrase_file: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))?;
    let store = DirectoryStore::from_config(&config.store);
    let document = runtime.block_on(store.fetch(id))?;

    let passphrase = match passphrase_file {
        Some(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                Error::Internal(format!("Failed to read passphrase file: {}", e))
            })?;
            Passphrase::from_string(text.trim().to_string())
        }
        None => Passphrase::from_string(
            rpassword::prompt_password("Enter passphrase: ")
                .map_err(|e| Error::Internal(e.to_string()))?,
        ),
    };

    let plaintext = envelope::open(&document.ciphertext, &document.metadata, &passphrase)?;

    // Never let a stored name point outside the working directory.
    let output = match output {
        Some(path) => path,
        None => Path::new(&document.metadata.original_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.out", document.id))),
    };

    if output.exists() && !force {
        return Err(Error::Config(format!(
            "{:?} already exists (use --force to overwrite)",
            output
        )));
    }

    std::fs::write(&output, &plaintext)?;
    info!("Decrypted {} bytes to {:?}", plaintext.len(), output);
    Ok(())
}

fn cmd_passphrase(config: &Config, length: Option<usize>) -> Result<()> {
    let generator = PassphraseGenerator::from_config(&config.passphrase)?;
    let length = length.unwrap_or(generator.default_length());
    let passphrase = generator.generate(length)?;

    println!("{}", passphrase.expose());
    info!("~{:.0} bits of entropy", generator.entropy_bits(length));
    Ok(())
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
