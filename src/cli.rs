#[cfg(feature = "cli")]
use crate::cert::{SignedCertificate, DEFAULT_LEAF_LIFESPAN_DAYS};
#[cfg(feature = "cli")]
use crate::error::{Error, Result};
#[cfg(feature = "cli")]
use crate::inspect::{display_certificate, CertificateInfo, OutputFormat};
#[cfg(feature = "cli")]
use crate::store::{CertStore, DEFAULT_CERT_PATH};
#[cfg(feature = "cli")]
use crate::verify::{verify_leaf, Purpose};
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use colored::Colorize;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "picoca")]
#[command(version, about = "A tiny local certificate authority", long_about = None)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "PICOCA_CERT_PATH",
        default_value = DEFAULT_CERT_PATH,
        help = "Directory holding the root and issued certificates"
    )]
    pub cert_path: PathBuf,

    #[arg(
        long,
        global = true,
        env = "PICOCA_LOG",
        help = "Log filter (trace, debug, info, warn, error); falls back to RUST_LOG"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Issue a certificate for one or more hostnames or IP addresses")]
    Issue {
        #[arg(required = true, help = "Hostnames; the first one names the output files")]
        hostnames: Vec<String>,

        #[arg(
            short,
            long,
            env = "PICOCA_LIFESPAN",
            default_value_t = DEFAULT_LEAF_LIFESPAN_DAYS,
            value_parser = clap::value_parser!(i64).range(1..),
            help = "Validity in days"
        )]
        lifespan: i64,
    },

    #[command(about = "Display the contents of a certificate")]
    Inspect {
        #[arg(help = "Certificate file path")]
        file: PathBuf,

        #[arg(
            short,
            long,
            default_value = "pretty",
            help = "Output format: pretty or json"
        )]
        format: String,
    },

    #[command(about = "Verify a certificate against the root")]
    Verify {
        #[arg(help = "Certificate file path")]
        cert: PathBuf,

        #[arg(
            long,
            required_unless_present = "client",
            help = "Hostname or IP address the certificate must cover"
        )]
        host: Option<String>,

        #[arg(long, help = "Check for client authentication instead of server")]
        client: bool,
    },
}

#[cfg(feature = "cli")]
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    crate::logging::init(cli.log_level.as_deref())?;

    let store = CertStore::new(cli.cert_path);

    match cli.command {
        Commands::Issue {
            hostnames,
            lifespan,
        } => {
            let ca = store.load_or_bootstrap_root()?;
            if ca.is_bootstrapped() {
                store.save_root(&ca)?;
                let (root_cert, root_key) = store.root_paths();
                println!(
                    "{}",
                    format!(
                        "Successfully initialized PicoCA to: {} and {}",
                        root_cert.display(),
                        root_key.display()
                    )
                    .green()
                    .bold()
                );
            }

            let first = hostnames
                .first()
                .cloned()
                .ok_or(Error::MissingSubjectIdentity)?;
            let issued = ca.issue(hostnames, lifespan)?;
            let (cert_out, key_out) = store.save_leaf(&first, &issued)?;

            println!("{}", "Certificate issued successfully!".green().bold());
            println!("  {}: {}", "Certificate".cyan(), cert_out.display());
            println!("  {}: {}", "Private Key".cyan(), key_out.display());
            println!("  {}: {} days", "Validity".cyan(), lifespan);
        }

        Commands::Inspect { file, format } => {
            let pem = std::fs::read_to_string(&file)?;
            let info = CertificateInfo::from_pem(&pem)?;

            let output_format = match format.to_lowercase().as_str() {
                "pretty" => OutputFormat::Pretty,
                #[cfg(feature = "json")]
                "json" => OutputFormat::Json,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "Invalid format: {}",
                        format
                    )))
                }
            };

            println!("{}", display_certificate(&info, output_format)?);
        }

        Commands::Verify { cert, host, client } => {
            let (root_cert, _) = store.root_paths();
            let root = SignedCertificate::from_pem(&std::fs::read_to_string(&root_cert)?)?;
            let leaf = SignedCertificate::from_pem(&std::fs::read_to_string(&cert)?)?;

            let purpose = if client {
                Purpose::ClientAuth
            } else {
                Purpose::ServerAuth
            };
            let host = match (purpose, host) {
                (_, Some(host)) => host,
                (Purpose::ClientAuth, None) => String::new(),
                (Purpose::ServerAuth, None) => {
                    return Err(Error::InvalidInput(
                        "--host is required for server verification".to_string(),
                    ))
                }
            };
            verify_leaf(&root, &leaf, &host, purpose)?;

            println!("{}", "Certificate verified successfully!".green().bold());
            println!("  {}: {}", "Certificate".cyan(), cert.display());
            println!("  {}: {}", "Root".cyan(), root_cert.display());
            if !host.is_empty() {
                println!("  {}: {}", "Name".cyan(), host);
            }
            println!("  {}: {:?}", "Purpose".cyan(), purpose);
        }
    }

    Ok(())
}
