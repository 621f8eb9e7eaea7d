use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ndnft_face::pipeline::PipelineType;
use ndnft_face::{MAX_MTU, MIN_MTU};
use std::path::PathBuf;
use std::process;

mod commands;
mod utils;

/// NDN file-transfer client and server
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand that opens a data-plane face.
#[derive(Args, Debug, Clone)]
struct FaceArgs {
    /// The GraphQL server address of the local forwarder
    #[clap(long, default_value = ndnft_ft::DEFAULT_GQLSERVER)]
    gqlserver: String,

    /// The NDN name prefix the producer publishes under
    #[clap(long, default_value = "/ndnft")]
    name_prefix: String,

    /// Dataroom size for the memif face, between 64 and 9000
    #[clap(long, default_value_t = ndnft_face::DEFAULT_MTU)]
    mtu: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy files or directories over NDN
    Fetch {
        #[clap(flatten)]
        face: FaceArgs,

        /// Interest lifetime in milliseconds
        #[clap(long, default_value_t = ndnft_ft::DEFAULT_LIFETIME_MS)]
        lifetime: u64,

        /// The pipeline type: fixed or aimd
        #[clap(long, default_value = "aimd")]
        pipeline_type: String,

        /// Maximum window for `fixed`, initial ssthresh for `aimd`
        #[clap(long, default_value_t = ndnft_ft::DEFAULT_PIPELINE_SIZE)]
        pipeline_size: usize,

        /// The number of parallel streams, between 1 and 16
        #[clap(short, long, default_value_t = ndnft_ft::DEFAULT_STREAMS)]
        streams: usize,

        /// Recurse into directories
        #[clap(short, long)]
        recursive: bool,

        /// Directory received files are written into
        #[clap(short, long, default_value = ".")]
        output: PathBuf,

        /// Files or directories to fetch
        #[clap(required = true)]
        paths: Vec<String>,
    },

    /// List files or directories published by a producer
    List {
        #[clap(flatten)]
        face: FaceArgs,

        /// Interest lifetime in milliseconds
        #[clap(long, default_value_t = ndnft_ft::DEFAULT_LIFETIME_MS)]
        lifetime: u64,

        /// Recurse into directories
        #[clap(short, long)]
        recursive: bool,

        /// Files or directories to list
        #[clap(required = true)]
        paths: Vec<String>,
    },

    /// Serve a local directory to NDN consumers
    Serve {
        #[clap(flatten)]
        face: FaceArgs,

        /// Directory to serve files from
        #[clap(short = 'd', long, default_value = ".")]
        root: PathBuf,

        /// Payload bytes per segment
        #[clap(long, default_value_t = ndnft_ft::DEFAULT_SEGMENT_SIZE)]
        segment_size: u64,

        /// Freshness of segment Data packets in milliseconds
        #[clap(long, default_value_t = 0)]
        freshness: u64,
    },
}

fn validate_face_args(face: &FaceArgs) {
    if face.mtu < MIN_MTU || face.mtu > MAX_MTU {
        eprintln!("ERROR: invalid MTU size");
        process::exit(2);
    }
    if face.gqlserver.is_empty() {
        eprintln!("ERROR: empty gqlserver argument value");
        process::exit(2);
    }
    if face.name_prefix.is_empty() {
        eprintln!("ERROR: empty name prefix value");
        process::exit(2);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    match cli.command {
        Commands::Fetch {
            face,
            lifetime,
            pipeline_type,
            pipeline_size,
            streams,
            recursive,
            output,
            paths,
        } => {
            validate_face_args(&face);
            if streams < 1 || streams > 16 {
                eprintln!("ERROR: invalid streams value");
                process::exit(2);
            }
            let pipeline_type: PipelineType = match pipeline_type.parse() {
                Ok(pipeline_type) => pipeline_type,
                Err(_) => {
                    eprintln!("ERROR: invalid pipeline type");
                    process::exit(2);
                }
            };

            let options = ndnft_ft::ClientOptions {
                name_prefix: face.name_prefix,
                gqlserver: face.gqlserver,
                mtu: face.mtu,
                lifetime_ms: lifetime,
                pipeline_type,
                pipeline_size,
                streams,
                paths,
                recursive,
            };
            commands::fetch::run(options, output)?;
        }
        Commands::List {
            face,
            lifetime,
            recursive,
            paths,
        } => {
            validate_face_args(&face);
            let options = ndnft_ft::ClientOptions {
                name_prefix: face.name_prefix,
                gqlserver: face.gqlserver,
                mtu: face.mtu,
                lifetime_ms: lifetime,
                paths,
                recursive,
                ..Default::default()
            };
            commands::list::run(options)?;
        }
        Commands::Serve {
            face,
            root,
            segment_size,
            freshness,
        } => {
            validate_face_args(&face);
            if segment_size == 0 || segment_size as usize > face.mtu {
                eprintln!("ERROR: invalid segment size");
                process::exit(2);
            }
            let options = ndnft_ft::ServerOptions {
                name_prefix: face.name_prefix,
                gqlserver: face.gqlserver,
                mtu: face.mtu,
                root_dir: root,
                segment_size,
                freshness_ms: freshness,
            };
            commands::serve::run(options)?;
        }
    }

    Ok(())
}
