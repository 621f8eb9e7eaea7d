//! List command: print producer-side metadata without fetching content.

use anyhow::{Context, Result};
use log::error;
use ndnft_face::pipeline::Pipeline;
use ndnft_ft::client::Client;
use ndnft_ft::ClientOptions;
use std::process;
use std::sync::Arc;

use crate::commands::open_face;

pub fn run(options: ClientOptions) -> Result<()> {
    let (face, mut mgmt) = open_face(&options.gqlserver, options.mtu, "ndnft-client")?;
    let pipeline = Arc::new(Pipeline::new(
        face,
        options.pipeline_type.controller(options.pipeline_size),
    )?);

    {
        let pipeline = Arc::clone(&pipeline);
        ctrlc::set_handler(move || pipeline.stop()).context("installing signal handler")?;
    }

    let client = Client::new(options.clone(), Arc::clone(&pipeline));

    let mut total_count = 0u64;
    let mut total_size = 0u64;
    let mut failures = 0usize;

    for path in &options.paths {
        match client.list(path, options.recursive) {
            Ok(listing) => {
                for metadata in listing {
                    println!("{}", metadata.versioned_name);
                    total_count += 1;
                    total_size += metadata.size;
                }
            }
            Err(e) => {
                error!("cannot list {}: {}", path, e);
                failures += 1;
            }
        }
    }

    println!("\ntotal {}", total_count);
    println!("total size {} bytes", total_size);

    pipeline.stop();
    mgmt.delete().ok();

    if failures == options.paths.len() {
        process::exit(-2);
    }
    Ok(())
}
