//! Serve command: publish a local directory to NDN consumers.

use anyhow::{Context, Result};
use log::{info, warn};
use ndnft_face::handler::Driver;
use ndnft_ft::server::FileServer;
use ndnft_ft::ServerOptions;
use std::sync::atomic::Ordering;

use crate::commands::open_face;

pub fn run(options: ServerOptions) -> Result<()> {
    let (face, mut mgmt) = open_face(&options.gqlserver, options.mtu, "ndnft-server")?;
    mgmt.insert_fib_entry(&options.name_prefix)
        .context("advertising name prefix")?;

    info!(
        "serving {} under {}",
        options.root_dir.display(),
        options.name_prefix
    );

    let server = FileServer::new(options);
    let driver = Driver::new(face, server);

    let stop = driver.stop_flag();
    ctrlc::set_handler(move || stop.store(true, Ordering::Release))
        .context("installing signal handler")?;

    // Blocks until Ctrl-C or the face goes down
    let server = driver.run();

    let stats = server.stats();
    println!("\n--- statistics ---");
    println!(
        "{} interests processed: {} metadata, {} segments, {} nacks",
        stats.interests.value(),
        stats.metadata_sent.value(),
        stats.segments_sent.value(),
        stats.nacks_sent.value()
    );

    if let Err(e) = mgmt.delete() {
        warn!("face cleanup failed: {}", e);
    }
    Ok(())
}
