//! Fetch command: copy files or directories over NDN.

use anyhow::{Context, Result};
use log::{error, info, warn};
use ndnft_common::ndn::Name;
use ndnft_face::pipeline::Pipeline;
use ndnft_ft::client::{Client, Transfer};
use ndnft_ft::naming;
use ndnft_ft::sink::{ContentSink, FileSink};
use ndnft_ft::ClientOptions;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::open_face;
use crate::utils;

pub fn run(options: ClientOptions, output: PathBuf) -> Result<()> {
    let (face, mut mgmt) = open_face(&options.gqlserver, options.mtu, "ndnft-client")?;
    let pipeline = Arc::new(Pipeline::new(
        face,
        options.pipeline_type.controller(options.pipeline_size),
    )?);

    // Ctrl-C stops the pipeline; pending Interests drain as network errors
    // and the transfer workers wind down
    {
        let pipeline = Arc::clone(&pipeline);
        ctrlc::set_handler(move || pipeline.stop()).context("installing signal handler")?;
    }

    let prefix = Name::from_string(&options.name_prefix);
    let client = Client::new(options.clone(), Arc::clone(&pipeline));

    // Discover everything up front so the totals are known
    let mut files = Vec::new();
    for path in &options.paths {
        match client.list(path, options.recursive) {
            Ok(metadata) => files.extend(metadata.into_iter().filter(|m| m.is_file())),
            Err(e) => {
                error!("cannot open {}: {}", path, e);
                pipeline.stop();
                process::exit(-2);
            }
        }
    }

    let total_size: u64 = files.iter().map(|m| m.size).sum();
    for metadata in &files {
        println!("{}", metadata.versioned_name);
    }
    println!("\ntotal {}", files.len());
    println!("total size {} bytes\n", total_size);

    if files.is_empty() {
        pipeline.stop();
        return Ok(());
    }

    // Periodic progress line while the transfer runs
    let transferred = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let progress_printer = {
        let transferred = Arc::clone(&transferred);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                thread::sleep(Duration::from_secs(1));
                let bytes = transferred.load(Ordering::Acquire);
                if bytes > 0 && bytes < total_size {
                    info!(
                        "transferring {} / {} ({:.1}%)",
                        utils::format_bytes(bytes),
                        utils::format_bytes(total_size),
                        bytes as f64 * 100.0 / total_size as f64
                    );
                }
            }
        })
    };

    let started = Instant::now();
    let mut failed = false;

    for metadata in files {
        let rel_path = match naming::relative_path(&prefix, &metadata.versioned_name) {
            Some(rel_path) => rel_path,
            None => {
                warn!("skipping {}: unmappable name", metadata.versioned_name);
                continue;
            }
        };

        let out_path = output.join(&rel_path);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let versioned_name = metadata.versioned_name.clone();
        let segment_size = metadata.segment_size;
        let sink: Arc<Mutex<dyn ContentSink>> = Arc::new(Mutex::new(
            FileSink::create(&out_path, segment_size)
                .with_context(|| format!("creating {}", out_path.display()))?,
        ));

        let mut transfer = Transfer::from_metadata(metadata);
        let progress = Arc::clone(&transferred);
        match client.fetch(&mut transfer, sink, &move |bytes| {
            progress.fetch_add(bytes, Ordering::AcqRel);
        }) {
            Ok(_) => println!("downloaded {} -> {}", versioned_name, out_path.display()),
            Err(e) => {
                error!("transfer of {} failed: {}", versioned_name, e);
                failed = true;
                break;
            }
        }
    }

    let elapsed = started.elapsed();
    done.store(true, Ordering::Release);
    let _ = progress_printer.join();

    let counters = pipeline.counters();
    let goodput =
        transferred.load(Ordering::Acquire) as f64 * 8.0 / elapsed.as_secs_f64().max(1e-9);

    println!("\n--- statistics ---");
    println!(
        "{} interest packets transmitted, {} data packets received, {} timeouts, {} nacks",
        counters.tx.value(),
        counters.rx.value(),
        counters.timeout.value(),
        counters.nack.value()
    );
    println!(
        "average delay: {:.3} ms, elapsed: {}",
        counters.average_delay_usec() / 1000.0,
        utils::format_duration(elapsed)
    );
    println!("goodput: {}\n", utils::format_bitrate(goodput));

    pipeline.stop();
    if let Err(e) = mgmt.delete() {
        warn!("face cleanup failed: {}", e);
    }

    if failed {
        process::exit(-2);
    }
    Ok(())
}
