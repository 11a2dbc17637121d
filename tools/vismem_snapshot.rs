// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Debug snapshot of a visual memory file.
//!
//! Reads the header of an existing memory file, maps it, writes the tiled debug
//! PNG and prints the snapshot stats as JSON on stdout.

use std::env;
use std::path::PathBuf;
use std::process;

use vismem::engine::{snapshot, MemoryStore};
use vismem::observability::{init_console_logging, parse_debug_flags};

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: vismem_snapshot [--memory <path>] [--out <path>]\n\n\
         Defaults:\n\
         - memory: vismem.bin\n\
         - out: vismem.png\n"
    );
    process::exit(2);
}

fn parse_args() -> (PathBuf, PathBuf) {
    let mut memory = PathBuf::from("vismem.bin");
    let mut out = PathBuf::from("vismem.png");

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--memory" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                memory = PathBuf::from(v);
            }
            "--out" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                out = PathBuf::from(v);
            }
            // Consumed by parse_debug_flags
            a if a.starts_with("--debug-") => {}
            "-h" | "--help" => usage_and_exit(),
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }

    (memory, out)
}

fn main() {
    let (memory, out) = parse_args();

    if let Err(e) = init_console_logging(&parse_debug_flags(), "warn") {
        eprintln!("Logging unavailable: {e}");
    }

    let shape = MemoryStore::inspect(&memory).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    let store = MemoryStore::open(&memory, shape).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let stats = snapshot::write_png(store.cells(), store.shape(), &out).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize stats: {e}");
            process::exit(1);
        }
    }
}
