//! Example reader: attach to a running game, identify its version and dump
//! a few globals.

use std::process::ExitCode;

use clap::{App, Arg};

use dfview::{parse_path, MemoryReader, ReadSession, ReaderFactory, Schema};
use dfview::{CachingReader, VectorizingReader};

fn main() -> ExitCode {
    env_logger::init();

    let matches = App::new("dfview")
        .about("Reads data out of a running Dwarf Fortress process")
        .arg(
            Arg::new("structures")
                .value_name("structures_dir")
                .help("Path to a directory containing df-structures xml")
                .required(true),
        )
        .arg(
            Arg::new("pid")
                .value_name("pid")
                .help("Process id of the running game")
                .required(true),
        )
        .arg(
            Arg::new("type")
                .short('t')
                .long("type")
                .takes_value(true)
                .possible_values(["native", "wine"])
                .default_value("native")
                .help("Process type"),
        )
        .arg(
            Arg::new("cache")
                .short('c')
                .long("cache")
                .help("Cache page reads"),
        )
        .arg(
            Arg::new("vectorize")
                .short('v')
                .long("vectorize")
                .help("Group reads into vectored calls"),
        )
        .get_matches();

    let structures = matches.value_of("structures").unwrap_or_default();
    let pid: i32 = match matches.value_of("pid").unwrap_or_default().parse() {
        Ok(pid) => pid,
        Err(_) => {
            eprintln!("pid must be an integer");
            return ExitCode::FAILURE;
        }
    };

    let schema = match Schema::load(structures) {
        Ok(schema) => schema,
        Err(error) => {
            eprintln!("Could not load structures: {}", error);
            return ExitCode::FAILURE;
        }
    };

    if matches.value_of("type") == Some("wine") {
        eprintln!("wine processes are not supported by this build");
        return ExitCode::FAILURE;
    }

    let process = match attach(pid) {
        Ok(process) => process,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    match (matches.is_present("cache"), matches.is_present("vectorize")) {
        (true, true) => run(&schema, CachingReader::new(VectorizingReader::new(process))),
        (true, false) => run(&schema, CachingReader::new(process)),
        (false, true) => run(&schema, VectorizingReader::new(process)),
        (false, false) => run(&schema, process),
    }
}

#[cfg(target_os = "linux")]
fn attach(pid: i32) -> Result<dfview::NativeProcess, String> {
    dfview::NativeProcess::attach(pid).map_err(|error| format!("Failed to attach: {}", error))
}

#[cfg(not(target_os = "linux"))]
fn attach(_pid: i32) -> Result<dfview::SparseMemory, String> {
    Err("native processes are only supported on Linux".to_string())
}

fn run(schema: &Schema, process: impl MemoryReader + 'static) -> ExitCode {
    let version = match schema.version_by_id(process.id()) {
        Some(version) => version,
        None => {
            eprintln!("Unknown binary: no version matches the process identifier");
            return ExitCode::FAILURE;
        }
    };
    println!("Found {}", version.name);

    let factory = match ReaderFactory::new(schema, version) {
        Ok(factory) => factory,
        Err(error) => {
            eprintln!("Failed to initialize readers: {}", error);
            return ExitCode::FAILURE;
        }
    };

    let session = ReadSession::new(&factory, &process);

    // The active unit vector is a vector of pointers; reading it as raw
    // addresses needs no structure bindings.
    let path = match parse_path("world.units.active") {
        Ok(path) => path,
        Err(error) => {
            eprintln!("{}", error);
            return ExitCode::FAILURE;
        }
    };
    let mut active: Vec<u64> = Vec::new();
    if session.sync(vec![session.read_global(&path, &mut active)]) {
        println!("{} active units", active.len());
        ExitCode::SUCCESS
    } else {
        eprintln!("Failed to read world.units.active");
        ExitCode::FAILURE
    }
}
