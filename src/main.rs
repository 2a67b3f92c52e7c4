use std::error::Error;
use std::fs;
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;
use rand::Rng;

use tape_sort::{NaturalMergeSorterBuilder, Record, Tape, TapeMode};

fn main() {
    let matches = build_arg_parser();

    let log_level: LogLevel = matches.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let result = match matches.subcommand() {
        Some(("generate", sub_matches)) => generate(sub_matches),
        Some(("import", sub_matches)) => import(sub_matches),
        Some(("print", sub_matches)) => print_tape(sub_matches),
        Some(("info", sub_matches)) => info(sub_matches),
        Some(("sort", sub_matches)) => sort(sub_matches),
        _ => unreachable!("subcommand is required"),
    };

    if let Err(err) = result {
        log::error!("{}", err);
        process::exit(1);
    }
}

/// Fills a tape with pseudo-random records, replacing previous content.
fn generate(matches: &clap::ArgMatches) -> Result<(), Box<dyn Error>> {
    let tape_path = matches.value_of("tape").expect("value is required");
    let count: u64 = matches.value_of_t_or_exit("count");

    let mut tape = Tape::new(tape_path, block_size(matches))?;
    tape.reset(TapeMode::ReadWrite)?;
    tape.truncate()?;

    let mut rng = rand::thread_rng();
    for _ in 0..count {
        let record = Record::new(
            rng.gen_range(1..=10),
            rng.gen_range(1..=4),
            rng.gen_range(1..=5),
            rng.gen_range(1..=5),
            rng.gen_range(1..=20),
        );
        tape.write_record(&record)?;
    }
    tape.close()?;

    println!("wrote {} records to {}", count, tape_path);

    Ok(())
}

/// Imports whitespace-separated integer quintuples from a text file onto a
/// tape, replacing previous content. Stops at the first malformed token; the
/// tape keeps everything imported up to that point.
fn import(matches: &clap::ArgMatches) -> Result<(), Box<dyn Error>> {
    let tape_path = matches.value_of("tape").expect("value is required");
    let source = matches.value_of("from").expect("value is required");

    let contents = fs::read_to_string(source)?;

    let mut tape = Tape::new(tape_path, block_size(matches))?;
    tape.reset(TapeMode::ReadWrite)?;
    tape.truncate()?;

    let mut written: u64 = 0;
    let mut tokens = contents.split_whitespace();
    'records: loop {
        let mut fields = [0i32; 5];
        for (i, field) in fields.iter_mut().enumerate() {
            match tokens.next() {
                Some(token) => match token.parse::<i32>() {
                    Ok(value) => *field = value,
                    Err(_) => {
                        log::warn!("stopping at non-integer token {:?}", token);
                        break 'records;
                    }
                },
                None => {
                    if i > 0 {
                        log::warn!("dropping trailing record with only {} of 5 fields", i);
                    }
                    break 'records;
                }
            }
        }

        let [a, y, c, z, x] = fields;
        tape.write_record(&Record::new(a, y, c, z, x))?;
        written += 1;
    }
    tape.close()?;

    println!("imported {} records from {} to {}", written, source, tape_path);

    Ok(())
}

/// Prints a tape's records, or only their derived keys, in storage order.
fn print_tape(matches: &clap::ArgMatches) -> Result<(), Box<dyn Error>> {
    let tape_path = matches.value_of("tape").expect("value is required");
    let keys_only = matches.is_present("keys_only");

    let count = print_records(tape_path, block_size(matches), keys_only)?;
    println!("{}: {} records", tape_path, count);

    Ok(())
}

/// Reports a tape's record count and run count.
fn info(matches: &clap::ArgMatches) -> Result<(), Box<dyn Error>> {
    let tape_path = matches.value_of("tape").expect("value is required");

    let mut tape = Tape::new(tape_path, block_size(matches))?;
    tape.reset(TapeMode::Read)?;

    let mut records: u64 = 0;
    let mut runs: u64 = 0;
    let mut last: Option<Record> = None;

    while let Some(record) = tape.read_record()? {
        records += 1;
        if matches!(last, Some(prev) if record < prev) {
            runs += 1;
        }
        last = Some(record);
    }
    tape.close()?;

    if records > 0 {
        runs += 1;
    }

    println!("{}: {} records, {} runs", tape_path, records, runs);

    Ok(())
}

/// Sorts a tape in place and reports the sort statistics.
fn sort(matches: &clap::ArgMatches) -> Result<(), Box<dyn Error>> {
    let tape_path = matches.value_of("tape").expect("value is required");

    let mut sorter_builder = NaturalMergeSorterBuilder::new().with_block_size(block_size(matches));
    if let Some(work_dir) = matches.value_of("work_dir") {
        sorter_builder = sorter_builder.with_work_dir(path::Path::new(work_dir));
    }

    let sorter = sorter_builder.build()?;
    let stats = sorter.sort(tape_path)?;

    println!("sorted {}", tape_path);
    println!("elapsed: {} ms", stats.elapsed.as_millis());
    println!("phases: {}", stats.phases);
    println!("physical reads: {}", stats.physical_reads);
    println!("physical writes: {}", stats.physical_writes);

    if matches.is_present("show") {
        let count = print_records(tape_path, block_size(matches), true)?;
        println!("{}: {} records", tape_path, count);
    }

    Ok(())
}

fn print_records(tape_path: &str, block_size: usize, keys_only: bool) -> Result<u64, Box<dyn Error>> {
    let mut tape = Tape::new(tape_path, block_size)?;
    tape.reset(TapeMode::Read)?;

    let mut count: u64 = 0;
    while let Some(record) = tape.read_record()? {
        if keys_only {
            println!("record {}: g = {:.2}", count, record.key());
        } else {
            println!("record {}: {}", count, record);
        }
        count += 1;
    }
    tape.close()?;

    Ok(count)
}

fn block_size(matches: &clap::ArgMatches) -> usize {
    matches
        .value_of("block_size")
        .expect("value is required")
        .parse::<ByteSize>()
        .expect("value is pre-validated")
        .as_u64() as usize
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn tape_arg() -> clap::Arg<'static> {
    clap::Arg::new("tape")
        .short('f')
        .long("tape")
        .help("tape file")
        .required(true)
        .takes_value(true)
}

fn block_size_arg() -> clap::Arg<'static> {
    clap::Arg::new("block_size")
        .short('b')
        .long("block-size")
        .help("tape block size")
        .takes_value(true)
        .default_value("4KiB")
        .validator(|v| match v.parse::<ByteSize>() {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Block size format incorrect: {}", err)),
        })
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("tape-sort")
        .about("natural merge sort over block-buffered tapes")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .global(true)
                .possible_values(LogLevel::possible_values()),
        )
        .subcommand(
            clap::App::new("generate")
                .about("fill a tape with pseudo-random records")
                .arg(tape_arg())
                .arg(block_size_arg())
                .arg(
                    clap::Arg::new("count")
                        .short('n')
                        .long("count")
                        .help("number of records to generate")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::App::new("import")
                .about("import integer quintuples from a text file onto a tape")
                .arg(tape_arg())
                .arg(block_size_arg())
                .arg(
                    clap::Arg::new("from")
                        .short('i')
                        .long("from")
                        .help("text file with whitespace-separated integers, five per record")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::App::new("print")
                .about("print a tape's records in storage order")
                .arg(tape_arg())
                .arg(block_size_arg())
                .arg(
                    clap::Arg::new("keys_only")
                        .short('g')
                        .long("keys-only")
                        .help("print only the derived keys"),
                ),
        )
        .subcommand(
            clap::App::new("info")
                .about("report a tape's record and run counts")
                .arg(tape_arg())
                .arg(block_size_arg()),
        )
        .subcommand(
            clap::App::new("sort")
                .about("sort a tape in place and report physical I/O statistics")
                .arg(tape_arg())
                .arg(block_size_arg())
                .arg(
                    clap::Arg::new("work_dir")
                        .short('d')
                        .long("work-dir")
                        .help("directory to be used to store working tapes")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("show")
                        .short('s')
                        .long("show")
                        .help("print the sorted tape's keys afterwards"),
                ),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
