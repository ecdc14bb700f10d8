//! `fsearch`: recursive regex search over a directory tree.
//!
//! Thin front-end over [`taskpool_rs::search`]; all matching runs on the
//! work-stealing pool.

use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use taskpool_rs::search::{search, SearchConfig};

struct Args {
    patterns: Vec<String>,
    path: PathBuf,
    filter: String,
    threads: usize,
    use_file: bool,
    print_matches: bool,
    print_files: bool,
    respect_gitignore: bool,
    verbose: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            path: PathBuf::from("."),
            filter: String::from(".*"),
            threads: num_cpus::get().max(1),
            use_file: false,
            print_matches: true,
            print_files: true,
            respect_gitignore: false,
            verbose: false,
        }
    }
}

fn usage(exe: &str) -> String {
    format!(
        "usage: {exe} <pattern>... [options]\n\
         \n\
         options:\n\
         \x20 -p, --path <dir>        search directory (default: .)\n\
         \x20 -f, --filter <regex>    only search files whose path matches (default: .*)\n\
         \x20 -t, --threads <n>       worker threads (default: logical CPUs)\n\
         \x20 -u, --use-file          treat <pattern> arguments as files of patterns, one per line\n\
         \x20 -M, --suppress-matches  print only file names, not each match\n\
         \x20 -F, --suppress-files    print only matches, not file names\n\
         \x20 -g, --gitignore         honor .gitignore during the walk\n\
         \x20 -v, --verbose           report walk and read statistics to stderr\n\
         \x20 -h, --help              print this message"
    )
}

fn parse_args(exe: &str) -> Result<Args, String> {
    let mut args = Args::default();
    let mut raw = env::args().skip(1);

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", usage(exe));
                std::process::exit(0);
            }
            "-p" | "--path" => {
                let value = raw.next().ok_or("missing value for --path")?;
                args.path = PathBuf::from(value);
            }
            "-f" | "--filter" => {
                args.filter = raw.next().ok_or("missing value for --filter")?;
            }
            "-t" | "--threads" => {
                let value = raw.next().ok_or("missing value for --threads")?;
                args.threads = value
                    .parse()
                    .map_err(|_| format!("invalid thread count: {value}"))?;
                if args.threads == 0 {
                    return Err("thread count must be at least 1".into());
                }
            }
            "-u" | "--use-file" => args.use_file = true,
            "-M" | "--suppress-matches" => args.print_matches = false,
            "-F" | "--suppress-files" => args.print_files = false,
            "-g" | "--gitignore" => args.respect_gitignore = true,
            "-v" | "--verbose" => args.verbose = true,
            flag if flag.starts_with('-') => {
                return Err(format!("unknown flag: {flag}"));
            }
            pattern => args.patterns.push(pattern.to_string()),
        }
    }

    if args.patterns.is_empty() {
        return Err("must provide a search pattern".into());
    }
    if !args.path.is_dir() {
        return Err(format!(
            "search path [{}] is not a directory",
            args.path.display()
        ));
    }

    Ok(args)
}

/// Expands pattern arguments into compiled matchers, reading pattern files
/// when `--use-file` is set.
fn compile_matchers(args: &Args) -> Result<Vec<BytesRegex>, String> {
    let mut sources = Vec::new();
    if args.use_file {
        for file in &args.patterns {
            let contents =
                fs::read_to_string(file).map_err(|err| format!("cannot read [{file}]: {err}"))?;
            sources.extend(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
    } else {
        sources.extend(args.patterns.iter().cloned());
    }

    if sources.is_empty() {
        return Err("no search patterns provided".into());
    }

    sources
        .iter()
        .map(|src| BytesRegex::new(src).map_err(|err| format!("bad pattern [{src}]: {err}")))
        .collect()
}

fn main() -> ExitCode {
    let exe = env::args().next().unwrap_or_else(|| "fsearch".into());

    let args = match parse_args(&exe) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{exe}: {err}\n{}", usage(&exe));
            return ExitCode::from(2);
        }
    };

    let matchers = match compile_matchers(&args) {
        Ok(matchers) => matchers,
        Err(err) => {
            eprintln!("{exe}: {err}");
            return ExitCode::from(2);
        }
    };

    let filter = match Regex::new(&args.filter) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("{exe}: bad filter [{}]: {err}", args.filter);
            return ExitCode::from(2);
        }
    };

    if args.verbose {
        eprintln!("info: search path {}", args.path.display());
        eprintln!("info: filter regex \"{}\"", args.filter);
        eprintln!("info: workers {}", args.threads);
        for m in &matchers {
            eprintln!("info: search regex \"{}\"", m.as_str());
        }
    }

    let config = SearchConfig {
        root: args.path,
        matchers,
        filter,
        workers: args.threads,
        respect_gitignore: args.respect_gitignore,
        skip_hidden: false,
    };

    let report = search(&config);

    if args.verbose {
        eprintln!(
            "info: searched {} files in {} directories",
            report.stats.files_searched, report.stats.dirs_visited
        );
        eprintln!("info: read {} bytes in total", report.stats.bytes_read);
    }

    let mut failures = false;
    for (path, outcome) in &report.results {
        match outcome {
            Ok(found) if found.matched => {
                if args.print_files && args.print_matches {
                    for m in &found.matches {
                        println!("{}:{m}", path.display());
                    }
                } else if args.print_files {
                    println!("{}", path.display());
                } else if args.print_matches {
                    for m in &found.matches {
                        println!("{m}");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                // Per-file failures do not abort the run.
                eprintln!("{exe}: {}: {err}", path.display());
                failures = true;
            }
        }
    }

    if failures {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
