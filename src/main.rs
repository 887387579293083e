//! The `au` command-line tool: decode, tail, grep, and encode Au streams.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use au::grep::{parse_atom, GrepRunner, Pattern, StrPattern};
use au::value::write_json_value;
use au::{
    AuError, ByteSource, Decoder, Encoder, EncoderConfig, FileSource, RawSource, SourceError,
    StdinSource, TailReader, Value,
};

#[derive(Parser)]
#[command(name = "au", about = "Tools for the Au binary record format", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a stream and print one JSON document per record
    Cat {
        /// Input path ("-" for stdin)
        #[arg(default_value = "-")]
        path: String,

        /// Keep reading as the input grows
        #[arg(short, long)]
        follow: bool,
    },

    /// Start decoding near the end of a file
    Tail {
        /// Input path
        path: PathBuf,

        /// Keep reading as the file grows
        #[arg(short, long)]
        follow: bool,

        /// How many bytes before end-of-file to scan from
        #[arg(short, long, default_value_t = 256 * 1024)]
        bytes: u64,
    },

    /// Print records matching a pattern
    Grep {
        /// The pattern to match
        pattern: String,

        /// Input paths ("-" for stdin; defaults to stdin)
        paths: Vec<String>,

        /// Match the pattern only in object values with this key
        #[arg(short, long)]
        key: Option<String>,

        /// Match the pattern against integer values
        #[arg(short = 'i', long)]
        integer: bool,

        /// Match the pattern against double-precision float values
        #[arg(short = 'd', long)]
        double: bool,

        /// Match the pattern against string values
        #[arg(short = 's', long)]
        string: bool,

        /// Match the pattern as a substring of string values (implies -s)
        #[arg(short = 'u', long)]
        substring: bool,

        /// Match the pattern against true, false or null
        #[arg(short = 'a', long)]
        atom: bool,

        /// Show only the first N matching records
        #[arg(short = 'm', long, value_name = "N")]
        matches: Option<u64>,

        /// Show N records of context before each match
        #[arg(short = 'B', long, value_name = "N")]
        before: Option<usize>,

        /// Show N records of context after each match
        #[arg(short = 'A', long, value_name = "N")]
        after: Option<usize>,

        /// Equivalent to -A N -B N
        #[arg(short = 'C', long, value_name = "N")]
        context: Option<usize>,

        /// Print the count of matching records per file
        #[arg(short = 'c', long)]
        count: bool,

        /// Emit matching records as Au instead of JSON
        #[arg(short = 'e', long)]
        encode: bool,
    },

    /// Encode newline-delimited JSON as an Au stream
    Json2au {
        /// JSON input ("-" for stdin)
        #[arg(default_value = "-")]
        input: String,

        /// Au output ("-" for stdout)
        #[arg(default_value = "-")]
        output: String,
    },
}

fn init_tracing() {
    // Without an installed subscriber, `RUST_LOG=...` has no effect. Default
    // to "off" so output only changes when the user opts in.
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "off".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("au: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AuError> {
    match cli.command {
        Commands::Cat { path, follow } => cat(&path, follow),
        Commands::Tail {
            path,
            follow,
            bytes,
        } => tail(&path, follow, bytes),
        Commands::Grep {
            pattern,
            paths,
            key,
            integer,
            double,
            string,
            substring,
            atom,
            matches,
            before,
            after,
            context,
            count,
            encode,
        } => {
            let flags = GrepFlags {
                key,
                integer,
                double,
                string,
                substring,
                atom,
                matches,
                before,
                after,
                context,
                count,
            };
            let pattern = build_pattern(&pattern, flags).map_err(AuError::Usage)?;
            grep(&pattern, &paths, count, encode)
        }
        Commands::Json2au { input, output } => json2au(&input, &output),
    }
}

fn open_source(path: &str, follow: bool) -> Result<ByteSource<Box<dyn RawSource>>, SourceError> {
    let raw: Box<dyn RawSource> = if path == "-" {
        Box::new(StdinSource::new())
    } else {
        Box::new(FileSource::open(path)?)
    };
    Ok(ByteSource::new(raw).follow(follow))
}

fn print_json<W: Write>(out: &mut W, value: &Value) -> Result<(), AuError> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn cat(path: &str, follow: bool) -> Result<(), AuError> {
    let source = open_source(path, follow)?;
    let mut decoder = Decoder::new(source);
    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    decoder.decode_stream(|_, value| print_json(&mut out, &value))?;
    out.flush()?;
    Ok(())
}

fn tail(path: &PathBuf, follow: bool, bytes: u64) -> Result<(), AuError> {
    let source = ByteSource::new(FileSource::open(path)?).follow(follow);
    let mut reader = TailReader::new(source);
    if !reader.start(bytes)? {
        eprintln!(
            "au: unable to find the start of a valid value record; \
             consider scanning from earlier in the file (see -b)"
        );
        return Err(AuError::SyncFailed);
    }
    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    reader.decode_stream(|_, value| print_json(&mut out, &value))?;
    out.flush()?;
    Ok(())
}

struct GrepFlags {
    key: Option<String>,
    integer: bool,
    double: bool,
    string: bool,
    substring: bool,
    atom: bool,
    matches: Option<u64>,
    before: Option<usize>,
    after: Option<usize>,
    context: Option<usize>,
    count: bool,
}

fn build_pattern(raw: &str, flags: GrepFlags) -> Result<Pattern, String> {
    let explicit_string = flags.string || flags.substring;
    let typed = flags.integer || flags.double || flags.atom;
    if flags.substring && typed {
        return Err("-u (substring search) is not compatible with -i/-d/-a".into());
    }
    // By default the pattern is tried against every value kind it parses
    // as; explicit flags narrow that down.
    let default_match = !(explicit_string || typed);

    let mut pattern = Pattern {
        key: flags.key,
        max_matches: flags.matches,
        count_only: flags.count,
        ..Pattern::default()
    };

    if default_match || explicit_string {
        pattern.str_pattern = Some(StrPattern {
            pattern: raw.to_owned(),
            full_match: !flags.substring,
        });
    }
    if default_match || flags.integer {
        pattern.int_pattern = raw.parse().ok();
        pattern.uint_pattern = raw.parse().ok();
        if flags.integer && pattern.int_pattern.is_none() && pattern.uint_pattern.is_none() {
            return Err(format!("-i specified, but pattern '{raw}' is not an integer"));
        }
    }
    if default_match || flags.double {
        pattern.double_pattern = raw.parse().ok();
        if flags.double && pattern.double_pattern.is_none() {
            return Err(format!(
                "-d specified, but pattern '{raw}' is not a double-precision number"
            ));
        }
    }
    if default_match || flags.atom {
        pattern.atom_pattern = parse_atom(raw);
        if flags.atom && pattern.atom_pattern.is_none() {
            return Err(format!(
                "-a specified, but pattern '{raw}' is not true, false or null"
            ));
        }
    }

    if let Some(n) = flags.context {
        pattern.before_context = n;
        pattern.after_context = n;
    }
    if let Some(n) = flags.before {
        pattern.before_context = n;
    }
    if let Some(n) = flags.after {
        pattern.after_context = n;
    }
    Ok(pattern)
}

fn grep(pattern: &Pattern, paths: &[String], count: bool, encode: bool) -> Result<(), AuError> {
    let paths: Vec<String> = if paths.is_empty() {
        vec!["-".to_owned()]
    } else {
        paths.to_vec()
    };
    let many = paths.len() > 1;

    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);

    for path in &paths {
        let source = open_source(path, false)?;
        let mut decoder = Decoder::new(source);
        let mut runner = GrepRunner::new(pattern);

        if encode {
            let display = if path == "-" { "<stdin>" } else { path };
            let mut encoder = Encoder::with_config(EncoderConfig {
                metadata: format!("encoded by au: grep output from {display}"),
                ..EncoderConfig::default()
            });
            grep_stream(&mut decoder, &mut runner, &mut |value| {
                encoder.encode(|w| value.write_to(w), &mut out).map(|_| ())?;
                Ok(())
            })?;
        } else {
            grep_stream(&mut decoder, &mut runner, &mut |value| {
                print_json(&mut out, value)
            })?;
        }

        if count {
            if many {
                writeln!(out, "{}: {}", path, runner.matches())?;
            } else {
                writeln!(out, "{}", runner.matches())?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn grep_stream<R: RawSource>(
    decoder: &mut Decoder<R>,
    runner: &mut GrepRunner<'_>,
    emit: &mut dyn FnMut(&Value) -> Result<(), AuError>,
) -> Result<(), AuError> {
    while let Some((_, value)) = decoder.next_value()? {
        if !runner.push(value, emit)? {
            break;
        }
    }
    Ok(())
}

fn json2au(input: &str, output: &str) -> Result<(), AuError> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };
    let mut out: Box<dyn Write> = if output == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(output)?))
    };

    let display = if input == "-" { "<stdin>" } else { input };
    let mut encoder = Encoder::with_config(EncoderConfig {
        metadata: format!("encoded by au json2au from {display}"),
        ..EncoderConfig::default()
    });

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let json: serde_json::Value = serde_json::from_str(&line)?;
        encoder.encode(|w| write_json_value(w, &json), &mut out)?;
    }
    out.flush()?;
    Ok(())
}
