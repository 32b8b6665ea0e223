use std::env;
use std::time::Instant;

use basecodec::{
    codes, encoder, BitOrder, BitPacker, Decoder, InputModel, Machine, MatrixBuilder,
    MutatorParams,
};
use sysinfo::{get_current_pid, ProcessRefreshKind, System};

fn main() {
    let options = match Options::parse(env::args().skip(1)) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("decode_probe: {err}");
            Options::print_help();
            std::process::exit(2);
        }
    };

    eprintln!("\n{}", "=".repeat(80));
    eprintln!("Decode probe: closure and Viterbi decoders on the rotating code");
    eprintln!("{}", "=".repeat(80));
    eprintln!();
    eprintln!("Payloads are encoded, decoded and, up to {} bytes, checked", options.verify_limit);
    eprintln!("against the original data.");
    eprintln!();

    let machine = match codes::rotating_code(options.context_len) {
        Ok(m) => m,
        Err(err) => {
            eprintln!("decode_probe: {err}");
            std::process::exit(2);
        }
    };

    let mut sys = System::new();
    let mut measurements = Vec::new();

    eprintln!("[1/2] Closure decoder...");
    measurements.extend(run_closure(&machine, &options, &mut sys));
    eprintln!();
    eprintln!("[2/2] Viterbi decoder (noiseless channel)...");
    measurements.extend(run_viterbi(&machine, &options, &mut sys));
    eprintln!();

    print_summary(&measurements, &options);

    if let Err(err) = options.format.write(&measurements) {
        eprintln!("decode_probe: failed to write output: {err}");
        std::process::exit(1);
    }
}

struct Options {
    format: OutputFormat,
    verify_limit: usize,
    context_len: usize,
}

impl Options {
    fn parse<I, T>(mut args: I) -> Result<Self, String>
    where
        I: Iterator<Item = T>,
        T: Into<String>,
    {
        let mut format = OutputFormat::Csv;
        let mut verify_limit = 256usize;
        let mut context_len = 2usize;
        while let Some(arg) = args.next() {
            let arg = arg.into();
            if arg == "--help" || arg == "-h" {
                Options::print_help();
                std::process::exit(0);
            } else if let Some(value) = arg.strip_prefix("--format=") {
                format = OutputFormat::from_str(value)?;
            } else if arg == "--format" {
                let value = next_value(&mut args, "--format")?;
                format = OutputFormat::from_str(&value)?;
            } else if let Some(value) = arg.strip_prefix("--verify-limit=") {
                verify_limit = parse_count(value, "verify limit")?;
            } else if arg == "--verify-limit" {
                let value = next_value(&mut args, "--verify-limit")?;
                verify_limit = parse_count(&value, "verify limit")?;
            } else if let Some(value) = arg.strip_prefix("--context=") {
                context_len = parse_count(value, "context length")?;
            } else if arg == "--context" {
                let value = next_value(&mut args, "--context")?;
                context_len = parse_count(&value, "context length")?;
            } else {
                return Err(format!("unrecognized argument '{arg}'"));
            }
        }
        Ok(Self {
            format,
            verify_limit,
            context_len,
        })
    }

    fn print_help() {
        println!(
            "\
Usage: cargo run --bin decode_probe [-- <options>]

Options:
  --format <csv|table>          Output format (default: csv)
  --verify-limit <N>            Largest payload in bytes to check against the input (default: 256)
  --context <K>                 Bases of context kept by the rotating code (default: 2)
  -h, --help                    Print this help message

Examples:
  cargo run --bin decode_probe
  cargo run --release --bin decode_probe -- --format table --context 3
"
        );
    }
}

fn next_value<I, T>(args: &mut I, flag: &str) -> Result<String, String>
where
    I: Iterator<Item = T>,
    T: Into<String>,
{
    args.next()
        .map(Into::into)
        .ok_or_else(|| format!("missing value after {flag}"))
}

fn parse_count(value: &str, what: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("{what} must be a non-negative integer"))
}

#[derive(Copy, Clone)]
enum OutputFormat {
    Csv,
    Table,
}

impl OutputFormat {
    fn from_str(value: &str) -> Result<Self, String> {
        match value {
            "csv" => Ok(Self::Csv),
            "table" => Ok(Self::Table),
            other => Err(format!("unknown format '{other}'")),
        }
    }

    fn write(self, measurements: &[Measurement]) -> Result<(), String> {
        match self {
            OutputFormat::Csv => write_csv(measurements),
            OutputFormat::Table => write_table(measurements),
        }
    }
}

#[derive(Clone)]
struct Measurement {
    scenario: &'static str,
    size_desc: String,
    wall_s: f64,
    rss_delta_kib: u64,
    verification_status: VerificationStatus,
    verification_detail: Option<String>,
}

#[derive(Clone, Copy)]
enum VerificationStatus {
    NotChecked,
    Passed,
    Failed,
}

impl VerificationStatus {
    fn label(&self) -> &'static str {
        match self {
            VerificationStatus::NotChecked => "not_checked",
            VerificationStatus::Passed => "passed",
            VerificationStatus::Failed => "failed",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            VerificationStatus::Passed => "✓",
            VerificationStatus::Failed => "✗",
            VerificationStatus::NotChecked => "○",
        }
    }
}

const CLOSURE_SIZES: &[usize] = &[16, 64, 256, 1024, 4096, 16384];
const VITERBI_SIZES: &[usize] = &[4, 16, 64, 256, 1024];

fn run_closure(machine: &Machine, options: &Options, sys: &mut System) -> Vec<Measurement> {
    let total = CLOSURE_SIZES.len();
    CLOSURE_SIZES
        .iter()
        .enumerate()
        .map(|(idx, &len)| {
            eprint!("      [{}/{}] Payload {} bytes... ", idx + 1, total, len);
            let payload = deterministic_payload(len);
            let mut bases = 0;
            let m = measure("closure", format!("bytes={len}"), sys, || {
                let seq = match encoder::encode_bytes(machine, &payload, BitOrder::Msb0) {
                    Ok(seq) => seq,
                    Err(err) => return (VerificationStatus::Failed, Some(err.to_string())),
                };
                bases = seq.len();
                let mut out = Vec::with_capacity(len);
                match closure_decode(machine, &seq, &mut out) {
                    Err(err) => (VerificationStatus::Failed, Some(err.to_string())),
                    Ok(_) if len > options.verify_limit => (VerificationStatus::NotChecked, None),
                    Ok(_) if out == payload => (VerificationStatus::Passed, None),
                    Ok(_) => (
                        VerificationStatus::Failed,
                        Some(format!("decoded {} bytes differing from input", out.len())),
                    ),
                }
            });
            eprintln!(
                "{} bases={}, time={:.3}s, status={}",
                m.verification_status.icon(),
                bases,
                m.wall_s,
                m.verification_status.label()
            );
            m
        })
        .collect()
}

fn closure_decode(machine: &Machine, seq: &str, out: &mut Vec<u8>) -> basecodec::Result<()> {
    let mut packer = BitPacker::new(out, BitOrder::Msb0);
    let mut decoder = Decoder::new(machine, &mut packer)?;
    decoder.decode_str(seq)?;
    decoder.close()?;
    Ok(())
}

fn run_viterbi(machine: &Machine, options: &Options, sys: &mut System) -> Vec<Measurement> {
    let model = match InputModel::from_machine(machine, 0.0) {
        Ok(model) => model,
        Err(err) => {
            eprintln!("      cannot build input model: {err}");
            return Vec::new();
        }
    };
    let mut builder = MatrixBuilder::new(machine)
        .with_input_model(model)
        .with_mutator(MutatorParams::noiseless());
    let total = VITERBI_SIZES.len();
    VITERBI_SIZES
        .iter()
        .enumerate()
        .map(|(idx, &len)| {
            eprint!("      [{}/{}] Payload {} bytes... ", idx + 1, total, len);
            let payload = deterministic_payload(len);
            let mut loglike = f64::NEG_INFINITY;
            let m = measure("viterbi", format!("bytes={len}"), sys, || {
                let seq = match encoder::encode_bytes(machine, &payload, BitOrder::Msb0) {
                    Ok(seq) => seq,
                    Err(err) => return (VerificationStatus::Failed, Some(err.to_string())),
                };
                let inputs = builder.build(&seq).and_then(|vm| {
                    loglike = vm.loglike();
                    vm.traceback()
                });
                let expected = encoder::byte_inputs(machine, &payload, BitOrder::Msb0);
                match inputs {
                    Err(err) => (VerificationStatus::Failed, Some(err.to_string())),
                    Ok(_) if len > options.verify_limit => (VerificationStatus::NotChecked, None),
                    Ok(inputs) if inputs == expected => (VerificationStatus::Passed, None),
                    Ok(inputs) => (
                        VerificationStatus::Failed,
                        Some(format!(
                            "decoded {} symbols, expected {}",
                            inputs.len(),
                            expected.len()
                        )),
                    ),
                }
            });
            eprintln!(
                "{} loglike={:.3}, time={:.3}s, status={}",
                m.verification_status.icon(),
                loglike,
                m.wall_s,
                m.verification_status.label()
            );
            m
        })
        .collect()
}

fn print_summary(measurements: &[Measurement], options: &Options) {
    eprintln!("{}", "=".repeat(80));
    eprintln!("Summary");
    eprintln!("{}", "=".repeat(80));

    let mut passed = 0;
    let mut failed = 0;
    let mut not_checked = 0;
    for m in measurements {
        match m.verification_status {
            VerificationStatus::Passed => passed += 1,
            VerificationStatus::Failed => failed += 1,
            VerificationStatus::NotChecked => not_checked += 1,
        }
    }
    eprintln!("  Total runs: {}", measurements.len());
    eprintln!("  ✓ Passed: {passed}");
    eprintln!("  ✗ Failed: {failed}");
    eprintln!("  ○ Not checked (payload > {} bytes): {not_checked}", options.verify_limit);

    if failed > 0 {
        eprintln!();
        eprintln!("Failed runs:");
        for m in measurements {
            if matches!(m.verification_status, VerificationStatus::Failed) {
                eprintln!("  ✗ {} ({})", m.scenario, m.size_desc);
                if let Some(ref detail) = m.verification_detail {
                    eprintln!("     Error: {detail}");
                }
            }
        }
    }
    eprintln!("{}", "=".repeat(80));
    eprintln!();
}

fn measure<F>(
    scenario: &'static str,
    size_desc: String,
    sys: &mut System,
    compute: F,
) -> Measurement
where
    F: FnOnce() -> (VerificationStatus, Option<String>),
{
    let before = rss_kib(sys);
    let start = Instant::now();
    let (status, detail) = compute();
    let duration = start.elapsed();
    let after = rss_kib(sys);

    Measurement {
        scenario,
        size_desc,
        wall_s: duration.as_secs_f64(),
        rss_delta_kib: after.saturating_sub(before),
        verification_status: status,
        verification_detail: detail,
    }
}

fn write_csv(measurements: &[Measurement]) -> Result<(), String> {
    println!("scenario,size_desc,wall_s,rss_delta_kib,verification_status,verification_detail");
    for m in measurements {
        let detail = m
            .verification_detail
            .as_ref()
            .map(|s| s.replace('"', "'"))
            .unwrap_or_default();
        println!(
            "{},{},{:.3},{},{},\"{}\"",
            m.scenario,
            m.size_desc,
            m.wall_s,
            m.rss_delta_kib,
            m.verification_status.label(),
            detail
        );
    }
    Ok(())
}

fn write_table(measurements: &[Measurement]) -> Result<(), String> {
    let col1 = measurements
        .iter()
        .map(|m| m.scenario.len())
        .fold("scenario".len(), usize::max);
    let col2 = measurements
        .iter()
        .map(|m| m.size_desc.len())
        .fold("size".len(), usize::max);

    println!(
        "{:<col1$}  {:<col2$}  {:>10}  {:>14}  {:>12}  detail",
        "scenario", "size", "wall_s", "rss_delta_kib", "status"
    );
    println!(
        "{:-<col1$}  {:-<col2$}  {:-<10}  {:-<14}  {:-<12}  {:-<12}",
        "", "", "", "", "", ""
    );
    for m in measurements {
        println!(
            "{:<col1$}  {:<col2$}  {:>10.3}  {:>14}  {:>12}  {}",
            m.scenario,
            m.size_desc,
            m.wall_s,
            m.rss_delta_kib,
            m.verification_status.label(),
            m.verification_detail.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn rss_kib(sys: &mut System) -> u64 {
    sys.refresh_processes_specifics(ProcessRefreshKind::new());
    get_current_pid()
        .ok()
        .and_then(|pid| sys.process(pid))
        .map_or(0, |process| process.memory() / 1024)
}

fn deterministic_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) ^ (i >> 3)) as u8).collect()
}
