//! Command-line argument parsing for mediajitter

/// Default number of packets for `--simulate` without a count
pub const DEFAULT_SIMULATE_COUNT: usize = 1000;

/// Parse command line arguments
#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub once: bool,
    pub validate: bool,
    pub help: bool,
    pub json: bool,
    pub simulate: Option<usize>,
    pub seed: u64,
}

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Parse an argument list whose first element is the program name
pub fn parse_args_from(args: &[String]) -> Args {
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => result.once = true,
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            "--json" => result.json = true,
            "--simulate" => {
                match args.get(i + 1).and_then(|s| s.parse().ok()) {
                    Some(count) => {
                        i += 1;
                        result.simulate = Some(count);
                    }
                    None => result.simulate = Some(DEFAULT_SIMULATE_COUNT),
                }
            }
            "--seed" => {
                if let Some(seed) = args.get(i + 1).and_then(|s| s.parse().ok()) {
                    i += 1;
                    result.seed = seed;
                }
            }
            _ => {}
        }
        i += 1;
    }

    result
}

pub fn print_help() {
    println!("mediajitter - RTP jitter buffer\n");
    println!("USAGE:");
    println!("    mediajitter [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --once                  Receive for one listen period and exit");
    println!("    --validate              Validate configuration and exit");
    println!("    --simulate [N]          Run N synthetic packets through the buffer (default: {})", DEFAULT_SIMULATE_COUNT);
    println!("    --seed S                Seed for --simulate (default: 0)");
    println!("    --json                  Print statistics as JSON");
    println!("    --help, -h              Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    RTP_PORT, JITTER_MAX_WAIT_MS, JITTER_BLOCKING, JITTER_FIFO,");
    println!("    LISTEN_DURATION_SECS, STATS_JSON");
}
