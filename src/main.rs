use subtube::RunOptions;

const HELP: &str = "subtube - Browse your video subscription feed from the terminal.

  --version, -V            Show version and exit
  --help,    -h            Show this help message
  --format,  -f <quality>  Stream quality passed to the player (default: best)
  --clear-cache            Forget the cached feed before syncing";

enum Cli {
    Exit,
    Run(RunOptions),
}

fn main() {
    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Exit) => return,
        Ok(Cli::Run(opts)) => opts,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = subtube::run(opts) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Cli, String> {
    let mut opts = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("subtube {}", subtube::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Cli::Exit);
            }
            "--format" | "-f" => match args.next() {
                Some(quality) if !quality.trim().is_empty() => opts.quality = Some(quality),
                _ => return Err(format!("{arg} needs a quality value")),
            },
            "--clear-cache" => opts.clear_cache = true,
            other => {
                if let Some(quality) = other.strip_prefix("--format=") {
                    opts.quality = Some(quality.to_string());
                } else {
                    return Err(format!("unknown argument `{other}`"));
                }
            }
        }
    }
    Ok(Cli::Run(opts))
}
