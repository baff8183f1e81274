use clap::Parser;
use rewrite_kernel::parser::parse_all;
use rewrite_kernel::{Config, Env, KernelError, Mark};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rwk", version, about = "Run a term-rewriting script")]
struct Cli {
  /// Script of `(assert F)`, `(push)`, `(pop)`, `(rewrite T)` and `(prepare F)` forms.
  script: PathBuf,

  /// Print the session counters when done.
  #[arg(long)]
  stats: bool,

  /// Log rule registration, hypothesis scoping and closure progress.
  #[arg(short, long)]
  verbose: bool,

  /// Disable the normal-form cache.
  #[arg(long)]
  no_cache: bool,

  /// Nesting depth at which normalization gives up.
  #[arg(long)]
  max_depth: Option<u32>,

  /// Maximum number of rules one assertion may derive.
  #[arg(long)]
  closure_limit: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
enum DriverError {
  #[error(transparent)]
  Kernel(#[from] KernelError),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Execute the forms of a script, writing one line per result.
fn run(env: &mut Env, src: &str, out: &mut impl Write) -> Result<(), DriverError> {
  let forms = parse_all(&mut env.terms, src)?;
  let mut marks: Vec<Mark> = vec![];
  for form in forms {
    let Some((f, args)) = env.terms.as_app(form) else {
      return Err(KernelError::UnknownSymbol(env.pp(form).to_string()).into())
    };
    let (cmd, args) = (env.terms.func_name(f).to_owned(), args.to_vec());
    match (&*cmd, &*args) {
      ("assert", &[fact]) => {
        let added = env.derive_and_add(fact)?;
        writeln!(out, "{}", if added { "ok" } else { "known" })?
      }
      ("push", []) => marks.push(env.push()),
      ("pop", []) => match marks.pop() {
        Some(mark) => env.pop(mark)?,
        None => return Err(KernelError::UnbalancedPop { mark: 0, depth: env.net().depth() }.into()),
      },
      ("rewrite", &[t]) => {
        let r = env.rewrite(t);
        writeln!(out, "{}", env.pp(r))?
      }
      ("prepare", &[fact]) =>
        for e in env.prepare_detailed(fact)? {
          writeln!(out, "{} ; priority {}", env.pp(e.rule.term()), e.priority)?
        },
      _ => return Err(KernelError::UnknownSymbol(cmd).into()),
    }
  }
  Ok(())
}

fn print_stats(env: &Env) {
  for (s, n) in env.stats() {
    println!("{s}: {n}");
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  let default = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
    .init();

  let mut cfg = Config::from_env();
  cfg.cache_enabled &= !cli.no_cache;
  if let Some(n) = cli.max_depth {
    cfg.max_depth = n
  }
  if let Some(n) = cli.closure_limit {
    cfg.closure_limit = n
  }
  let src = match std::fs::read_to_string(&cli.script) {
    Ok(src) => src,
    Err(e) => {
      eprintln!("{}: {e}", cli.script.display());
      return ExitCode::FAILURE
    }
  };
  let mut env = Env::new(cfg);
  let res = run(&mut env, &src, &mut std::io::stdout().lock());
  if cli.stats {
    print_stats(&env)
  }
  match res {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("error: {e}");
      ExitCode::FAILURE
    }
  }
}
