use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rvprobe::bytecode::parse_vector;
use rvprobe::{Catalog, Evaluator, ExecutionUnit, Harness, HarnessConfig, RecordedUnit, ReferenceUnit};

#[derive(Parser, Debug)]
#[command(name = "rvprobe")]
#[command(about = "Verify the effects of raw RISC-V instruction words", long_about = None)]
struct Args {
  /// Test vector: `.word`/`.half`/`.byte` words plus optional `.reg`/`.mem` initial state
  vector: PathBuf,

  /// Final state reported by the unit under test, in `.reg`/`.mem` form.
  /// The reference model is checked when omitted.
  #[arg(long)]
  observed: Option<PathBuf>,

  /// Evaluate expected effects after the unit finishes rather than alongside it
  #[arg(long, action = ArgAction::SetTrue)]
  sequential: bool,

  /// Print the expected final machine state
  #[arg(long, action = ArgAction::SetTrue)]
  show_state: bool,
}

fn run(args: Args) -> Result<bool, Box<dyn Error>> {
  let text = fs::read_to_string(&args.vector)?;
  let vector = parse_vector(&text)?;
  info!(path = %args.vector.display(), words = vector.words.len(), "loaded test vector");

  let catalog = Catalog::new();
  let evaluator = Evaluator::new();

  let mut unit: Box<dyn ExecutionUnit> = match &args.observed {
    Some(path) => {
      let name = path.display().to_string();
      Box::new(RecordedUnit::from_text(&name, &fs::read_to_string(path)?)?)
    }
    None => Box::new(ReferenceUnit::new(catalog.clone(), evaluator.clone()))
  };

  let config = HarnessConfig{ concurrent_evaluation: !args.sequential };
  let mut harness = Harness::new(&catalog, &evaluator, config);
  let result = harness.verify(vector.words, vector.initial, unit.as_mut())?;

  print!("{}", result);
  if args.show_state {
    if let Some(evaluation) = harness.evaluation() {
      println!("Expected final state:\n{}", evaluation.final_state);
    }
  }
  Ok(result.passed())
}

fn main() -> ExitCode {
  let env_filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  match run(Args::parse()) {
    Ok(true)  => ExitCode::SUCCESS,
    Ok(false) => ExitCode::from(1),
    Err(e)    => {
      eprintln!("Error: {}", e);
      ExitCode::from(2)
    }
  }
}
