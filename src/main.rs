use anyhow::Result;
use clap::{Parser, Subcommand};
use text2sql::{normalize_and_validate, parse_schema, Config, Schema, SqlGenerator};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Question / expected SQL pairs used by `eval`.
const EVAL_CASES: &[(&str, &str)] = &[
    (
        "Show employees earning more than 50000",
        "SELECT EmpID, Salary FROM Employee WHERE Salary > 50000",
    ),
    (
        "List all high earners",
        "SELECT EmpID, Salary FROM Employee WHERE Salary > 100000",
    ),
    (
        "Find employees with salaries between 40000 and 60000",
        "SELECT EmpID, Salary FROM Employee WHERE Salary BETWEEN 40000 AND 60000",
    ),
    (
        "Who are the top 10 highest paid employees?",
        "SELECT EmpID, Salary FROM Employee ORDER BY Salary DESC LIMIT 10",
    ),
];

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Translate natural-language questions into validated SELECT statements")]
struct Args {
    /// Inference endpoint (or set TEXT2SQL_ENGINE_URL)
    #[arg(long, global = true)]
    engine_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate SQL for a question, optionally prefixed with "Schema: ... Question:"
    Generate { text: String },

    /// Normalize and validate an existing candidate without calling a model
    Check {
        #[arg(long)]
        question: String,

        #[arg(long)]
        raw: String,

        /// Schema description, e.g. "Orders(id, total)"
        #[arg(long)]
        schema: Option<String>,
    },

    /// Run the built-in question set and report accuracy
    Eval,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if args.engine_url.is_some() {
        config.engine_url = args.engine_url;
    }

    match args.command {
        Command::Generate { text } => {
            let generator = SqlGenerator::from_config(&config)?;
            let sql = generator.generate_sql(&text)?;
            println!("{}", sql);
        }
        Command::Check { question, raw, schema } => {
            let schema = schema.as_deref().map(parse_schema).unwrap_or_else(Schema::new);
            let sql = normalize_and_validate(&raw, &question, &schema)?;
            println!("{}", sql);
        }
        Command::Eval => {
            let generator = SqlGenerator::from_config(&config)?;
            info!("Evaluating {} cases with engine {}", EVAL_CASES.len(), generator.engine_name());
            run_eval(&generator);
        }
    }

    Ok(())
}

fn run_eval(generator: &SqlGenerator) {
    let mut passed = 0;

    for (question, expected) in EVAL_CASES {
        let generated = match generator.generate_sql(question) {
            Ok(sql) => sql,
            Err(e) => format!("ERROR: {}", e),
        };
        let ok = generated.eq_ignore_ascii_case(expected);
        if ok {
            passed += 1;
        }

        println!("Question:  {}", question);
        println!("Expected:  {}", expected);
        println!("Generated: {}", generated);
        println!("{}\n", if ok { "PASS" } else { "FAIL" });
    }

    let accuracy = passed as f64 / EVAL_CASES.len() as f64 * 100.0;
    println!("Accuracy: {:.2}% ({}/{})", accuracy, passed, EVAL_CASES.len());
}
