//! `statement-setup`: interactive helper for preparing a training run.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use statement_trainer::config::{AppConfig, PathsConfig};
use statement_trainer::logging::init_logging_simple;
use statement_trainer::setup::{
    check_environment, create_training_data, validate_training_data, CheckStatus, CreateOutcome,
    DataFileCheck,
};

const RULE: &str = "======================================================================";

fn main() -> anyhow::Result<()> {
    init_logging_simple();

    let config_dir = std::env::var("STMT_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load_from(&config_dir)?;
    let paths = config.paths;

    println!("{}", RULE);
    println!("Bank Statement Analysis - Training Setup");
    println!("{}", RULE);

    let mut rl = DefaultEditor::new()?;

    loop {
        println!("\nOptions:");
        println!("  1. Create sample {} file", paths.data_file.display());
        println!("  2. Validate {}", paths.data_file.display());
        println!("  3. Check environment setup");
        println!("  4. Exit");

        let choice = match rl.readline("\nSelect an option (1-4): ") {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        };

        match choice.as_str() {
            "1" => create_sample(&mut rl, &paths)?,
            "2" => validate(&paths),
            "3" => environment(&paths),
            "4" => {
                println!("\nSetup complete! Next step:");
                println!("  statement-train");
                break;
            }
            _ => println!("Invalid option. Please select 1-4."),
        }
    }

    Ok(())
}

fn create_sample(rl: &mut DefaultEditor, paths: &PathsConfig) -> anyhow::Result<()> {
    println!("Creating sample {}...", paths.data_file.display());

    let prompt = format!(
        "{} already exists. Overwrite? (y/n): ",
        paths.data_file.display()
    );
    let confirm = || {
        rl.readline(&prompt)
            .map(|answer| answer.trim().eq_ignore_ascii_case("y"))
            .unwrap_or(false)
    };

    match create_training_data(&paths.example_file, &paths.data_file, confirm)? {
        CreateOutcome::Created => {
            println!("\x1b[32m✓\x1b[0m Created {} from example", paths.data_file.display());
            println!("\nNext steps:");
            println!("  1. Edit {} with your actual bank statement examples", paths.data_file.display());
            println!("  2. Each line should be a complete JSON object");
            println!("  3. Include diverse examples (different banks, account types, etc.)");
            println!("  4. Aim for at least 10-20 examples for meaningful training");
        }
        CreateOutcome::Skipped => println!("Skipping..."),
        CreateOutcome::ExampleMissing => {
            println!("\x1b[31m✗\x1b[0m Error: {} not found", paths.example_file.display())
        }
    }
    Ok(())
}

fn validate(paths: &PathsConfig) {
    println!("\nValidating {}...", paths.data_file.display());

    let report = match validate_training_data(&paths.data_file) {
        Ok(DataFileCheck::Missing) => {
            println!("\x1b[31m✗\x1b[0m Error: {} not found", paths.data_file.display());
            println!("Run option 1 to create it from the example");
            return;
        }
        Ok(DataFileCheck::Empty) => {
            println!("\x1b[31m✗\x1b[0m Error: {} is empty", paths.data_file.display());
            return;
        }
        Ok(DataFileCheck::Checked(report)) => report,
        Err(e) => {
            println!("\x1b[31m✗\x1b[0m Error reading file: {e}");
            return;
        }
    };

    println!("\n\x1b[32m✓\x1b[0m Found {} valid training examples", report.valid_count);

    if report.errors.is_empty() {
        println!("\x1b[32m✓\x1b[0m All examples are properly formatted!");
    } else {
        println!("\n\x1b[33m!\x1b[0m Found {} issues:", report.errors.len());
        for issue in report.listed_errors() {
            println!("  - {issue}");
        }
        if report.hidden_error_count() > 0 {
            println!("  ... and {} more", report.hidden_error_count());
        }
    }

    if !report.schema_warnings.is_empty() {
        println!(
            "\n\x1b[33m!\x1b[0m {} expected outputs do not match the full analysis schema (advisory):",
            report.schema_warnings.len()
        );
        for issue in report.schema_warnings.iter().take(3) {
            println!("  - {issue}");
        }
    }

    let recommendation = report.recommendation();
    let mark = if recommendation.is_warning() {
        "\x1b[33m!\x1b[0m"
    } else {
        "\x1b[32m✓\x1b[0m"
    };
    println!("\nTraining recommendations:");
    println!("  {} {}", mark, recommendation.message());
}

fn environment(paths: &PathsConfig) {
    println!("\nChecking environment...");

    let report = check_environment(paths);
    println!("  statement-trainer version: {}", report.version);
    for check in &report.checks {
        let mark = match check.status {
            CheckStatus::Ok => "\x1b[32m✓\x1b[0m",
            CheckStatus::Warning => "\x1b[33m!\x1b[0m",
            CheckStatus::Missing => "\x1b[31m✗\x1b[0m",
        };
        println!("  {} {}: {}", mark, check.label, check.detail);
    }
}
