use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "statement-train")]
#[command(author = "Statement Trainer Team")]
#[command(version)]
#[command(about = "Optimize the bank statement analysis prompt", long_about = None)]
pub struct TrainCli {
    /// Directory holding default.toml and environment overrides
    #[arg(long, env = "STMT_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,
}

#[derive(Parser, Debug)]
#[command(name = "statement-analyze")]
#[command(author = "Statement Trainer Team")]
#[command(version)]
#[command(about = "Run the analysis agent once and print the scored result", long_about = None)]
pub struct AnalyzeCli {
    /// Directory holding default.toml and environment overrides
    #[arg(long, env = "STMT_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Training data to pick a task from (defaults to the configured file)
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Zero-based task index (blank lines are not counted); without it a built-in sample is used
    #[arg(short, long)]
    pub index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_cli_takes_no_required_arguments() {
        let cli = TrainCli::try_parse_from(["statement-train"]).unwrap();
        assert_eq!(cli.config_dir, PathBuf::from("config"));
    }

    #[test]
    fn test_analyze_cli_parses_index() {
        let cli =
            AnalyzeCli::try_parse_from(["statement-analyze", "--index", "2", "-d", "data.jsonl"])
                .unwrap();
        assert_eq!(cli.index, Some(2));
        assert_eq!(cli.data, Some(PathBuf::from("data.jsonl")));
    }

    #[test]
    fn test_index_help_describes_task_index() {
        use clap::CommandFactory;
        let help = AnalyzeCli::command().render_long_help().to_string();
        assert!(help.contains("task index"));
        assert!(!help.contains("line index"));
    }
}
