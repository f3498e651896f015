use clap::Parser;
use std::path::PathBuf;

pub const USAGE: &str = "Usage: vision_dispatch [config_path] [input_path/webui]";

/// Exit status for missing arguments (-1 as seen by the shell).
pub const USAGE_EXIT: u8 = 255;

#[derive(Parser)]
#[command(name = "vision_dispatch", version)]
#[command(about = "Run a segmentation model on an image, video or folder, or serve it over stdin/stdout")]
pub struct Cli {
    /// YAML engine configuration
    pub config_path: PathBuf,

    /// Image, video or directory to process, or `webui` for an interactive session
    #[arg(allow_hyphen_values = true)]
    pub target: String,

    /// Anything after the target is accepted and ignored
    #[arg(hide = true)]
    pub extra: Vec<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn takes_two_positionals() {
        let cli = Cli::try_parse_from(["vision_dispatch", "config.yaml", "webui"]).unwrap();
        assert_eq!(cli.config_path, PathBuf::from("config.yaml"));
        assert_eq!(cli.target, "webui");
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn target_may_start_with_a_hyphen() {
        let cli = Cli::try_parse_from(["vision_dispatch", "config.yaml", "-frame.png"]).unwrap();
        assert_eq!(cli.target, "-frame.png");
        assert!(cli.extra.is_empty());
    }

    #[test]
    fn trailing_arguments_are_ignored() {
        let cli =
            Cli::try_parse_from(["vision_dispatch", "config.yaml", "a.png", "extra", "more"])
                .unwrap();
        assert_eq!(cli.config_path, PathBuf::from("config.yaml"));
        assert_eq!(cli.target, "a.png");
        assert_eq!(cli.extra, ["extra", "more"]);
    }

    #[test]
    fn missing_target_is_rejected() {
        let err = Cli::try_parse_from(["vision_dispatch", "config.yaml"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
