use std::path::PathBuf;

use clap::Parser;
use ppnet_align_config::{
    AnalysisArgs, CommonInferenceArgs, CommonModelArgs, ConfigOverrides, build_config_overrides,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Explain a prototype network's prediction on one image",
    long_about = None
)]
pub struct Cli {
    /// Test image, laid out as `<dataset>/<class>/<image>`.
    #[arg(long, value_name = "PATH")]
    pub img: PathBuf,

    /// Checkpoint, laid out as `<architecture>/<experiment>/checkpoints/<epoch>_<tag>.pth`.
    #[arg(long, value_name = "PATH")]
    pub model: PathBuf,

    /// Directory under which the analysis tree is written.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out: PathBuf,

    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[command(flatten)]
    pub model_args: CommonModelArgs,

    #[command(flatten)]
    pub inference: CommonInferenceArgs,

    /// Quiet mode - warnings and errors only, no progress bars.
    #[arg(short, long, help_heading = "Application")]
    pub quiet: bool,
}

impl From<&Cli> for ConfigOverrides {
    fn from(args: &Cli) -> Self {
        build_config_overrides(&args.model_args, &args.inference, &args.analysis)
    }
}
