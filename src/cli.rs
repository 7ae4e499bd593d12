//! Command-line surface. Thin by design: parses arguments, then hands off
//! immediately to the library entry points in `lib.rs`.
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "repo-assembler", about = "Assembles working trees from many repositories composed of a base reference plus merged references")]
pub struct Args {
    /// Path to the project spec file.
    #[arg(short = 'c', long = "config", default_value = "./spec.yaml")]
    pub config: PathBuf,

    /// Path to the pinned-reference document. Defaults to `frozen.yaml`
    /// alongside the spec file.
    #[arg(short = 'z', long = "frozen")]
    pub frozen: Option<PathBuf>,

    /// Working directory. Defaults to the spec file's directory.
    #[arg(short = 'w', long = "workdir")]
    pub workdir: Option<PathBuf>,

    /// Number of slots assembled concurrently.
    #[arg(short = 'j', long = "concurrency", default_value_t = 28)]
    pub concurrency: usize,

    /// Switch to freeze mode. An optional path overrides the default
    /// output location.
    #[arg(short = 'f', long = "freeze", num_args = 0..=1, default_missing_value = "")]
    pub freeze: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let args = Args::parse_from(["repo-assembler"]);
        assert_eq!(args.config, PathBuf::from("./spec.yaml"));
        assert_eq!(args.concurrency, 28);
        assert!(args.frozen.is_none());
        assert!(args.freeze.is_none());
    }

    #[test]
    fn freeze_flag_without_path_is_present_but_empty() {
        let args = Args::parse_from(["repo-assembler", "--freeze"]);
        assert_eq!(args.freeze, Some(PathBuf::from("")));
    }

    #[test]
    fn freeze_flag_with_path_overrides_default() {
        let args = Args::parse_from(["repo-assembler", "--freeze", "out.yaml"]);
        assert_eq!(args.freeze, Some(PathBuf::from("out.yaml")));
    }
}
