//! The `glimpse models` command for inspecting model artifacts.

use clap::{Args, Subcommand};
use glimpse_core::config::ArtifactPaths;
use glimpse_core::{Captioner, Config};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model inspection.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Show model directory path
    Path,

    /// List expected artifacts and whether each is present
    List,

    /// Load every artifact and verify they agree on shape
    Check,
}

/// Presence of one artifact on disk.
#[derive(Debug, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub label: &'static str,
    pub file_name: String,
    pub size_bytes: Option<u64>,
}

/// Stat each artifact without loading it.
pub fn artifact_status(paths: &ArtifactPaths) -> Vec<ArtifactStatus> {
    paths
        .labelled()
        .into_iter()
        .map(|(label, path)| ArtifactStatus {
            label,
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size_bytes: std::fs::metadata(path)
                .ok()
                .filter(|m| m.is_file())
                .map(|m| m.len()),
        })
        .collect()
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }

        ModelsCommand::List => {
            let model_dir = config.model_dir();
            println!("Model artifacts:");
            println!("  Directory: {}\n", model_dir.display());

            for status in artifact_status(&config.artifact_paths()) {
                let state = match status.size_bytes {
                    Some(size) => format!("ready ({:.1} MB)", size as f64 / (1024.0 * 1024.0)),
                    None => "missing".to_string(),
                };
                println!("    - {:18} {:30} {}", status.label, status.file_name, state);
            }
        }

        ModelsCommand::Check => {
            let captioner =
                tokio::task::spawn_blocking(move || Captioner::load(&config)).await??;
            println!(
                "All artifacts loaded: vocabulary of {} tokens, captions up to {} tokens.",
                captioner.vocabulary().len(),
                captioner.max_caption_len()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_status_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.model_dir = dir.path().to_path_buf();
        std::fs::write(dir.path().join("vocab.json"), b"{}").unwrap();

        let statuses = artifact_status(&config.artifact_paths());
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses[0].label, "vocabulary");
        assert_eq!(statuses[0].file_name, "vocab.json");
        assert_eq!(statuses[0].size_bytes, Some(2));
        assert!(statuses[1..].iter().all(|s| s.size_bytes.is_none()));
    }
}
