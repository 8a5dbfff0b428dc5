//! The `glimpse vocab` command for building vocabularies from caption corpora.

use clap::{Args, Subcommand};
use glimpse_core::vocabulary::{Vocabulary, DEFAULT_FREQ_THRESHOLD};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Arguments for the `vocab` command.
#[derive(Args, Debug)]
pub struct VocabArgs {
    #[command(subcommand)]
    pub command: VocabCommand,
}

#[derive(Subcommand, Debug)]
pub enum VocabCommand {
    /// Build a vocabulary from a caption file
    Build {
        /// Caption corpus: one caption per line
        captions: PathBuf,

        /// Where to write the vocabulary JSON
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum number of occurrences for a word to get its own id
        #[arg(short, long, default_value_t = DEFAULT_FREQ_THRESHOLD)]
        threshold: usize,

        /// Treat the file as `image,caption` CSV with a header row.
        /// Each record must fit on one line; `""` inside a quoted caption
        /// reads as one quote
        #[arg(long)]
        csv: bool,
    },

    /// Print a summary of a vocabulary file
    Show {
        /// Vocabulary JSON file
        file: PathBuf,
    },
}

/// Execute the vocab command.
pub async fn execute(args: VocabArgs) -> anyhow::Result<()> {
    match args.command {
        VocabCommand::Build {
            captions,
            output,
            threshold,
            csv,
        } => {
            if threshold == 0 {
                anyhow::bail!("--threshold must be at least 1");
            }
            let text = std::fs::read_to_string(&captions)?;
            let lines = caption_lines(&text, csv);
            let vocabulary = Vocabulary::build(&lines, threshold);

            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            vocabulary.save(&output)?;

            tracing::info!(
                "Built vocabulary of {} tokens from {} captions (threshold {})",
                vocabulary.len(),
                lines.len(),
                threshold
            );
            println!("Vocabulary written to: {}", output.display());
        }

        VocabCommand::Show { file } => {
            print_summary(&file)?;
        }
    }

    Ok(())
}

/// Extract caption text from a corpus file.
///
/// In CSV mode the first line is a header and each caption is everything
/// after the first comma, so commas inside captions survive. Records that
/// span several lines are not supported.
fn caption_lines(text: &str, csv: bool) -> Vec<Cow<'_, str>> {
    let lines = text.lines().skip(usize::from(csv));
    lines
        .filter_map(|line| {
            if csv {
                line.split_once(',').map(|(_, caption)| unquote(caption.trim()))
            } else {
                Some(Cow::Borrowed(line.trim()))
            }
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// Strip the quotes around a CSV field and collapse doubled inner quotes.
fn unquote(field: &str) -> Cow<'_, str> {
    match field
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) if inner.contains("\"\"") => Cow::Owned(inner.trim().replace("\"\"", "\"")),
        Some(inner) => Cow::Borrowed(inner.trim()),
        None => Cow::Borrowed(field),
    }
}

fn print_summary(path: &Path) -> anyhow::Result<()> {
    let vocabulary = Vocabulary::load(path)?;
    println!("Vocabulary: {}", path.display());
    println!("  Tokens:         {}", vocabulary.len());
    println!("  Freq threshold: {}", vocabulary.freq_threshold());
    let preview: Vec<&str> = vocabulary
        .tokens()
        .iter()
        .take(12)
        .map(String::as_str)
        .collect();
    println!("  First tokens:   {}", preview.join(" "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_lines_plain() {
        let lines = caption_lines("A dog runs.\n\n  A cat sits.  \n", false);
        assert_eq!(lines, vec!["A dog runs.", "A cat sits."]);
    }

    #[test]
    fn test_caption_lines_csv() {
        let text = "image,caption\n1.jpg,A dog runs.\n2.jpg,\"A cat, sitting.\"\n";
        let lines = caption_lines(text, true);
        assert_eq!(lines, vec!["A dog runs.", "A cat, sitting."]);
    }

    #[test]
    fn test_caption_lines_csv_unescapes_quotes() {
        let text = "image,caption\n3.jpg,\"A sign reads \"\"stop\"\".\"\n4.jpg,\"\"\n";
        let lines = caption_lines(text, true);
        assert_eq!(lines, vec!["A sign reads \"stop\"."]);
    }

    #[tokio::test]
    async fn test_build_writes_loadable_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("captions.txt");
        std::fs::write(&corpus, "a dog runs\na dog sits\na cat\n").unwrap();
        let output = dir.path().join("out").join("vocab.json");

        execute(VocabArgs {
            command: VocabCommand::Build {
                captions: corpus,
                output: output.clone(),
                threshold: 2,
                csv: false,
            },
        })
        .await
        .unwrap();

        let vocabulary = Vocabulary::load(&output).unwrap();
        // reserved four + "a" + "dog"
        assert_eq!(vocabulary.len(), 6);
        assert_eq!(vocabulary.token_to_id("dog"), 5);
    }
}
