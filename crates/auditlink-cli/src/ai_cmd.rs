//! `explain` and `generate` subcommands.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use auditlink_core::Config;
use auditlink_services::GeminiClient;

#[derive(clap::Args, Debug)]
pub struct ExplainArgs {
    /// Solidity source file.
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// What the contract should do.
    #[arg(long)]
    pub prompt: String,
    /// Write the generated code here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run_explain(config: &Config, args: ExplainArgs) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let client = GeminiClient::new(&config.gemini)?;
    let text = client.explain_contract(&code).await?;
    writeln!(io::stdout(), "{text}")?;
    Ok(())
}

pub async fn run_generate(config: &Config, args: GenerateArgs) -> anyhow::Result<()> {
    let client = GeminiClient::new(&config.gemini)?;
    let generated = client.generate_contract(&args.prompt).await?;
    let mut out = io::stdout();
    match args.output {
        Some(path) => {
            std::fs::write(&path, &generated.code)
                .with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(out, "Wrote {} ({} lines)", path.display(), generated.code.lines().count())?;
        }
        None => writeln!(out, "{}", generated.code)?,
    }
    writeln!(out, "Estimated security score: {}/100", generated.score)?;
    Ok(())
}
