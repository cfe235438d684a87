use clap::Parser;
use lorewiki::RunOptions;
use std::path::PathBuf;
use std::process::ExitCode;

/// Render campaign-wiki pages per point of view.
#[derive(Debug, Parser)]
#[command(name = "lorewiki", version)]
struct Cli {
    /// Page title to render.
    title: Option<String>,

    /// Wiki root directory (contains `pages/` and optionally `lorewiki.yaml`).
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Render as this character identity.
    #[arg(long = "as", value_name = "CHARACTER", conflicts_with = "loremaster")]
    viewer: Option<String>,

    /// Render with the omniscient loremaster view.
    #[arg(long)]
    loremaster: bool,

    /// Attempt to reveal this secret codename before rendering.
    #[arg(long, value_name = "CODENAME")]
    reveal: Option<String>,

    /// Stat backing the reveal's rule check, repeatable (`--stat lore=14`).
    #[arg(long = "stat", value_name = "NAME=VALUE")]
    stats: Vec<String>,

    /// Canonicalize and persist the page body before rendering.
    #[arg(long)]
    save: bool,

    /// List pages using the given template instead of rendering.
    #[arg(long, value_name = "TEMPLATE", conflicts_with = "title")]
    uses: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(template) = &cli.uses {
        return match lorewiki::template_usage(&cli.root, template) {
            Ok(titles) => {
                for title in titles {
                    println!("{}", title);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let Some(title) = cli.title.as_deref() else {
        eprintln!("error: a page title is required (or use --uses)");
        return ExitCode::FAILURE;
    };

    let mut stats = Vec::new();
    for raw in &cli.stats {
        match parse_stat(raw) {
            Some(pair) => stats.push(pair),
            None => {
                eprintln!("error: invalid --stat {:?}; expected NAME=VALUE", raw);
                return ExitCode::FAILURE;
            }
        }
    }

    let opts = RunOptions {
        viewer_id: cli.viewer.clone(),
        loremaster: cli.loremaster,
        reveal: cli.reveal.clone(),
        stats,
        save: cli.save,
    };

    match lorewiki::run(&cli.root, title, &opts) {
        Ok(html) => {
            println!("{}", html);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn parse_stat(raw: &str) -> Option<(String, i64)> {
    let (name, value) = raw.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().parse().ok()?))
}
