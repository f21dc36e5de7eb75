//! Post-install patcher for vendored dependency sources.
//!
//! Usage: `sendgate-patch [TARGET] [--rules FILE] [--root DIR]`
//!
//! Without a rule file the built-in newsletter-media fix for `baileys` is
//! applied to its outgoing message module. Paths are resolved against the
//! project root (`--root`, else `SENDGATE_ROOT`, else the working directory).
//! Every outcome other than a failed write exits 0 so the surrounding
//! install keeps going.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sendgate::patch::rules::{self, RuleSet};
use sendgate::patch::{self, PatchReport, PatchStatus};

#[derive(Debug, Default, PartialEq)]
struct Args {
    target: Option<PathBuf>,
    rules: Option<PathBuf>,
    root: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--rules" => {
                parsed.rules = Some(PathBuf::from(
                    iter.next().context("--rules needs a file path")?,
                ))
            }
            "--root" => {
                parsed.root = Some(PathBuf::from(
                    iter.next().context("--root needs a directory")?,
                ))
            }
            flag if flag.starts_with("--") => anyhow::bail!("Unknown flag: {flag}"),
            path => {
                if parsed.target.is_some() {
                    anyhow::bail!("Only one target file may be given");
                }
                parsed.target = Some(PathBuf::from(path));
            }
        }
    }
    Ok(parsed)
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Run one patch pass. Argument and rule-file problems are logged and
/// yield `Ok(None)`; only a failed write is an error.
fn run(raw: &[String], env_root: Option<String>) -> Result<Option<PatchReport>> {
    let args = match parse_args(raw) {
        Ok(args) => args,
        Err(e) => {
            warn!("{e:#}; nothing patched");
            return Ok(None);
        }
    };

    let project_root = args
        .root
        .clone()
        .or_else(|| env_root.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let (rule_target, rule_list, label) = match &args.rules {
        Some(path) => match RuleSet::load(&resolve(&project_root, path)) {
            Ok(set) => (set.target, set.rules, path.display().to_string()),
            Err(e) => {
                warn!("{e:#}; nothing patched");
                return Ok(None);
            }
        },
        None => (
            Some(PathBuf::from(rules::BAILEYS_MESSAGES_SEND)),
            rules::baileys_newsletter_media(),
            "baileys-newsletter-media".to_string(),
        ),
    };

    let Some(target) = args.target.or(rule_target) else {
        warn!("No target file given and {label} names none; nothing patched");
        return Ok(None);
    };
    let target = resolve(&project_root, &target);

    info!(
        "Applying {} rule(s) from {} to {}",
        rule_list.len(),
        label,
        target.display()
    );

    let report = patch::patch_file(&target, &rule_list)?;
    match report.status {
        PatchStatus::Patched | PatchStatus::AlreadyPatched => info!("[{label}] {report}"),
        _ => warn!("[{label}] {report}"),
    }

    Ok(Some(report))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    run(&args, std::env::var("SENDGATE_ROOT").ok())?;
    Ok(())
}
